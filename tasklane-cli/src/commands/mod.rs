//! CLI command implementations.

pub mod acquire;
pub mod create;
pub mod release;
pub mod show;
pub mod status;
pub mod update;

use tasklane_queue::TaskParams;

use crate::error::{CliError, CliResult};

/// Parse a `KEY=VALUE` argument. The value may itself contain `=`.
pub fn parse_pair(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", arg))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", arg));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Collect pairs into a mapping, rejecting repeated keys.
pub fn into_params(pairs: Vec<(String, String)>) -> CliResult<TaskParams> {
    let mut params = TaskParams::with_capacity(pairs.len());
    for (key, value) in pairs {
        if params.insert(key.clone(), value).is_some() {
            return Err(CliError::InvalidArgument(format!(
                "`{}` given more than once",
                key
            )));
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_parsing() {
        assert_eq!(parse_pair("url=x"), Ok(("url".into(), "x".into())));
        assert_eq!(parse_pair("q=a=b"), Ok(("q".into(), "a=b".into())));
        assert_eq!(parse_pair("empty="), Ok(("empty".into(), String::new())));
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=v").is_err());
    }

    #[test]
    fn duplicate_keys_rejected() {
        let pairs = vec![("a".to_string(), "1".to_string()), ("a".to_string(), "2".to_string())];
        assert!(matches!(into_params(pairs), Err(CliError::InvalidArgument(_))));

        let pairs = vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())];
        assert_eq!(into_params(pairs).unwrap().len(), 2);
    }
}
