//! Terminal and JSON output helpers.

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::CliResult;

/// How command results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as pretty JSON. Returns `false` in text mode so the
    /// caller can print its own rendering.
    pub fn json<T: Serialize>(&self, value: &T) -> CliResult<bool> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(self.json)
    }
}

pub fn success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn warn(msg: &str) {
    println!("  {} {}", "⚠".yellow().bold(), msg.yellow());
}

pub fn info(msg: &str) {
    println!("  {} {}", "→".cyan(), msg);
}

pub fn heading(title: &str) {
    println!();
    println!("  {}", title.bright_white().bold());
}

/// Print `key: value` rows, keys aligned.
pub fn fields<'a, I>(rows: I)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let rows: BTreeMap<&str, &str> = rows.into_iter().collect();
    let width = rows.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        let key = format!("{:width$}", key, width = width);
        println!("    {}  {}", key.cyan(), value);
    }
}

/// Epoch seconds as an RFC 3339 timestamp, or the raw value if out of range.
pub fn timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
