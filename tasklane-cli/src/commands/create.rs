//! Create command - enqueue a task.

use serde_json::json;
use tasklane_queue::TaskQueue;

use super::into_params;
use crate::error::{CliError, CliResult};
use crate::output::{self, Output};

pub async fn run(queue: &TaskQueue, pairs: Vec<(String, String)>, out: Output) -> CliResult<()> {
    if pairs.is_empty() {
        return Err(CliError::InvalidArgument(
            "a task needs at least one --param KEY=VALUE".into(),
        ));
    }

    let tid = queue.create(into_params(pairs)?).await?;

    if !out.json(&json!({ "topic": queue.topic(), "tid": tid }))? {
        output::success(&format!("Created task {} on {}", tid, queue.topic()));
    }
    Ok(())
}
