//! Acquire command - claim the oldest pending task.

use tasklane_queue::TaskQueue;

use crate::error::CliResult;
use crate::output::{self, Output};

pub async fn run(queue: &TaskQueue, out: Output) -> CliResult<()> {
    let task = queue.acquire().await?;

    if out.json(&task)? {
        return Ok(());
    }

    match task {
        Some(task) => {
            output::success(&format!("Acquired task {}", task.tid));
            output::heading("Parameters");
            output::fields(task.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        None => output::warn(&format!("No pending tasks on {}", queue.topic())),
    }
    Ok(())
}
