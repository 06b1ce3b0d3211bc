//! Release command - give a task back.

use serde_json::json;
use tasklane_queue::{TaskId, TaskQueue};

use crate::error::CliResult;
use crate::output::{self, Output};

pub async fn run(queue: &TaskQueue, tid: &TaskId, out: Output) -> CliResult<()> {
    let held = queue.working().await?.contains(tid);
    queue.release(tid).await?;

    if out.json(&json!({ "tid": tid, "released": held }))? {
        return Ok(());
    }

    if held {
        output::success(&format!("Released task {}", tid));
    } else {
        output::warn(&format!("Task {} was not in the working set", tid));
    }
    Ok(())
}
