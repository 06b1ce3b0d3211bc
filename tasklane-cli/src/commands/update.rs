//! Update command - heartbeat a task and merge progress records.

use serde_json::json;
use tasklane_queue::{TaskId, TaskQueue};

use super::into_params;
use crate::error::CliResult;
use crate::output::{self, Output};

pub async fn run(
    queue: &TaskQueue,
    tid: &TaskId,
    pairs: Vec<(String, String)>,
    out: Output,
) -> CliResult<()> {
    let records = into_params(pairs)?;
    let count = records.len();
    queue.update(tid, records).await?;

    if !out.json(&json!({ "tid": tid, "records": count }))? {
        output::success(&format!("Updated task {} ({} records)", tid, count));
    }
    Ok(())
}
