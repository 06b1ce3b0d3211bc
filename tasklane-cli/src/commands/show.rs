//! Show command - everything recorded for one task.

use serde::Serialize;
use tasklane_queue::{TaskId, TaskMetrics, TaskParams, TaskQueue};

use crate::error::{CliError, CliResult};
use crate::output::{self, Output};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum State {
    Pending,
    Working,
    Released,
    Unknown,
}

#[derive(Serialize)]
struct Details {
    tid: TaskId,
    state: State,
    params: Option<TaskParams>,
    metrics: Option<TaskMetrics>,
}

fn state_of(pending: bool, working: bool, metrics: Option<&TaskMetrics>) -> State {
    if working {
        State::Working
    } else if pending {
        State::Pending
    } else if metrics.and_then(TaskMetrics::last_released).is_some() {
        State::Released
    } else {
        State::Unknown
    }
}

pub async fn run(queue: &TaskQueue, tid: &TaskId, out: Output) -> CliResult<()> {
    let params = queue.listing(tid).await?;
    let metrics = queue.metrics(tid).await?;
    if params.is_none() && metrics.is_none() {
        return Err(CliError::NotFound(format!(
            "task {} on {}",
            tid,
            queue.topic()
        )));
    }

    let pending = queue.pending().await?.contains(tid);
    let working = queue.working().await?.contains(tid);
    let details = Details {
        tid: tid.clone(),
        state: state_of(pending, working, metrics.as_ref()),
        params,
        metrics,
    };

    if out.json(&details)? {
        return Ok(());
    }

    output::heading(&format!("Task {} ({:?})", details.tid, details.state));

    match &details.params {
        Some(params) => {
            output::heading("Parameters");
            output::fields(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        None => output::warn("Listing is missing; this task can never be acquired"),
    }

    if let Some(metrics) = &details.metrics {
        output::heading("Metrics");
        let rendered: Vec<(String, String)> = metrics
            .fields()
            .iter()
            .map(|(k, v)| {
                let shown = match v.parse::<i64>() {
                    Ok(secs) if is_timestamp_field(k) => {
                        format!("{} ({})", v, output::timestamp(secs))
                    }
                    _ => v.clone(),
                };
                (k.clone(), shown)
            })
            .collect();
        output::fields(rendered.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    println!();
    Ok(())
}

fn is_timestamp_field(name: &str) -> bool {
    use tasklane_queue::fields::{HEARTBEAT, LAST_ACQUIRED, LAST_RELEASED};
    matches!(name, HEARTBEAT | LAST_ACQUIRED | LAST_RELEASED)
}
