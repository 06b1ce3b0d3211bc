//! Status command - pending and working tasks for a topic.

use colored::Colorize;
use serde::Serialize;
use tasklane_queue::{TaskId, TaskQueue};

use crate::error::CliResult;
use crate::output::{self, Output};

#[derive(Serialize)]
struct Status {
    topic: String,
    server_time: i64,
    pending: Vec<TaskId>,
    working: Vec<WorkingTask>,
}

#[derive(Serialize)]
struct WorkingTask {
    tid: TaskId,
    hostname: Option<String>,
    pid: Option<u32>,
    heartbeat: Option<i64>,
    heartbeat_age: Option<i64>,
}

pub async fn run(queue: &TaskQueue, out: Output) -> CliResult<()> {
    let now = queue.server_time().await?;
    let pending = queue.pending().await?;

    let mut working = Vec::new();
    for tid in queue.working().await? {
        let metrics = queue.metrics(&tid).await?.unwrap_or_default();
        working.push(WorkingTask {
            hostname: metrics.hostname().map(str::to_string),
            pid: metrics.pid(),
            heartbeat: metrics.heartbeat(),
            heartbeat_age: metrics.heartbeat_age(now),
            tid,
        });
    }

    let status = Status {
        topic: queue.topic().to_string(),
        server_time: now,
        pending,
        working,
    };

    if out.json(&status)? {
        return Ok(());
    }

    output::heading(&format!("Topic {}", status.topic.cyan()));
    output::info(&format!(
        "{} pending, {} working",
        status.pending.len(),
        status.working.len()
    ));

    if !status.pending.is_empty() {
        output::heading("Pending (oldest first)");
        for tid in &status.pending {
            println!("    {}", tid);
        }
    }

    if !status.working.is_empty() {
        output::heading("Working");
        for task in &status.working {
            let owner = match (&task.hostname, task.pid) {
                (Some(host), Some(pid)) => format!("{}:{}", host, pid),
                _ => "unknown owner".to_string(),
            };
            let age = task
                .heartbeat_age
                .map(|a| format!("heartbeat {}s ago", a))
                .unwrap_or_else(|| "no heartbeat".to_string());
            println!("    {}  {}  {}", task.tid, owner.dimmed(), age);
        }
    }
    println!();
    Ok(())
}
