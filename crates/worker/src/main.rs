use std::time::Duration;

use anyhow::Context;
use taskforge_engine::{EngineConfig, InMemoryTaskStore, TaskEngine, TaskId};
use taskforge_worker::handlers::builtin_registry;
use taskforge_worker::request::TaskRequest;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskforge_observability::init();

    let config = EngineConfig::from_env().context("invalid TASKFORGE_* configuration")?;
    let store = InMemoryTaskStore::arc();
    let engine = TaskEngine::start(config, builtin_registry(), store.clone())?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut submitted: Vec<TaskId> = Vec::new();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                tracing::warn!("interrupted; shutting down");
                engine.shutdown().await;
                return Ok(());
            }
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else { break };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let request = match TaskRequest::parse(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed submission");
                continue;
            }
        };
        let task = request.into_task();
        let id = task.id;
        match engine.submit(task).await {
            Ok(submission) => {
                tracing::info!(task_id = %id, ?submission, "task submitted");
                submitted.push(id);
            }
            Err(rejected) => {
                tracing::warn!(task_id = %id, error = %rejected.error, "task rejected");
            }
        }
    }

    tracing::info!(tasks = submitted.len(), "input closed; waiting for outstanding tasks");

    let outcomes = async {
        for id in &submitted {
            let task = loop {
                if let Some(task) = store.wait_for_terminal(*id, Duration::from_secs(60)).await {
                    break task;
                }
                tracing::debug!(task_id = %id, "still waiting");
            };
            tracing::info!(
                task_id = %task.id,
                status = %task.status,
                retries = task.retry_count,
                error = task.error.as_deref().unwrap_or_default(),
                "task finished"
            );
            println!("{}", serde_json::to_string(&task)?);
            store.remove(task.id);
        }
        anyhow::Ok(())
    };

    tokio::select! {
        _ = &mut ctrl_c => tracing::warn!("interrupted; shutting down"),
        result = outcomes => result?,
    }

    engine.shutdown().await;
    Ok(())
}
