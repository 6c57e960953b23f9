//! Built-in handlers.

use std::time::Duration;

use taskforge_engine::{HandlerError, HandlerRegistry, HandlerResult, Payload, TaskContext};

/// `echo`, `sleep` and `fail`.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register("echo", echo)
        .register("sleep", sleep)
        .register("fail", fail);
    registry
}

/// Returns its payload.
pub async fn echo(ctx: TaskContext) -> HandlerResult {
    Ok(ctx.payload().clone())
}

/// Sleeps for `ms` milliseconds, giving up if the attempt is cancelled.
pub async fn sleep(ctx: TaskContext) -> HandlerResult {
    let ms = ctx
        .payload()
        .get("ms")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerError::failed("sleep needs a numeric `ms`"))?;

    ctx.run_until_cancelled(tokio::time::sleep(Duration::from_millis(ms)))
        .await?;

    let mut out = Payload::new();
    out.insert("slept_ms".into(), ms.into());
    Ok(out)
}

/// Always fails, with `message` if given.
pub async fn fail(ctx: TaskContext) -> HandlerResult {
    let message = ctx
        .payload()
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("failure requested");
    Err(HandlerError::failed(format!(
        "{message} (attempt {})",
        ctx.attempt()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskforge_engine::{EngineConfig, InMemoryTaskStore, Task, TaskEngine, TaskStatus};

    async fn run(task: Task) -> Task {
        let store = InMemoryTaskStore::arc();
        let config = EngineConfig::default().with_time_unit(Duration::from_millis(5));
        let engine = TaskEngine::start(config, builtin_registry(), store.clone()).unwrap();
        let id = task.id;

        engine.enqueue(task).await.unwrap();
        let done = store
            .wait_for_terminal(id, Duration::from_secs(5))
            .await
            .unwrap();
        engine.shutdown().await;
        done
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn echo_returns_its_payload() {
        let input = payload(json!({"msg": "hi"}));
        let done = run(Task::new("echo", input.clone())).await;

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result, Some(input));
    }

    #[tokio::test]
    async fn sleep_reports_how_long() {
        let done = run(Task::new("sleep", payload(json!({"ms": 10})))).await;

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.unwrap()["slept_ms"], json!(10));
    }

    #[tokio::test]
    async fn sleep_without_duration_fails() {
        let done = run(Task::new("sleep", Payload::new()).with_max_retries(0)).await;

        assert_eq!(done.status, TaskStatus::Failed);
        assert!(done.error.unwrap().contains("numeric `ms`"));
    }

    #[tokio::test]
    async fn fail_exhausts_retries() {
        let task = Task::new("fail", payload(json!({"message": "nope"}))).with_max_retries(1);
        let done = run(task).await;

        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.retry_count, 1);
        assert_eq!(done.error.as_deref(), Some("handler failed: nope (attempt 2)"));
    }

    #[test]
    fn registry_has_the_builtins() {
        assert_eq!(builtin_registry().task_types(), vec!["echo", "fail", "sleep"]);
    }
}
