//! One task submission per input line.

use std::time::Duration;

use serde::Deserialize;
use taskforge_engine::{Payload, Task};

/// A task as submitted on stdin:
///
/// ```json
/// {"type": "sleep", "priority": 8, "payload": {"ms": 250}, "delay_ms": 1000}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRequest {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub payload: Payload,
    pub delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

impl TaskRequest {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn into_task(self) -> Task {
        let mut task = Task::new(self.task_type, self.payload).with_priority(self.priority);
        if let Some(max) = self.max_retries {
            task = task.with_max_retries(max);
        }
        if let Some(ms) = self.delay_ms {
            task = task.delayed(Duration::from_millis(ms));
        }
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn minimal_line_uses_defaults() {
        let task = TaskRequest::parse(r#"{"type": "echo"}"#).unwrap().into_task();

        assert_eq!(task.task_type, "echo");
        assert_eq!(task.priority, 0);
        assert!(task.payload.is_empty());
        assert_eq!(task.max_retries, 3);
        assert!(task.is_due(Utc::now()));
    }

    #[test]
    fn full_line() {
        let request = TaskRequest::parse(
            r#"{
                "type": "sleep",
                "priority": 8,
                "payload": {"ms": 5},
                "delay_ms": 60000,
                "max_retries": 1
            }"#,
        )
        .unwrap();
        let task = request.into_task();

        assert_eq!(task.priority, 8);
        assert_eq!(task.max_retries, 1);
        assert_eq!(task.payload["ms"], 5);
        assert!(!task.is_due(Utc::now()));
    }

    #[test]
    fn rejects_garbage() {
        assert!(TaskRequest::parse("not json").is_err());
        assert!(TaskRequest::parse(r#"{"priority": 1}"#).is_err());
        assert!(TaskRequest::parse(r#"{"type": "echo", "prio": 1}"#).is_err());
    }
}
