//! Invocation records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    /// `kind` is the tool error kind, e.g. `upstream_timeout`.
    Failed { kind: String, message: String },
}

impl Outcome {
    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Column value: `ok` or the error kind.
    pub fn label(&self) -> &str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Failed { kind, .. } => kind,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Ok => None,
            Outcome::Failed { message, .. } => Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

/// One tool invocation as seen by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub arguments: Value,
    pub outcome: Outcome,
    pub elapsed_ms: u64,
}

impl InvocationRecord {
    pub fn new(tool: impl Into<String>, arguments: Value, outcome: Outcome, elapsed: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tool: tool.into(),
            arguments,
            outcome,
            elapsed_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_labels() {
        assert_eq!(Outcome::Ok.label(), "ok");
        assert_eq!(Outcome::Ok.message(), None);

        let failed = Outcome::failed("upstream_timeout", "no response within 10000ms");
        assert_eq!(failed.label(), "upstream_timeout");
        assert_eq!(failed.message(), Some("no response within 10000ms"));
        assert!(!failed.is_ok());
    }

    #[test]
    fn new_record_measures_elapsed() {
        let record = InvocationRecord::new(
            "switch_page",
            json!({"page": "color"}),
            Outcome::Ok,
            Duration::from_millis(42),
        );
        assert_eq!(record.elapsed_ms, 42);
        assert_eq!(record.tool, "switch_page");
        assert_eq!(record.id.get_version_num(), 4);
    }
}
