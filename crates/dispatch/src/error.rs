//! Tool invocation errors.

use serde::Serialize;
use session::Unavailable;
use thiserror::Error;

/// Errors that can occur during a tool invocation.
///
/// Serialized with a `kind` tag so callers can branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolError {
    /// The application cannot be reached.
    #[error("connection unavailable: {reason} (hint: {hint})")]
    ConnectionUnavailable {
        #[serde(flatten)]
        reason: Unavailable,
        hint: String,
    },

    /// Arguments failed schema or enum validation.
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    /// The tool is not in the catalog.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// The application did not answer within the bound.
    #[error("upstream call timed out after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    /// The application rejected the call.
    #[error("upstream error: {message}")]
    UpstreamError { message: String },
}

impl ToolError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::ConnectionUnavailable { .. } => "connection_unavailable",
            ToolError::InvalidArgument { .. } => "invalid_argument",
            ToolError::UnknownTool { .. } => "unknown_tool",
            ToolError::UpstreamTimeout { .. } => "upstream_timeout",
            ToolError::UpstreamError { .. } => "upstream_error",
        }
    }
}

impl From<Unavailable> for ToolError {
    fn from(reason: Unavailable) -> Self {
        ToolError::ConnectionUnavailable {
            hint: reason.hint().to_string(),
            reason,
        }
    }
}

impl From<session::Error> for ToolError {
    fn from(e: session::Error) -> Self {
        match e {
            session::Error::Unavailable(reason) => reason.into(),
            session::Error::Upstream(message) => ToolError::UpstreamError { message },
            other => ToolError::UpstreamError {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_serialized_tag() {
        let errors = [
            ToolError::from(Unavailable::NotAcquired),
            ToolError::invalid("page", "missing"),
            ToolError::UnknownTool { name: "x".into() },
            ToolError::UpstreamTimeout { timeout_ms: 5 },
            ToolError::UpstreamError {
                message: "boom".into(),
            },
        ];
        for err in errors {
            let json = serde_json::to_value(&err).unwrap();
            assert_eq!(json["kind"], err.kind());
        }
    }

    #[test]
    fn unavailable_carries_reason_and_hint() {
        let err = ToolError::from(session::Error::Unavailable(
            Unavailable::BindingNotFound {
                detail: "no fusionscript".into(),
            },
        ));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["reason"], "binding_not_found");
        assert_eq!(json["detail"], "no fusionscript");
        assert!(json["hint"].as_str().unwrap().contains("RESOLVE_SCRIPT_API"));
    }

    #[test]
    fn upstream_message_is_not_reinterpreted() {
        let err = ToolError::from(session::Error::Upstream("OpenPage failed".into()));
        assert_eq!(
            err,
            ToolError::UpstreamError {
                message: "OpenPage failed".into()
            }
        );
    }
}
