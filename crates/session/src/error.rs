//! Session error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the application cannot be reached.
///
/// The variants carry different remediation: a missing binding is fixed in
/// the environment, a missing application is fixed by starting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
    /// The scripting module or library could not be located or loaded.
    #[error("scripting binding not found: {detail}")]
    BindingNotFound { detail: String },

    /// The binding loaded but no running application answered.
    #[error("DaVinci Resolve is not running: {detail}")]
    ApplicationNotRunning { detail: String },

    /// No connection has been acquired yet.
    #[error("no session has been acquired")]
    NotAcquired,

    /// The connection was dropped after repeated timeouts or a dead host.
    #[error("connection lost: {detail}")]
    ConnectionLost { detail: String },
}

impl Unavailable {
    /// A remediation hint suitable for showing to the caller.
    pub fn hint(&self) -> &'static str {
        match self {
            Unavailable::BindingNotFound { .. } => {
                "check RESOLVE_SCRIPT_API, RESOLVE_SCRIPT_LIB and the module path in resolve-mcp.toml"
            }
            Unavailable::ApplicationNotRunning { .. } => {
                "start DaVinci Resolve and enable external scripting, then call the reconnect tool"
            }
            Unavailable::NotAcquired | Unavailable::ConnectionLost { .. } => {
                "call the reconnect tool once DaVinci Resolve is responsive"
            }
        }
    }
}

/// Session errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The application cannot be reached.
    #[error(transparent)]
    Unavailable(#[from] Unavailable),

    /// The application rejected a well-formed call.
    #[error("{0}")]
    Upstream(String),

    /// The script host sent something we could not understand.
    #[error("script host protocol error: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
