//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The journal file does not exist yet.
    #[error("journal not found at {path}. Run 'resolve-mcp serve' or 'resolve-mcp call' first")]
    JournalNotFound { path: PathBuf },

    /// The journal is disabled in config.
    #[error("journal is disabled (journal.enabled = false)")]
    JournalDisabled,

    /// `--args` was not a JSON object.
    #[error("invalid --args: {0}")]
    InvalidArgs(String),

    /// A tool invocation failed.
    #[error("{tool} failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: dispatch::ToolError,
    },

    /// The application could not be reached.
    #[error(transparent)]
    Session(#[from] session::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] dispatch::CatalogError),

    #[error(transparent)]
    Journal(#[from] journal::Error),

    #[error(transparent)]
    Mcp(#[from] mcp::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
