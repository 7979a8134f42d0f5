//! MCP error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The client never completed the initialize handshake.
    #[error("MCP initialization failed: {0}")]
    Initialize(String),

    #[error("MCP service task failed: {0}")]
    Service(#[from] tokio::task::JoinError),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
