//! MCP server plumbing.
//!
//! Protocol handling comes from [`rmcp`]: implement [`rmcp::ServerHandler`]
//! and hand it to [`serve_stdio`]. This crate supplies the line-delimited
//! transport underneath it, which keeps a session alive across malformed or
//! oversized input and honors client cancellation.
//!
//! # Example
//!
//! ```no_run
//! use rmcp::ServerHandler;
//! use rmcp::model::{ServerCapabilities, ServerInfo};
//!
//! struct Echo;
//!
//! impl ServerHandler for Echo {
//!     fn get_info(&self) -> ServerInfo {
//!         ServerInfo {
//!             capabilities: ServerCapabilities::builder().enable_tools().build(),
//!             ..Default::default()
//!         }
//!     }
//! }
//!
//! # async fn example() -> mcp::Result<()> {
//! mcp::serve_stdio(Echo).await
//! # }
//! ```

mod error;
mod server;
mod transport;

pub use error::{Error, Result};
pub use server::{serve, serve_stdio, serve_transport};
pub use transport::{
    INVALID_PARAMS, INVALID_REQUEST, LineTransport, MAX_LINE_SIZE, METHOD_NOT_FOUND, PARSE_ERROR,
};
