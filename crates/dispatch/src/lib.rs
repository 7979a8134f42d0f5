//! Tool dispatcher for the Resolve bridge.
//!
//! Exposes a fixed catalog of tools, validates each invocation against the
//! tool's declared schema, and delegates the validated work to a
//! [`session::Session`] one call at a time.
//!
//! Every invocation follows `Received → Validated → Delegated →
//! {Succeeded | Failed}`. There is no retry: after an ambiguous failure the
//! application's state is unknown, so retrying is left to the caller.

mod catalog;
mod dispatcher;
mod error;
mod schema;


pub use catalog::{Catalog, CatalogError, ToolKind, ToolSpec};
pub use dispatcher::{DEFAULT_CALL_TIMEOUT, DispatchOptions, Dispatcher, ReconnectPolicy};
pub use error::ToolError;
pub use schema::{Arguments, Param, ParamKind};
