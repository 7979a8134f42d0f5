//! SQLite-backed invocation journal for the Resolve bridge.
//!
//! Every tool invocation that reaches the dispatcher is recorded with its
//! arguments, outcome and duration, so "what did the assistant do to my
//! project?" can be answered after the fact.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use journal::{InvocationRecord, Journal, Outcome};
//!
//! let journal = Journal::open("journal.db")?;
//! journal.append(&InvocationRecord::new(
//!     "switch_page",
//!     serde_json::json!({"page": "color"}),
//!     Outcome::Ok,
//!     Duration::from_millis(12),
//! ))?;
//!
//! for record in journal.recent(20, Some("switch_page"))? {
//!     println!("{} {} {}", record.timestamp, record.tool, record.outcome.label());
//! }
//! # Ok::<(), journal::Error>(())
//! ```

mod error;
mod record;
mod store;

pub use error::{Error, Result};
pub use record::{InvocationRecord, Outcome};
pub use store::Journal;
