//! Session handle for DaVinci Resolve's scripting endpoint.
//!
//! This crate owns the single connection between the bridge and a running
//! application instance.
//!
//! # Overview
//!
//! - **Session**: the process-wide connection. Starts detached, becomes
//!   attached after a successful [`Session::acquire`], and drops back to
//!   detached when the host dies or too many calls time out.
//! - **Backend**: a trait abstracting how calls reach the application.
//!   [`ScriptHost`] is the shipped implementation; tests substitute fakes.
//! - **Call**: one typed operation against the scripting API.
//!
//! # Example
//!
//! ```no_run
//! use session::{BindingPaths, HostConfig, Page, ScriptHost, Session};
//!
//! # async fn example() -> session::Result<()> {
//! let paths = BindingPaths::from_env();
//! let session = Session::new(ScriptHost::new(HostConfig::python("python3", paths)));
//!
//! let product = session.acquire().await?;
//! println!("{} {}", product.product, product.version);
//!
//! session.switch_page(Page::Color).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod binding;
mod error;
mod page;
mod script_host;
mod session;

pub use backend::{Backend, Call, ProductInfo};
pub use binding::{BindingPaths, Lookup, MODULES_VAR, SCRIPT_API_VAR, SCRIPT_LIB_VAR};
pub use error::{Error, Result, Unavailable};
pub use page::{Page, ParseEnumError, TrackType};
pub use script_host::{HOST_SCRIPT, HostConfig, ScriptHost};
pub use session::{DEFAULT_MAX_CONSECUTIVE_TIMEOUTS, Session, Status};
