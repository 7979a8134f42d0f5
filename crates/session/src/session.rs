//! Session management.

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{Backend, Call, Error, Page, ProductInfo, Result, Unavailable};

/// Default number of back-to-back timeouts before the session is dropped.
pub const DEFAULT_MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

/// Snapshot of the session state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    Connected {
        product: ProductInfo,
        page: Option<Page>,
    },
    Unavailable {
        #[serde(flatten)]
        reason: Unavailable,
    },
}

#[derive(Debug)]
enum Link {
    Attached(ProductInfo),
    Detached(Unavailable),
}

#[derive(Debug)]
struct State {
    link: Link,
    page: Option<Page>,
    consecutive_timeouts: u32,
}

/// The single live connection to the application.
///
/// Constructed once by the entry point and handed to the dispatcher. Calls
/// made while detached fail fast; nothing here reconnects on its own.
pub struct Session<B> {
    backend: B,
    state: Mutex<State>,
    max_consecutive_timeouts: u32,
}

impl<B: Backend> Session<B> {
    /// Create a detached session around a backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Mutex::new(State {
                link: Link::Detached(Unavailable::NotAcquired),
                page: None,
                consecutive_timeouts: 0,
            }),
            max_consecutive_timeouts: DEFAULT_MAX_CONSECUTIVE_TIMEOUTS,
        }
    }

    /// Set how many consecutive timeouts drop the connection (minimum 1).
    pub fn with_max_consecutive_timeouts(mut self, max: u32) -> Self {
        self.max_consecutive_timeouts = max.max(1);
        self
    }

    /// Access the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Connect to the application, replacing any previous connection.
    pub async fn acquire(&self) -> Result<ProductInfo> {
        let outcome = self.backend.connect().await;
        let mut state = self.state.lock().await;
        state.page = None;
        state.consecutive_timeouts = 0;

        match outcome {
            Ok(product) => {
                info!(product = %product.product, version = %product.version, "session acquired");
                state.link = Link::Attached(product.clone());
                Ok(product)
            }
            Err(e) => {
                warn!(error = %e, "session acquisition failed");
                state.link = Link::Detached(match &e {
                    Error::Unavailable(reason) => reason.clone(),
                    _ => Unavailable::NotAcquired,
                });
                Err(e)
            }
        }
    }

    /// Whether a connection is currently held.
    pub async fn is_available(&self) -> bool {
        matches!(self.state.lock().await.link, Link::Attached(_))
    }

    /// Current state, for diagnostics.
    pub async fn status(&self) -> Status {
        let state = self.state.lock().await;
        match &state.link {
            Link::Attached(product) => Status::Connected {
                product: product.clone(),
                page: state.page,
            },
            Link::Detached(reason) => Status::Unavailable {
                reason: reason.clone(),
            },
        }
    }

    /// Product name and version cached at acquisition.
    pub async fn product(&self) -> Result<ProductInfo> {
        match &self.state.lock().await.link {
            Link::Attached(product) => Ok(product.clone()),
            Link::Detached(reason) => Err(reason.clone().into()),
        }
    }

    /// The page the application is showing.
    pub async fn current_page(&self) -> Result<Page> {
        let value = self.execute(&Call::CurrentPage).await?;
        read_page(&value)
    }

    /// Switch the application to `target`.
    ///
    /// The page-change call is issued even when `target` is already active.
    pub async fn switch_page(&self, target: Page) -> Result<Page> {
        let value = self.execute(&Call::SwitchPage { page: target }).await?;
        read_page(&value)
    }

    /// Perform one call against the application.
    ///
    /// Page results are normalized to `{"page": <canonical name>}`.
    pub async fn execute(&self, call: &Call) -> Result<Value> {
        self.ensure_attached().await?;

        let value = match self.backend.execute(call).await {
            Ok(value) => value,
            Err(Error::Unavailable(reason)) => {
                warn!(method = call.method(), %reason, "connection dropped during call");
                self.detach(reason.clone()).await;
                return Err(reason.into());
            }
            Err(e) => return Err(e),
        };

        match call {
            Call::CurrentPage | Call::SwitchPage { .. } => {
                let page = match (call, read_page(&value)) {
                    (_, Ok(page)) => page,
                    (Call::SwitchPage { page }, Err(_)) => *page,
                    (_, Err(e)) => return Err(e),
                };
                self.state.lock().await.page = Some(page);
                Ok(json!({ "page": page }))
            }
            _ => Ok(value),
        }
    }

    /// Note a call that finished within its bound.
    pub async fn record_success(&self) {
        self.state.lock().await.consecutive_timeouts = 0;
    }

    /// Note a call that exceeded its bound.
    ///
    /// Returns `true` if this timeout dropped the connection.
    pub async fn record_timeout(&self) -> bool {
        let mut state = self.state.lock().await;
        state.consecutive_timeouts += 1;
        let count = state.consecutive_timeouts;

        if count >= self.max_consecutive_timeouts && matches!(state.link, Link::Attached(_)) {
            warn!(timeouts = count, "too many consecutive timeouts, dropping session");
            state.link = Link::Detached(Unavailable::ConnectionLost {
                detail: format!("{count} consecutive calls timed out"),
            });
            state.page = None;
            return true;
        }
        false
    }

    async fn ensure_attached(&self) -> Result<()> {
        match &self.state.lock().await.link {
            Link::Attached(_) => Ok(()),
            Link::Detached(reason) => Err(reason.clone().into()),
        }
    }

    async fn detach(&self, reason: Unavailable) {
        let mut state = self.state.lock().await;
        state.link = Link::Detached(reason);
        state.page = None;
    }
}

/// Accept either `{"page": "..."}` or a bare string.
fn read_page(value: &Value) -> Result<Page> {
    let name = value
        .get("page")
        .and_then(Value::as_str)
        .or_else(|| value.as_str())
        .ok_or_else(|| Error::Upstream(format!("application reported no current page: {value}")))?;
    name.parse()
        .map_err(|e| Error::Upstream(format!("application reported an unknown page: {e}")))
}
