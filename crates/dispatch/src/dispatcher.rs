//! Validate-then-delegate routing of tool invocations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use session::{Backend, Call, Page, Session, TrackType};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ToolKind, ToolSpec};
use crate::schema::Arguments;
use crate::ToolError;

/// Default bound on a single delegation.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

// Lifecycle of one delegation, shared between the caller and its task.
const QUEUED: u8 = 0;
const STARTED: u8 = 1;
const ABANDONED: u8 = 2;

/// What to do when an invocation finds the session unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Fail with `ConnectionUnavailable`.
    #[default]
    Never,
    /// Try one `acquire()` before failing.
    OnUnavailable,
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub call_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            reconnect: ReconnectPolicy::Never,
        }
    }
}

/// The work a validated invocation turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Info,
    Reconnect,
    Call(Call),
}

/// Routes tool invocations to the session, one at a time.
pub struct Dispatcher<B> {
    catalog: Catalog,
    session: Arc<Session<B>>,
    gate: Arc<Mutex<()>>,
    options: DispatchOptions,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(catalog: Catalog, session: Arc<Session<B>>, options: DispatchOptions) -> Self {
        Self {
            catalog,
            session,
            gate: Arc::new(Mutex::new(())),
            options,
        }
    }

    /// The tool catalog, in registration order.
    pub fn list_tools(&self) -> &[ToolSpec] {
        self.catalog.tools()
    }

    pub fn session(&self) -> &Arc<Session<B>> {
        &self.session
    }

    /// Invoke a tool by name.
    ///
    /// Validation completes before anything reaches the session.
    pub async fn invoke(&self, name: &str, args: Option<&Value>) -> Result<Value, ToolError> {
        let spec = self
            .catalog
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })?;

        let arguments = spec.validate(args)?;
        let step = plan(spec.kind, &arguments)?;
        debug!(tool = name, ?step, "validated");

        let started = Instant::now();
        let outcome = self.delegate(step).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => info!(tool = name, elapsed_ms, "tool succeeded"),
            Err(e) => warn!(tool = name, elapsed_ms, kind = e.kind(), error = %e, "tool failed"),
        }
        outcome
    }

    /// Run `step` under the gate, bounded by the call timeout.
    ///
    /// A delegation that has started keeps the gate until the backend
    /// returns, even after the caller has given up, so delegations never
    /// overlap. A call that times out while still queued is abandoned and
    /// never reaches the backend.
    async fn delegate(&self, step: Step) -> Result<Value, ToolError> {
        let session = Arc::clone(&self.session);
        let gate = Arc::clone(&self.gate);
        let reconnect = self.options.reconnect;
        let phase = Arc::new(AtomicU8::new(QUEUED));
        let task_phase = Arc::clone(&phase);

        let task = tokio::spawn(async move {
            let _turn = gate.lock_owned().await;
            if task_phase
                .compare_exchange(QUEUED, STARTED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return None;
            }
            Some(run(&session, step, reconnect).await)
        });

        let timeout_ms = self.options.call_timeout.as_millis() as u64;
        match tokio::time::timeout(self.options.call_timeout, task).await {
            Ok(Ok(Some(outcome))) => {
                self.session.record_success().await;
                outcome.map_err(ToolError::from)
            }
            Ok(Ok(None)) => Err(ToolError::UpstreamTimeout { timeout_ms }),
            Ok(Err(join)) => Err(ToolError::UpstreamError {
                message: format!("delegation task failed: {join}"),
            }),
            Err(_) => {
                let abandoned = phase
                    .compare_exchange(QUEUED, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if abandoned {
                    // Never reached the backend, so it says nothing about the session.
                    debug!(timeout_ms, "call timed out waiting for its turn");
                } else if self.session.record_timeout().await {
                    warn!(timeout_ms, "session dropped after repeated timeouts");
                }
                Err(ToolError::UpstreamTimeout { timeout_ms })
            }
        }
    }
}

async fn run<B: Backend>(
    session: &Session<B>,
    step: Step,
    reconnect: ReconnectPolicy,
) -> session::Result<Value> {
    let call = match step {
        Step::Reconnect => {
            let product = session.acquire().await?;
            return Ok(serde_json::to_value(product)?);
        }
        Step::Info => None,
        Step::Call(call) => Some(call),
    };

    if reconnect == ReconnectPolicy::OnUnavailable && !session.is_available().await {
        info!("session unavailable, attempting one reacquisition");
        session.acquire().await?;
    }

    match call {
        None => Ok(serde_json::to_value(session.product().await?)?),
        Some(call) => {
            let value = session.execute(&call).await?;
            Ok(annotate(&call, value))
        }
    }
}

/// Map a validated invocation onto session work.
fn plan(kind: ToolKind, args: &Arguments) -> Result<Step, ToolError> {
    let call = match kind {
        ToolKind::GetResolveInfo => return Ok(Step::Info),
        ToolKind::Reconnect => return Ok(Step::Reconnect),
        ToolKind::GetCurrentPage => Call::CurrentPage,
        ToolKind::SwitchPage => Call::SwitchPage {
            page: args.parse::<Page>("page")?,
        },
        ToolKind::GetCurrentProject => Call::CurrentProject,
        ToolKind::GetProjectSettings => Call::ProjectSettings {
            key: args.str("key").map(str::to_string),
        },
        ToolKind::ListTimelines => Call::ListTimelines,
        ToolKind::GetCurrentTimeline => Call::CurrentTimeline,
        ToolKind::SetCurrentTimeline => Call::SetCurrentTimeline {
            name: args.require_str("name")?.to_string(),
        },
        ToolKind::CreateTimeline => Call::CreateTimeline {
            name: args.require_str("name")?.to_string(),
        },
        ToolKind::GetTrackCount => Call::TrackCount {
            track_type: args.parse::<TrackType>("track_type")?,
        },
        ToolKind::ListTrackItems => Call::TrackItems {
            track_type: args.parse::<TrackType>("track_type")?,
            track_index: u32::try_from(args.require_integer("track_index")?)
                .map_err(|_| ToolError::invalid("track_index", "out of range"))?,
        },
        ToolKind::ListMediaPool => Call::MediaPool,
    };
    Ok(Step::Call(call))
}

/// Echo the addressed track back into track payloads.
fn annotate(call: &Call, mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        match call {
            Call::TrackCount { track_type } => {
                map.insert("track_type".into(), json!(track_type));
            }
            Call::TrackItems {
                track_type,
                track_index,
            } => {
                map.insert("track_type".into(), json!(track_type));
                map.insert("track_index".into(), json!(track_index));
            }
            _ => {}
        }
    }
    value
}
