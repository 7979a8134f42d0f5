//! Script host backend (spawn, communicate, lifecycle).
//!
//! The scripting module is only loadable from the application's own
//! interpreter bindings, so the bridge runs a small helper process and talks
//! to it with one JSON object per line.

use std::ffi::OsString;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::binding::{BindingPaths, SCRIPT_API_VAR, SCRIPT_LIB_VAR};
use crate::{Backend, Call, Error, ProductInfo, Result, Unavailable};

/// Helper program run by the default interpreter.
pub const HOST_SCRIPT: &str = include_str!("../host/resolve_host.py");

/// Maximum size of a single response line (1MB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How to start the helper process.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub program: String,
    pub args: Vec<String>,
    pub paths: BindingPaths,
}

impl HostConfig {
    /// Run [`HOST_SCRIPT`] with the given Python interpreter.
    pub fn python(interpreter: impl Into<String>, paths: BindingPaths) -> Self {
        Self {
            program: interpreter.into(),
            args: vec!["-u".to_string(), "-c".to_string(), HOST_SCRIPT.to_string()],
            paths,
        }
    }
}

struct HostProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Backend that delegates to a helper process.
pub struct ScriptHost {
    config: HostConfig,
    process: Mutex<Option<HostProcess>>,
    next_id: AtomicI64,
}

impl ScriptHost {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            process: Mutex::new(None),
            next_id: AtomicI64::new(1),
        }
    }

    /// Check if the helper process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        match process.as_mut() {
            Some(p) => matches!(p.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the helper process, if any.
    pub async fn shutdown(&self) {
        if let Some(mut process) = self.process.lock().await.take() {
            let _ = process.child.kill().await;
        }
    }

    fn spawn(&self) -> Result<HostProcess> {
        let paths = &self.config.paths;
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .env(SCRIPT_API_VAR, &paths.script_api)
            .env(SCRIPT_LIB_VAR, &paths.script_lib)
            .env("PYTHONPATH", python_path(paths))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Unavailable::BindingNotFound {
            detail: format!("failed to start {}: {e}", self.config.program),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Protocol("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Protocol("failed to capture stdout".into()))?;

        debug!(program = %self.config.program, "script host spawned");
        Ok(HostProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn next_request_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Backend for ScriptHost {
    async fn connect(&self) -> Result<ProductInfo> {
        self.config.paths.verify()?;

        let mut guard = self.process.lock().await;
        if let Some(mut old) = guard.take() {
            info!("replacing existing script host");
            let _ = old.child.kill().await;
        }

        let mut process = self.spawn()?;
        let id = self.next_request_id();
        let value = exchange(&mut process, id, json!({ "method": "connect" })).await?;
        let product: ProductInfo = serde_json::from_value(value)?;

        *guard = Some(process);
        Ok(product)
    }

    async fn execute(&self, call: &Call) -> Result<Value> {
        let mut guard = self.process.lock().await;
        let process = guard.as_mut().ok_or(Unavailable::NotAcquired)?;

        let id = self.next_request_id();
        let result = exchange(process, id, serde_json::to_value(call)?).await;

        if matches!(
            result,
            Err(Error::Unavailable(Unavailable::ConnectionLost { .. }))
        ) {
            *guard = None;
        }
        result
    }
}

/// Send one request and wait for the response carrying the same id.
///
/// Responses with other ids belong to abandoned requests and are dropped.
async fn exchange(process: &mut HostProcess, id: i64, mut request: Value) -> Result<Value> {
    request["id"] = json!(id);
    let line = serde_json::to_string(&request)?;

    process.stdin.write_all(line.as_bytes()).await.map_err(lost)?;
    process.stdin.write_all(b"\n").await.map_err(lost)?;
    process.stdin.flush().await.map_err(lost)?;

    loop {
        let line = match read_bounded_line(&mut process.stdout, MAX_OUTPUT_SIZE)
            .await
            .map_err(lost)?
        {
            Bounded::Line(line) => line,
            Bounded::Eof => {
                return Err(Unavailable::ConnectionLost {
                    detail: "script host exited".into(),
                }
                .into());
            }
            Bounded::TooLong(size) => {
                return Err(Error::Protocol(format!(
                    "response too large: {size} bytes (max {MAX_OUTPUT_SIZE})"
                )));
            }
        };

        let response: HostResponse = serde_json::from_slice(&line)?;
        if response.id != Some(id) {
            warn!(expected = id, got = ?response.id, "discarding stale script host response");
            continue;
        }
        return response.into_result();
    }
}

enum Bounded {
    Eof,
    Line(Vec<u8>),
    TooLong(usize),
}

/// Read one line, buffering at most `max` bytes of it.
///
/// A longer line is consumed in bounded chunks and reported by size, so the
/// next read starts on a fresh line.
async fn read_bounded_line<R>(reader: &mut R, max: usize) -> std::io::Result<Bounded>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max as u64 + 1;
    let mut buf = Vec::new();
    if (&mut *reader).take(limit).read_until(b'\n', &mut buf).await? == 0 {
        return Ok(Bounded::Eof);
    }
    if buf.len() <= max || buf.ends_with(b"\n") {
        return Ok(Bounded::Line(buf));
    }

    let mut size = buf.len();
    loop {
        buf.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
        size += read;
        if read == 0 || buf.ends_with(b"\n") {
            return Ok(Bounded::TooLong(size));
        }
    }
}

fn lost(e: std::io::Error) -> Error {
    Unavailable::ConnectionLost {
        detail: format!("script host pipe: {e}"),
    }
    .into()
}

fn python_path(paths: &BindingPaths) -> OsString {
    let mut entries = vec![paths.modules.clone()];
    if let Some(existing) = std::env::var_os("PYTHONPATH") {
        entries.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(entries).unwrap_or_else(|_| paths.modules.clone().into_os_string())
}

#[derive(Debug, Deserialize)]
struct HostResponse {
    #[serde(default)]
    id: Option<i64>,
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<HostFailure>,
}

#[derive(Debug, Deserialize)]
struct HostFailure {
    kind: String,
    message: String,
}

impl HostResponse {
    fn into_result(self) -> Result<Value> {
        if self.ok {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let failure = self.error.ok_or_else(|| {
            Error::Protocol("failed response without an error body".into())
        })?;
        Err(failure.into())
    }
}

impl From<HostFailure> for Error {
    fn from(failure: HostFailure) -> Self {
        match failure.kind.as_str() {
            "module_not_found" => Unavailable::BindingNotFound {
                detail: failure.message,
            }
            .into(),
            "not_running" => Unavailable::ApplicationNotRunning {
                detail: failure.message,
            }
            .into(),
            _ => Error::Upstream(failure.message),
        }
    }
}
