//! Adapter between the MCP service and the dispatcher.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dispatch::{Dispatcher, ToolError, ToolSpec};
use journal::{InvocationRecord, Journal, Outcome};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler};
use serde_json::{Value, json};
use session::Backend;
use tracing::warn;

pub const SERVER_NAME: &str = "resolve-mcp";
const INSTRUCTIONS: &str = "Tools for driving a running DaVinci Resolve instance. \
If a tool reports connection_unavailable, follow the hint and call `reconnect`. \
Calls are executed one at a time; a timed-out call may still have taken effect.";

/// The Resolve tool catalog, served over MCP and recorded in the journal.
pub struct ResolveTools<B> {
    dispatcher: Dispatcher<B>,
    journal: Option<Arc<Mutex<Journal>>>,
}

impl<B: Backend> ResolveTools<B> {
    pub fn new(dispatcher: Dispatcher<B>, journal: Option<Journal>) -> Self {
        Self {
            dispatcher,
            journal: journal.map(|j| Arc::new(Mutex::new(j))),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }

    /// MCP definitions for the served catalog.
    pub fn tools(&self) -> Vec<Tool> {
        self.dispatcher.list_tools().iter().map(tool_definition).collect()
    }

    /// Invoke a tool and journal the outcome.
    pub async fn invoke(&self, name: &str, arguments: Option<&Value>) -> Result<Value, ToolError> {
        let started = Instant::now();
        let result = self.dispatcher.invoke(name, arguments).await;

        let outcome = match &result {
            Ok(_) => Outcome::Ok,
            Err(e) => Outcome::failed(e.kind(), e.to_string()),
        };
        self.record(name, arguments, outcome, started.elapsed()).await;
        result
    }

    /// A `tools/call` as the MCP client sees it.
    ///
    /// Unknown tools are protocol errors; every other failure is a tool
    /// result with `isError` set.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = arguments.map(Value::Object);
        match self.invoke(name, arguments.as_ref()).await {
            Ok(value) => Ok(CallToolResult::structured(value)),
            Err(e @ ToolError::UnknownTool { .. }) => Err(ErrorData::invalid_params(
                e.to_string(),
                Some(error_payload(&e)),
            )),
            Err(e) => Ok(CallToolResult::structured_error(error_payload(&e))),
        }
    }

    /// Append to the journal on the blocking pool; SQLite writes never run
    /// on a runtime worker.
    async fn record(&self, name: &str, arguments: Option<&Value>, outcome: Outcome, elapsed: Duration) {
        let Some(journal) = &self.journal else {
            return;
        };
        let record = InvocationRecord::new(
            name,
            arguments.cloned().unwrap_or(Value::Null),
            outcome,
            elapsed,
        );
        let journal = Arc::clone(journal);
        let appended = tokio::task::spawn_blocking(move || {
            journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .append(&record)
        })
        .await;

        match appended {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tool = name, error = %e, "failed to journal invocation"),
            Err(e) => warn!(tool = name, error = %e, "journal task failed"),
        }
    }
}

impl<B: Backend> ServerHandler for ResolveTools<B> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&request.name, request.arguments).await
    }
}

/// MCP tool definition for a catalog entry.
pub fn tool_definition(spec: &ToolSpec) -> Tool {
    let schema = match spec.input_schema() {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    Tool::new(spec.name, spec.description, Arc::new(schema))
}

fn error_payload(e: &ToolError) -> Value {
    serde_json::to_value(e).unwrap_or_else(|_| json!({ "kind": e.kind(), "message": e.to_string() }))
}
