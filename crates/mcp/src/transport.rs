//! Line-delimited JSON-RPC framing under the rmcp service.
//!
//! rmcp owns the protocol: the initialize handshake, request routing and
//! response correlation. This transport owns the bytes. It bounds every
//! inbound line, answers lines that never become a message (bad UTF-8,
//! bad JSON, wrong version, unknown method) with a JSON-RPC error instead of
//! ending the session, and drops responses to requests the client has
//! cancelled.

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::sync::{Arc, PoisonError};

use rmcp::service::{RoleServer, RxJsonRpcMessage, TxJsonRpcMessage};
use rmcp::transport::Transport;
use serde_json::{Value, json};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Maximum size of one inbound message (1MB).
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// Requests a client may send to a tool server.
const CLIENT_METHODS: &[&str] = &[
    "initialize",
    "ping",
    "tools/list",
    "tools/call",
    "completion/complete",
    "logging/setLevel",
    "prompts/get",
    "prompts/list",
    "resources/list",
    "resources/templates/list",
    "resources/read",
    "resources/subscribe",
    "resources/unsubscribe",
];

/// Server-side transport over any reader/writer pair, one JSON message per
/// line.
pub struct LineTransport<R, W> {
    reader: BufReader<R>,
    writer: Arc<Mutex<W>>,
    /// Ids of requests cancelled by the client, as JSON text.
    cancelled: Arc<std::sync::Mutex<HashSet<String>>>,
    max_line: usize,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(writer)),
            cancelled: Arc::default(),
            max_line: MAX_LINE_SIZE,
        }
    }

    /// Override the inbound line limit.
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Turn one inbound line into a message, nothing, or an error reply.
    fn decode(&self, line: &[u8]) -> Decoded {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(e) => {
                warn!(error = %e, "inbound line is not UTF-8");
                return Decoded::Reply(error_reply(
                    Value::Null,
                    PARSE_ERROR,
                    format!("invalid UTF-8: {e}"),
                    None,
                ));
            }
        };
        if text.is_empty() {
            return Decoded::Skip;
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "inbound line is not JSON");
                return Decoded::Reply(error_reply(
                    Value::Null,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                    None,
                ));
            }
        };

        let id = value.get("id").cloned();
        let method = value.get("method").and_then(Value::as_str).map(str::to_string);
        let version = value.get("jsonrpc").cloned().unwrap_or(Value::Null);
        if version != "2.0" {
            return match id {
                Some(id) => Decoded::Reply(error_reply(
                    id,
                    INVALID_REQUEST,
                    "invalid JSON-RPC version".to_string(),
                    Some(json!({ "expected": "2.0", "got": version })),
                )),
                None => Decoded::Skip,
            };
        }

        if method.as_deref() == Some("notifications/cancelled") {
            if let Some(request_id) = value.pointer("/params/requestId") {
                info!(req_id = %request_id, "request cancelled by client");
                self.cancelled
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(request_id.to_string());
            }
        }

        match serde_json::from_value::<RxJsonRpcMessage<RoleServer>>(value) {
            Ok(message) => Decoded::Message(message),
            Err(e) => match (id, method) {
                (None, method) => {
                    debug!(?method, error = %e, "ignoring unrecognized notification");
                    Decoded::Skip
                }
                (Some(id), Some(method)) if CLIENT_METHODS.contains(&method.as_str()) => {
                    Decoded::Reply(error_reply(
                        id,
                        INVALID_PARAMS,
                        format!("invalid params for {method}: {e}"),
                        None,
                    ))
                }
                (Some(id), Some(method)) => Decoded::Reply(error_reply(
                    id,
                    METHOD_NOT_FOUND,
                    format!("method not found: {method}"),
                    None,
                )),
                (Some(id), None) => Decoded::Reply(error_reply(
                    id,
                    INVALID_REQUEST,
                    format!("invalid request: {e}"),
                    None,
                )),
            },
        }
    }
}

impl<R, W> Transport<RoleServer> for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Error = io::Error;

    fn send(
        &mut self,
        item: TxJsonRpcMessage<RoleServer>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let writer = Arc::clone(&self.writer);
        let cancelled = Arc::clone(&self.cancelled);
        async move {
            let value = serde_json::to_value(&item).map_err(io::Error::other)?;
            if let Some(id) = response_id(&value) {
                let dropped = cancelled
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id.to_string());
                if dropped {
                    info!(req_id = %id, "dropping response to cancelled request");
                    return Ok(());
                }
            }
            write_line(&writer, &value).await
        }
    }

    async fn receive(&mut self) -> Option<RxJsonRpcMessage<RoleServer>> {
        loop {
            let line = match read_bounded_line(&mut self.reader, self.max_line).await {
                Ok(Bounded::Line(line)) => line,
                Ok(Bounded::Eof) => {
                    debug!("end of input");
                    return None;
                }
                Ok(Bounded::TooLong(size)) => {
                    warn!(size, max = self.max_line, "inbound message too large");
                    let message = error_reply(
                        Value::Null,
                        INVALID_REQUEST,
                        format!("message too large: {size} bytes (max {})", self.max_line),
                        None,
                    );
                    reply(&self.writer, &message).await;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "failed to read from client");
                    return None;
                }
            };

            match self.decode(&line) {
                Decoded::Message(message) => return Some(message),
                Decoded::Skip => {}
                Decoded::Reply(message) => reply(&self.writer, &message).await,
            }
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.writer.lock().await.flush().await
    }
}

async fn reply<W>(writer: &Mutex<W>, reply: &Value)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = write_line(writer, reply).await {
        error!(error = %e, "failed to write error reply");
    }
}

enum Decoded {
    Message(RxJsonRpcMessage<RoleServer>),
    Skip,
    Reply(Value),
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
async fn read_bounded_line<R>(reader: &mut R, max: usize) -> io::Result<Bounded>
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

/// The id of an outbound response or error, `None` for requests and
/// notifications.
fn response_id(value: &Value) -> Option<&Value> {
    if value.get("method").is_some() {
        return None;
    }
    value.get("id")
}

fn error_reply(id: Value, code: i32, message: String, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

async fn write_line<W>(writer: &Mutex<W>, value: &Value) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(value).map_err(io::Error::other)?;
    line.push(b'\n');

    let mut writer = writer.lock().await;
    writer.write_all(&line).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    use rmcp::model::{
        CallToolRequestParams, CallToolResult, ListToolsResult, PaginatedRequestParams,
        ServerCapabilities, ServerInfo, Tool,
    };
    use rmcp::service::RequestContext;
    use rmcp::{ErrorData, ServerHandler};
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;

    /// Handler with an echo tool, a tool that waits on `gate`, and a tool
    /// that fails.
    struct FakeHandler {
        gate: Arc<Notify>,
    }

    impl ServerHandler for FakeHandler {
        fn get_info(&self) -> ServerInfo {
            ServerInfo {
                capabilities: ServerCapabilities::builder().enable_tools().build(),
                ..Default::default()
            }
        }

        async fn list_tools(
            &self,
            _request: Option<PaginatedRequestParams>,
            _context: RequestContext<RoleServer>,
        ) -> Result<ListToolsResult, ErrorData> {
            let mut schema = serde_json::Map::new();
            schema.insert("type".into(), json!("object"));
            Ok(ListToolsResult::with_all_items(vec![Tool::new(
                "echo",
                "Echo the arguments back",
                Arc::new(schema),
            )]))
        }

        async fn call_tool(
            &self,
            request: CallToolRequestParams,
            _context: RequestContext<RoleServer>,
        ) -> Result<CallToolResult, ErrorData> {
            match &*request.name {
                "echo" => Ok(CallToolResult::structured(Value::Object(
                    request.arguments.unwrap_or_default(),
                ))),
                "wait" => {
                    self.gate.notified().await;
                    Ok(CallToolResult::structured(json!("done")))
                }
                "fail" => Ok(CallToolResult::structured_error(json!({"kind": "upstream_error"}))),
                other => Err(ErrorData::invalid_params(format!("unknown tool: {other}"), None)),
            }
        }
    }

    struct Client {
        writer: WriteHalf<DuplexStream>,
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        server: JoinHandle<crate::Result<()>>,
    }

    impl Client {
        fn start(gate: Arc<Notify>, max_line: usize) -> Self {
            let (client, server_io) = tokio::io::duplex(64 * 1024);
            let (server_read, server_write) = tokio::io::split(server_io);
            let transport = LineTransport::new(server_read, server_write).with_max_line(max_line);
            let server = tokio::spawn(crate::serve_transport(FakeHandler { gate }, transport));
            let (read, writer) = tokio::io::split(client);
            Self {
                writer,
                lines: BufReader::new(read).lines(),
                server,
            }
        }

        async fn send(&mut self, message: Value) {
            self.send_bytes(message.to_string().as_bytes()).await;
        }

        async fn send_bytes(&mut self, line: &[u8]) {
            self.writer.write_all(line).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
            self.writer.flush().await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().expect("server closed");
            serde_json::from_str(&line).unwrap()
        }

        async fn initialize(&mut self) {
            self.send(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": {"name": "test-client", "version": "0.0.0"}
                }
            }))
            .await;
            let response = self.recv().await;
            assert_eq!(response["id"], 0);
            assert!(response["result"]["capabilities"]["tools"].is_object());
            self.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .await;
        }

        async fn ping(&mut self, id: u64) -> Value {
            self.send(json!({"jsonrpc": "2.0", "id": id, "method": "ping"}))
                .await;
            self.recv().await
        }

        async fn finish(mut self) {
            self.writer.shutdown().await.unwrap();
            self.server.await.unwrap().unwrap();
        }
    }

    fn client() -> Client {
        Client::start(Arc::new(Notify::new()), MAX_LINE_SIZE)
    }

    #[tokio::test]
    async fn initialize_then_list_tools() {
        let mut client = client();
        client.initialize().await;

        client
            .send(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .await;
        let response = client.recv().await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["tools"][0]["name"], "echo");
        assert_eq!(response["result"]["tools"][0]["inputSchema"]["type"], "object");

        client.finish().await;
    }

    #[tokio::test]
    async fn call_tool_returns_structured_content() {
        let mut client = client();
        client.initialize().await;

        client
            .send(json!({
                "jsonrpc": "2.0", "id": "a", "method": "tools/call",
                "params": {"name": "echo", "arguments": {"page": "color"}}
            }))
            .await;
        let response = client.recv().await;
        assert_eq!(response["id"], "a");
        assert_eq!(response["result"]["isError"], false);
        assert_eq!(response["result"]["structuredContent"]["page"], "color");

        client
            .send(json!({
                "jsonrpc": "2.0", "id": "b", "method": "tools/call",
                "params": {"name": "fail"}
            }))
            .await;
        let response = client.recv().await;
        assert_eq!(response["result"]["isError"], true);
    }

    #[tokio::test]
    async fn handler_errors_are_jsonrpc_errors() {
        let mut client = client();
        client.initialize().await;

        client
            .send(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "nope"}}))
            .await;
        let response = client.recv().await;
        assert_eq!(response["id"], 3);
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert_eq!(client.ping(4).await["id"], 4);
    }

    #[tokio::test]
    async fn malformed_lines_are_answered_and_session_continues() {
        let mut client = client();

        client.send_bytes(b"{not json").await;
        let response = client.recv().await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], PARSE_ERROR);

        client
            .send(json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}))
            .await;
        let response = client.recv().await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
        assert_eq!(response["error"]["data"]["got"], "1.0");

        client.initialize().await;
        client
            .send(json!({"jsonrpc": "2.0", "id": 2, "method": "bogus/method"}))
            .await;
        let response = client.recv().await;
        assert_eq!(response["id"], 2);
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        assert_eq!(client.ping(3).await["result"], json!({}));
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_the_session() {
        let mut client = client();
        client.initialize().await;

        client.send_bytes(&[0xff, 0xfe, b'{', 0xc3]).await;
        let response = client.recv().await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], PARSE_ERROR);

        let response = client.ping(5).await;
        assert_eq!(response["id"], 5);
        assert_eq!(response["result"], json!({}));
        client.finish().await;
    }

    #[tokio::test]
    async fn oversized_line_is_rejected_without_desync() {
        let mut client = Client::start(Arc::new(Notify::new()), 512);
        client.initialize().await;

        let padding = "x".repeat(4096);
        client
            .send(json!({"jsonrpc": "2.0", "id": 6, "method": "ping", "params": {"pad": padding}}))
            .await;
        let response = client.recv().await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .contains("too large")
        );

        assert_eq!(client.ping(7).await["id"], 7);
        client.finish().await;
    }

    #[tokio::test]
    async fn unknown_notifications_get_no_response() {
        let mut client = client();
        client.initialize().await;
        client
            .send(json!({"jsonrpc": "2.0", "method": "notifications/whatever"}))
            .await;
        let response = client.ping(9).await;
        assert_eq!(response["id"], 9);
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn cancelled_call_result_is_discarded() {
        let gate = Arc::new(Notify::new());
        let mut client = Client::start(Arc::clone(&gate), MAX_LINE_SIZE);
        client.initialize().await;

        client
            .send(json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "wait"}}))
            .await;
        client
            .send(json!({
                "jsonrpc": "2.0", "method": "notifications/cancelled",
                "params": {"requestId": 7, "reason": "user aborted"}
            }))
            .await;
        assert_eq!(client.ping(8).await["id"], 8);

        gate.notify_one();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(client.ping(10).await["id"], 10);
        client.finish().await;
    }

    #[tokio::test]
    async fn bounded_reader_skips_long_lines() {
        let mut input: &[u8] = b"0123456789abcdef\nok\n";
        assert!(matches!(
            read_bounded_line(&mut input, 8).await.unwrap(),
            Bounded::TooLong(17)
        ));
        match read_bounded_line(&mut input, 8).await.unwrap() {
            Bounded::Line(line) => assert_eq!(line, b"ok\n"),
            _ => panic!("expected the following line intact"),
        }
        assert!(matches!(
            read_bounded_line(&mut input, 8).await.unwrap(),
            Bounded::Eof
        ));
    }
}
