//! Running an rmcp [`ServerHandler`] over line-delimited stdio.

use rmcp::{ServerHandler, ServiceExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::error::{Error, Result};
use crate::transport::LineTransport;

/// Serve `handler` on the process's stdin and stdout.
pub async fn serve_stdio<S: ServerHandler>(handler: S) -> Result<()> {
    serve(handler, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve `handler` until `reader` reaches end of input.
pub async fn serve<S, R, W>(handler: S, reader: R, writer: W) -> Result<()>
where
    S: ServerHandler,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve_transport(handler, LineTransport::new(reader, writer)).await
}

/// Serve `handler` over an already configured transport.
pub async fn serve_transport<S, R, W>(handler: S, transport: LineTransport<R, W>) -> Result<()>
where
    S: ServerHandler,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let service = handler
        .serve(transport)
        .await
        .map_err(|e| Error::Initialize(e.to_string()))?;
    let reason = service.waiting().await?;
    info!(?reason, "MCP session ended");
    Ok(())
}
