//! MCP over stdio
//!
//! Newline-delimited JSON-RPC on any `AsyncRead`/`AsyncWrite` pair. Each
//! request runs on its own task so a slow tool never blocks `ping` or
//! `tools/list`; responses are written in completion order.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::dispatch::Dispatcher;
use crate::jsonrpc::{IncomingMessage, JsonRpcError, JsonRpcResponse, RequestId};

/// Protocol revision this server implements
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Revisions a client may negotiate
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

const RESPONSE_CHANNEL_CAPACITY: usize = 256;

const INSTRUCTIONS: &str = "AT Protocol access. Public tools always work; private tools need an \
active session (see auth_status); enhanced tools work anonymously and add viewer state when \
authenticated.";

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// MCP request handler backed by a [`Dispatcher`]
#[derive(Debug, Clone)]
pub struct McpServer {
    dispatcher: Dispatcher,
    name: String,
    version: String,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one line; `None` for notifications and blank lines
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<IncomingMessage>(line) {
            Ok(message) => self.handle_message(message).await?,
            Err(e) => {
                warn!(error = %e, "Unparseable message");
                JsonRpcResponse::error(None, JsonRpcError::parse_error(e.to_string()))
            }
        };

        match serde_json::to_string(&response) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                error!(error = %e, "Failed to encode response");
                None
            }
        }
    }

    async fn handle_message(&self, message: IncomingMessage) -> Option<JsonRpcResponse> {
        let Some(id) = message.id else {
            trace!(method = ?message.method, "Notification");
            return None;
        };
        if message.jsonrpc.as_deref() != Some("2.0") {
            return Some(JsonRpcResponse::error(
                Some(id),
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }
        let Some(method) = message.method else {
            return Some(JsonRpcResponse::error(
                Some(id),
                JsonRpcError::invalid_request("missing method"),
            ));
        };

        debug!(%method, "Request");
        let result = match method.as_str() {
            "initialize" => Ok(self.initialize(message.params.as_ref())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(message.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(Some(id), error),
        })
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = requested
            .filter(|v| SUPPORTED_VERSIONS.contains(v))
            .unwrap_or(PROTOCOL_VERSION);

        info!(client_version = ?requested, negotiated = version, "Client initialized");
        json!({
            "protocolVersion": version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": self.name, "version": self.version },
            "instructions": INSTRUCTIONS,
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .dispatcher
            .catalogue()
            .into_iter()
            .map(|entry| {
                let description = if entry.available {
                    entry.descriptor.description.to_string()
                } else {
                    format!(
                        "{} (Unavailable: {})",
                        entry.descriptor.description, entry.availability
                    )
                };
                json!({
                    "name": entry.descriptor.name,
                    "description": description,
                    "inputSchema": entry.descriptor.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams =
            serde_json::from_value(params.unwrap_or_else(|| Value::Object(Map::new())))
                .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;

        let outcome = self
            .dispatcher
            .handle(&params.name, params.arguments.unwrap_or(Value::Null))
            .await;
        let structured = serde_json::to_value(&outcome)
            .map_err(|e| JsonRpcError::new(-32603, format!("Internal error: {e}")))?;
        let text = serde_json::to_string_pretty(&structured)
            .map_err(|e| JsonRpcError::new(-32603, format!("Internal error: {e}")))?;

        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": structured,
            "isError": !outcome.is_ok(),
        }))
    }

    /// Serve until EOF or cancellation
    ///
    /// In-flight requests finish and are answered before this returns.
    ///
    /// # Errors
    ///
    /// Returns the I/O error that stopped the writer.
    pub async fn serve<R, W>(
        &self,
        reader: R,
        writer: W,
        shutdown: CancellationToken,
    ) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let mut lines = FramedRead::new(BufReader::new(reader), LinesCodec::new());
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        let (tx, mut rx) = mpsc::channel::<String>(RESPONSE_CHANNEL_CAPACITY);
        let mut tx = Some(tx);

        loop {
            tokio::select! {
                _ = shutdown.cancelled(), if tx.is_some() => {
                    debug!("Shutdown requested; draining in-flight requests");
                    tx = None;
                }
                line = lines.next(), if tx.is_some() => match line {
                    Some(Ok(line)) => {
                        let Some(sender) = tx.clone() else { continue };
                        let server = self.clone();
                        tokio::spawn(async move {
                            if let Some(response) = server.handle_line(&line).await
                                && sender.send(response).await.is_err()
                            {
                                debug!("Response dropped; writer closed");
                            }
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Failed to read from input");
                        tx = None;
                    }
                    None => {
                        debug!("Input closed");
                        tx = None;
                    }
                },
                response = rx.recv() => match response {
                    Some(response) => sink.send(response).await.map_err(std::io::Error::other)?,
                    None => break,
                },
            }
        }

        info!("Stdio server stopped");
        Ok(())
    }
}
