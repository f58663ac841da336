//! MCP request handling and the stdio transport
//!
//! [`McpServer`] is stateless per request: everything a request needs is
//! re-read from the workspace. The only per-connection state is
//! [`SessionState`], owned by the transport and passed in, which gates every
//! method except `initialize` and `ping` until the connection is initialized.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use super::tools::ToolHandler;
use crate::api::events::SubscriptionHub;
use crate::error::{FocalError, Result};
use crate::namespace::Namespaces;
use crate::rules::RulesAggregator;
use crate::workspace::WorkspaceStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// Protocol version reported when the client does not name one
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported in `initialize`
pub const SERVER_NAME: &str = "FOCAL MCP";

/// Per-connection protocol state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// `initialize` has completed on this connection
    pub initialized: bool,

    /// Protocol version agreed in `initialize`
    pub protocol_version: Option<String>,

    /// Client name from `initialize`
    pub client_name: Option<String>,
}

/// MCP server that handles JSON-RPC requests
#[derive(Debug, Clone)]
pub struct McpServer {
    namespaces: Namespaces,
    rules: RulesAggregator,
    tools: ToolHandler,
}

impl McpServer {
    /// Create a new MCP server over an injected store
    pub fn new(store: WorkspaceStore) -> Self {
        let rules = RulesAggregator::new(store.clone());
        Self {
            namespaces: Namespaces::new(store),
            tools: ToolHandler::new(rules.clone()),
            rules,
        }
    }

    /// Run over stdin/stdout until EOF
    pub async fn run_stdio(&self, hub: &SubscriptionHub) -> Result<()> {
        info!("MCP server started, listening on stdin...");
        self.serve(tokio::io::stdin(), tokio::io::stdout(), hub).await?;
        info!("MCP server shutting down");
        Ok(())
    }

    /// Serve newline-delimited JSON-RPC on one connection
    ///
    /// The connection is also subscribed to `hub`; list-changed
    /// notifications are interleaved with responses once initialized.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W, hub: &SubscriptionHub) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut subscription = hub.subscribe();
        let mut session = SessionState::default();

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        debug!("Received request: {}", line);

                        if let Some(response) = self.process_line(&mut session, line) {
                            write_message(&mut writer, &response).await?;
                        }
                    }
                    Ok(None) => {
                        debug!("Received EOF, shutting down");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read request: {}", e);
                        break;
                    }
                },
                notification = subscription.recv() => match notification {
                    Some(notification) => {
                        if session.initialized {
                            write_message(&mut writer, &notification.to_json_rpc()).await?;
                        }
                    }
                    None => {
                        warn!("Notification channel dropped, resubscribing");
                        subscription = hub.subscribe();
                    }
                },
            }
        }

        Ok(())
    }

    /// Parse and handle one raw JSON-RPC message
    pub fn process_line(&self, session: &mut SessionState, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
                ));
            }
        };
        self.process_value(session, value)
    }

    /// Handle one already-parsed JSON-RPC message
    pub fn process_value(&self, session: &mut SessionState, value: Value) -> Option<JsonRpcResponse> {
        if value.is_array() {
            return Some(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("batch requests are not supported"),
            ));
        }

        let id = value.get("id").cloned().filter(|id| !id.is_null());
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(session, request),
            Err(e) => Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!("Invalid request: {}", e)),
            )),
        }
    }

    /// Handle a request; `None` for notifications
    pub fn handle_request(
        &self,
        session: &mut SessionState,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return (!request.is_notification()).then(|| {
                JsonRpcResponse::error(
                    request.id.clone(),
                    JsonRpcError::invalid_request("jsonrpc must be '2.0'"),
                )
            });
        }

        let result = self.dispatch(session, &request);

        if request.is_notification() {
            if let Err(e) = result {
                debug!("Notification {} failed: {}", request.method, e);
            }
            return None;
        }

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => {
                if matches!(e, FocalError::Io(_) | FocalError::Other(_)) {
                    error!("MCP {} failed: {}", request.method, e);
                } else {
                    debug!("MCP {} rejected: {}", request.method, e);
                }
                JsonRpcResponse::error(request.id, JsonRpcError::from(&e))
            }
        })
    }

    /// Route to handler
    fn dispatch(&self, session: &mut SessionState, request: &JsonRpcRequest) -> Result<Value> {
        let params = &request.params;
        match request.method.as_str() {
            "initialize" => self.handle_initialize(session, params),
            "ping" => Ok(json!({})),

            _ if !session.initialized => Err(FocalError::NotInitialized),

            "notifications/initialized" | "notifications/cancelled" | "logging/setLevel" => {
                Ok(json!({}))
            }

            "prompts/list" => self.handle_prompts_list(),
            "prompts/get" => self.handle_prompts_get(params),

            "resources/list" => self.handle_resources_list(),
            "resources/read" => self.handle_resources_read(params),
            "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
            // List-changed fan-out already reaches every subscriber
            "resources/subscribe" | "resources/unsubscribe" => {
                required_str(params, "uri")?;
                Ok(json!({}))
            }

            "tools/list" => Ok(json!({ "tools": self.tools.list_tools() })),
            "tools/call" => self.handle_tools_call(params),

            other => Err(FocalError::MethodNotFound(other.to_string())),
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, session: &mut SessionState, params: &Value) -> Result<Value> {
        let params = params_object(params)?;
        let protocol_version = match params.get("protocolVersion") {
            None | Some(Value::Null) => DEFAULT_PROTOCOL_VERSION.to_string(),
            Some(Value::String(version)) => version.clone(),
            Some(_) => {
                return Err(FocalError::InvalidParams(
                    "protocolVersion must be a string".to_string(),
                ))
            }
        };
        let client_name = params
            .get("clientInfo")
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let instructions = self.rules.build_bundle()?.instructions();

        session.initialized = true;
        session.protocol_version = Some(protocol_version.clone());
        session.client_name = client_name;
        info!(
            "MCP session initialized client={} protocol={}",
            session.client_name.as_deref().unwrap_or("unknown"),
            protocol_version
        );

        Ok(json!({
            "protocolVersion": protocol_version,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "prompts": { "listChanged": true },
                "resources": { "listChanged": true, "subscribe": false },
                "tools": {},
                "logging": {}
            },
            "instructions": instructions
        }))
    }

    fn handle_prompts_list(&self) -> Result<Value> {
        Ok(json!({ "prompts": self.namespaces.list_prompts()? }))
    }

    fn handle_prompts_get(&self, params: &Value) -> Result<Value> {
        let name = required_str(params, "name")?;
        let prompt = self.namespaces.get_prompt(name)?;
        debug!("prompts/get name={} path={}", prompt.name, prompt.path);

        Ok(json!({
            "description": prompt.description,
            "messages": [
                {
                    "role": "system",
                    "content": { "type": "text", "text": prompt.content }
                }
            ]
        }))
    }

    fn handle_resources_list(&self) -> Result<Value> {
        Ok(json!({ "resources": self.namespaces.list_resources()? }))
    }

    fn handle_resources_read(&self, params: &Value) -> Result<Value> {
        let uri = required_str(params, "uri")?;
        let content = self.namespaces.get_resource(uri)?;
        Ok(json!({ "contents": [content] }))
    }

    fn handle_tools_call(&self, params: &Value) -> Result<Value> {
        let name = required_str(params, "name")?;
        let arguments = params_object(params)?
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Map::new()));

        let text = self.tools.execute(name, arguments)?;
        Ok(json!({
            "content": [
                { "type": "text", "text": text }
            ]
        }))
    }
}

/// Params as an object; absent params read as empty
fn params_object(params: &Value) -> Result<&Map<String, Value>> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    match params {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(EMPTY.get_or_init(Map::new)),
        _ => Err(FocalError::InvalidParams("params must be an object".to_string())),
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    match params_object(params)?.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(FocalError::InvalidParams(format!("missing '{}' field", key)))
        }
        Some(_) => Err(FocalError::InvalidParams(format!("'{}' must be a string", key))),
    }
}

async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(message)?;
    debug!("Sending: {}", json);
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
