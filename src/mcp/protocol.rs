//! JSON-RPC 2.0 protocol implementation
//!
//! Defines the core protocol types for MCP communication, shared by the
//! stdio and HTTP transports.

use crate::error::FocalError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error code: server not initialized on this connection
pub const NOT_INITIALIZED: i32 = -32001;

/// Error code: unknown prompt, resource or file
pub const NOT_FOUND: i32 = -32002;

/// Error code: destination exists or folder not empty
pub const CONFLICT: i32 = -32003;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,

    /// Method name to invoke
    pub method: String,

    /// Parameters (can be object or array)
    #[serde(default)]
    pub params: Value,

    /// Request ID (absent for notifications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request with an ID
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: Some(id.into()),
        }
    }

    /// True when no response is expected
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,

    /// Result (present if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error (present if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Request ID (echoed from request)
    pub id: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC 2.0 notification (server to client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcNotification {
    /// Notification with an empty params object
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Value::Object(serde_json::Map::new()),
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,

    /// Error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Parse error (-32700)
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::application_error(-32700, message)
    }

    /// Invalid request (-32600)
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::application_error(-32600, message)
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::application_error(-32601, format!("Method not found: {}", method.into()))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::application_error(-32602, message)
    }

    /// Internal error (-32603)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::application_error(-32603, message)
    }

    /// Application error (custom code)
    pub fn application_error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<&FocalError> for JsonRpcError {
    fn from(err: &FocalError) -> Self {
        match err {
            FocalError::MethodNotFound(method) => JsonRpcError::method_not_found(method.as_str()),
            FocalError::InvalidParams(_) | FocalError::InvalidPath(_) | FocalError::InvalidUri(_) => {
                JsonRpcError::invalid_params(err.client_message())
            }
            FocalError::NotInitialized => {
                JsonRpcError::application_error(NOT_INITIALIZED, err.client_message())
            }
            FocalError::NotFound(_) => JsonRpcError::application_error(NOT_FOUND, err.client_message()),
            FocalError::Conflict(_) => JsonRpcError::application_error(CONFLICT, err.client_message()),
            FocalError::Unauthorized | FocalError::Timeout(_) => {
                JsonRpcError::internal_error(err.client_message())
            }
            FocalError::Io(_)
            | FocalError::Config(_)
            | FocalError::Serialization(_)
            | FocalError::Other(_) => JsonRpcError::internal_error("Internal error"),
        }
    }
}

impl From<FocalError> for JsonRpcError {
    fn from(err: FocalError) -> Self {
        JsonRpcError::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest::new(1, "tools/list", json!({}));

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
    }

    #[test]
    fn test_notification_has_no_id() {
        let parsed: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(parsed.is_notification());
        assert_eq!(parsed.params, Value::Null);
    }

    #[test]
    fn test_response_serialization() {
        let response = JsonRpcResponse::success(Some(json!(1)), json!({"status": "ok"}));

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_error_response() {
        let response = JsonRpcResponse::error(
            Some(json!(1)),
            JsonRpcError::method_not_found("invalid_method"),
        );

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\""));
        assert!(json.contains("-32601"));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_list_changed_notification_shape() {
        let notification = JsonRpcNotification::new("notifications/prompts/list_changed");
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "notifications/prompts/list_changed", "params": {}})
        );
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(JsonRpcError::from(FocalError::InvalidPath("../x".into())).code, -32602);
        assert_eq!(JsonRpcError::from(FocalError::InvalidUri("x".into())).code, -32602);
        assert_eq!(JsonRpcError::from(FocalError::NotFound("x".into())).code, NOT_FOUND);
        assert_eq!(JsonRpcError::from(FocalError::Conflict("x".into())).code, CONFLICT);
        assert_eq!(JsonRpcError::from(FocalError::NotInitialized).code, NOT_INITIALIZED);

        let io = FocalError::Io(std::io::Error::new(std::io::ErrorKind::Other, "/abs/path"));
        let mapped = JsonRpcError::from(io);
        assert_eq!(mapped.code, -32603);
        assert_eq!(mapped.message, "Internal error");
    }
}
