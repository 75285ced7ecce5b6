//! Wire types for the worker protocol.
//!
//! The worker speaks a JSON-RPC-like dialect: requests carry `id`, `method`
//! and `params`; responses carry the same `id` and exactly one of `result`
//! or `error`. There is no `jsonrpc` version field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error code the worker uses for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Error code the worker uses for an exception while handling a method.
pub const INTERNAL_ERROR: i64 = -32603;

/// Error code the worker uses when it could not parse a request line.
pub const PARSE_ERROR: i64 = -32700;

/// A request sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    /// Build a request. `params` that are not an object are replaced by `{}`
    /// since the worker spreads them as keyword arguments.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        let params = if params.is_object() {
            params
        } else {
            Value::Object(serde_json::Map::new())
        };

        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize as a single line terminated by `\n`.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default = "unknown_error_message")]
    pub message: String,
}

fn unknown_error_message() -> String {
    "Unknown worker error".to_string()
}

/// A response received from the worker.
///
/// `id` is `None` for parse-error replies, which the worker cannot correlate
/// with any request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            result: None,
            error: Some(RpcErrorObject {
                code: Some(code),
                message: message.into(),
            }),
        }
    }
}
