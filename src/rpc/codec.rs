//! JSON-RPC request parsing and response encoding.
//!
//! Request payload (`jsonrpc` optional, `params` optional):
//! ```text
//! {"jsonrpc":"2.0","method":"toggle","params":null,"id":7}
//! ```
//!
//! Response payload, exactly one of `result` / `error`:
//! ```text
//! {"jsonrpc":"2.0","id":7,"result":true}
//! {"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"method not found: blink"}}
//! ```
//!
//! When the payload carries no usable `id`, the correlation id from the
//! request topic is echoed instead (numeric when it parses as one).

use core::fmt;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::app::events::Status;
use crate::topics::request_id;

/// Unparseable JSON or a request object without a method.
pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
/// The resource rejected or failed the call.
pub const HANDLER_ERROR: i64 = -32000;

/// Why a request produced an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcErrorKind {
    MalformedRequest(String),
    MethodNotFound(String),
    InvalidParams(String),
    HandlerError(String),
}

impl RpcErrorKind {
    pub fn code(&self) -> i64 {
        match self {
            Self::MalformedRequest(_) => PARSE_ERROR,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::HandlerError(_) => HANDLER_ERROR,
        }
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRequest(m) => write!(f, "malformed request: {m}"),
            Self::MethodNotFound(m) => write!(f, "method not found: {m}"),
            Self::InvalidParams(m) => write!(f, "invalid params: {m}"),
            Self::HandlerError(m) => write!(f, "handler error: {m}"),
        }
    }
}

impl std::error::Error for RpcErrorKind {}

// ───────────────────────────────────────────────────────────────
// Requests
// ───────────────────────────────────────────────────────────────

/// Call arguments, as sent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params(Value);

impl Params {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// The single status argument of `set_status`.
    ///
    /// Accepts a bare value (`true`), a one-element array (`[true]`) or an
    /// object with a `status` key (`{"status": true}`).
    pub fn status_arg(&self) -> Result<Status, RpcErrorKind> {
        let v = match &self.0 {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            Value::Object(map) => map.get("status").unwrap_or(&Value::Null),
            other => other,
        };
        match v {
            Value::Bool(b) => Ok(Status::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(Status::Number)
                .ok_or_else(|| RpcErrorKind::InvalidParams("number out of range".into())),
            _ => Err(RpcErrorKind::InvalidParams(
                "expected a boolean or number status".into(),
            )),
        }
    }
}

#[derive(Deserialize)]
struct WireRequest {
    method: String,
    #[serde(default)]
    params: Value,
}

/// A parsed request, consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Params,
    /// Id echoed in the response.
    pub id: Value,
    /// Last level of the request topic.
    pub request_id: String,
    pub topic: String,
}

/// Correlation id taken from the request topic.
pub fn topic_id(topic: &str) -> Value {
    let raw = request_id(topic);
    match raw.parse::<u64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(raw),
    }
}

/// Parse one inbound payload. On failure the id to answer with is
/// returned alongside the error.
pub fn parse_request(topic: &str, payload: &[u8]) -> Result<RpcRequest, (Value, RpcErrorKind)> {
    let fallback_id = topic_id(topic);

    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| (fallback_id.clone(), RpcErrorKind::MalformedRequest(e.to_string())))?;

    let id = match value.get("id") {
        Some(Value::Null) | None => fallback_id,
        Some(id) => id.clone(),
    };

    let wire = WireRequest::deserialize(&value)
        .map_err(|e| (id.clone(), RpcErrorKind::MalformedRequest(e.to_string())))?;
    if wire.method.is_empty() {
        return Err((id, RpcErrorKind::MalformedRequest("empty method".into())));
    }

    Ok(RpcRequest {
        method: wire.method,
        params: Params(wire.params),
        id,
        request_id: request_id(topic).to_owned(),
        topic: topic.to_owned(),
    })
}

// ───────────────────────────────────────────────────────────────
// Responses
// ───────────────────────────────────────────────────────────────

fn envelope(id: &Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("jsonrpc".into(), Value::from("2.0"));
    map.insert("id".into(), id.clone());
    map
}

/// Success response. A `null` result is kept, not omitted.
pub fn encode_result(id: &Value, result: Value) -> Vec<u8> {
    let mut map = envelope(id);
    map.insert("result".into(), result);
    Value::Object(map).to_string().into_bytes()
}

pub fn encode_error(id: &Value, err: &RpcErrorKind) -> Vec<u8> {
    let mut map = envelope(id);
    map.insert(
        "error".into(),
        json!({ "code": err.code(), "message": err.to_string() }),
    );
    Value::Object(map).to_string().into_bytes()
}
