//! Wire protocol message types.
//!
//! All communication between farcall processes uses JSON-framed messages
//! over TCP. Each message is prefixed with a 4-byte big-endian length header.

use farcall_types::{ErrorClass, Invoke, InvokeError, InvokeResult, ItemId, RemoteRef, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A wire protocol message (envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Unique message ID; a response repeats the ID of its request.
    pub id: String,
    /// Message variant.
    #[serde(flatten)]
    pub kind: WireMessageKind,
}

/// The different kinds of wire messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessageKind {
    /// Request from a caller to a server.
    #[serde(rename = "request")]
    Request(WireRequest),
    /// Response to a request.
    #[serde(rename = "response")]
    Response(WireResponse),
}

/// Request messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum WireRequest {
    /// Invoke a method on an exported item.
    #[serde(rename = "invoke")]
    Invoke {
        /// Export id of the target item.
        item: ItemId,
        /// Method name; `None` is forwarded as-is to the dispatcher.
        name: Option<String>,
        /// Argument value (null, single value or positional list).
        args: WireValue,
    },
    /// Look up an item in the server's name table.
    #[serde(rename = "lookup")]
    Lookup { name: String },
    /// List the names bound on the server.
    #[serde(rename = "list")]
    List,
    /// Ping to check if the server is alive.
    #[serde(rename = "ping")]
    Ping,
}

/// Response messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum WireResponse {
    /// Successful invocation result.
    #[serde(rename = "value")]
    Value { value: WireValue },
    /// Lookup result.
    #[serde(rename = "reference")]
    Reference { reference: RemoteRef },
    /// Bound names.
    #[serde(rename = "names")]
    Names { names: Vec<String> },
    /// Pong response.
    #[serde(rename = "pong")]
    Pong {
        /// Uptime in seconds.
        uptime_secs: u64,
    },
    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// Taxonomy bucket, used to rebuild the same error at the caller.
        class: ErrorClass,
        /// Error message.
        message: String,
    },
}

impl WireResponse {
    pub fn error(err: &InvokeError) -> Self {
        WireResponse::Error {
            class: err.class(),
            message: err.message().to_string(),
        }
    }
}

/// A [`Value`] in transit: items travel as references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
    Ref(RemoteRef),
}

impl WireValue {
    /// Convert a value for sending. `export` supplies a reference for each item.
    pub fn from_value<F>(value: &Value, export: &F) -> InvokeResult<WireValue>
    where
        F: Fn(&Arc<dyn Invoke>) -> InvokeResult<RemoteRef>,
    {
        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Int(i) => WireValue::Int(*i),
            Value::Float(f) => WireValue::Float(*f),
            Value::Str(s) => WireValue::Str(s.clone()),
            Value::Bytes(b) => WireValue::Bytes(b.clone()),
            Value::List(items) => WireValue::List(
                items
                    .iter()
                    .map(|v| WireValue::from_value(v, export))
                    .collect::<InvokeResult<_>>()?,
            ),
            Value::Map(map) => WireValue::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), WireValue::from_value(v, export)?)))
                    .collect::<InvokeResult<_>>()?,
            ),
            Value::Item(item) => WireValue::Ref(export(item)?),
        })
    }

    /// Convert a value that has no server to export through: only items that
    /// already carry a reference can be sent.
    pub fn from_value_exported(value: &Value) -> InvokeResult<WireValue> {
        WireValue::from_value(value, &|item: &Arc<dyn Invoke>| {
            item.remote_ref().ok_or_else(|| {
                InvokeError::InvalidArgument(format!(
                    "item '{item}' must be exported before it can be sent"
                ))
            })
        })
    }

    /// Convert a received value. References become remote proxies.
    pub fn into_value(self) -> Value {
        match self {
            WireValue::Null => Value::Null,
            WireValue::Bool(b) => Value::Bool(b),
            WireValue::Int(i) => Value::Int(i),
            WireValue::Float(f) => Value::Float(f),
            WireValue::Str(s) => Value::Str(s),
            WireValue::Bytes(b) => Value::Bytes(b),
            WireValue::List(items) => {
                Value::List(items.into_iter().map(WireValue::into_value).collect())
            }
            WireValue::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
            WireValue::Ref(reference) => {
                Value::Item(Arc::new(crate::remote::RemoteItem::new(reference)))
            }
        }
    }
}

/// Encode a wire message to bytes (4-byte big-endian length + JSON).
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a WireMessage.
pub fn decode_message(body: &[u8]) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_slice(body)
}
