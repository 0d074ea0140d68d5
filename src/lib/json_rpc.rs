//! JSON-RPC 2.0 envelopes as spoken by the pool, one compact object per line.
//!
//! Outbound requests are typed ([`Request`]) and serialized with their fields in wire order.
//! Inbound lines are decoded to a generic [`serde_json::Value`] first and then classified: an
//! envelope with an integer `id` is a [`Response`], anything else is a [`Notification`].
//!
//! https://www.jsonrpc.org/specification#response_object
use serde::Serialize;
use serde_json::Value;
use std::{fmt, fmt::Display};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Clone, Serialize, Debug, PartialEq, Eq)]
pub struct Request<P> {
    pub id: u64,
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: P,
}

impl<P: Serialize> Request<P> {
    pub fn new(id: u64, method: &'static str, params: P) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }

    /// Serializes the request as one newline-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Clone, Debug)]
pub enum Message {
    Response(Response),
    Notification(Notification),
}

impl Message {
    /// Decodes one line. Fails only when the line is not well-formed JSON.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(mut value: Value) -> Self {
        let error = value.get("error").and_then(JsonRpcError::from_value);
        match value.get("id").and_then(Value::as_i64) {
            Some(id) => Message::Response(Response {
                id,
                result: value.get_mut("result").map(Value::take),
                error,
            }),
            None => Message::Notification(Notification {
                method: value
                    .get("method")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                params: value.get_mut("params").map(Value::take),
                error,
            }),
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Response(r) => write!(f, "{r}"),
            Message::Notification(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Response {
    pub id: i64,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self
            .result
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "null".to_string());
        match &self.error {
            Some(err) => write!(f, "{{ id: {}, error: {}, result: {} }}", self.id, err, result),
            None => write!(f, "{{ id: {}, result: {} }}", self.id, result),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub method: Option<String>,
    pub params: Option<Value>,
    pub error: Option<JsonRpcError>,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "null".to_string());
        write!(
            f,
            "{{ method: \"{}\", params: {} }}",
            self.method.as_deref().unwrap_or_default(),
            params
        )
    }
}

/// Top-level `error` object. Only taken into account when `error` is a JSON object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl JsonRpcError {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            code: object.get("code").and_then(Value::as_i64),
            message: object
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\", code: {}",
            self.message.as_deref().unwrap_or_default(),
            self.code.unwrap_or_default()
        )
    }
}
