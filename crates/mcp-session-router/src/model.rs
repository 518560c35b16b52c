use std::{borrow::Cow, fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod content;
mod init;
mod notification;
mod serde_impl;
mod tool;
pub use content::*;
pub use init::*;
pub use notification::*;
pub use tool::*;

/// A JSON object, the usual shape of params, results and schemas.
pub type JsonObject<F = Value> = serde_json::Map<String, F>;

/// An object with no fields, used as the params type of argument-less tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EmptyObject {}

pub const INITIALIZE_METHOD: &str = "initialize";
pub const PING_METHOD: &str = "ping";
pub const LIST_TOOLS_METHOD: &str = "tools/list";
pub const CALL_TOOL_METHOD: &str = "tools/call";
pub const INITIALIZED_NOTIFICATION_METHOD: &str = "notifications/initialized";
pub const CANCELLED_NOTIFICATION_METHOD: &str = "notifications/cancelled";
pub const PROGRESS_NOTIFICATION_METHOD: &str = "notifications/progress";
pub const LOGGING_MESSAGE_NOTIFICATION_METHOD: &str = "notifications/message";

/// The `"jsonrpc": "2.0"` marker. Serializes to the literal string and
/// rejects any other value on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JsonRpcVersion2_0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    String(Arc<str>),
}

impl Display for NumberOrString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberOrString::Number(n) => Display::fmt(n, f),
            NumberOrString::String(s) => Display::fmt(s, f),
        }
    }
}

pub type RequestId = NumberOrString;
pub type ProgressToken = NumberOrString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Implementation-defined server error, used for requests that arrive
    /// without a usable session.
    pub const BAD_REQUEST: Self = Self(-32000);
    pub const SESSION_NOT_FOUND: Self = Self(-32001);
    pub const INVALID_REQUEST: Self = Self(-32600);
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    pub const INVALID_PARAMS: Self = Self(-32602);
    pub const INTERNAL_ERROR: Self = Self(-32603);
    pub const PARSE_ERROR: Self = Self(-32700);
}

/// Error information for JSON-RPC error responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// The error type that occurred.
    pub code: ErrorCode,

    /// A short description of the error. The message SHOULD be limited to a concise single sentence.
    pub message: Cow<'static, str>,

    /// Additional information about the error. The value of this member is defined by the
    /// sender (e.g. detailed error information, nested errors etc.).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorData {
    pub fn new(
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        data: Option<Value>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }
    pub fn parse_error(message: impl Into<Cow<'static, str>>, data: Option<Value>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message, data)
    }
    pub fn invalid_request(message: impl Into<Cow<'static, str>>, data: Option<Value>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message, data)
    }
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            "Method not found",
            Some(serde_json::json!({ "method": method })),
        )
    }
    pub fn invalid_params(message: impl Into<Cow<'static, str>>, data: Option<Value>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message, data)
    }
    pub fn internal_error(message: impl Into<Cow<'static, str>>, data: Option<Value>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message, data)
    }
    /// The rejection sent when a request carries no session id that the
    /// server knows about and is not an `initialize` request.
    pub fn no_valid_session() -> Self {
        Self::new(
            ErrorCode::BAD_REQUEST,
            "Bad Request: No valid session ID provided",
            None,
        )
    }
    pub fn session_not_found() -> Self {
        Self::new(ErrorCode::SESSION_NOT_FOUND, "Session not found", None)
    }
}

/// One inbound JSON-RPC object as sent by a client.
///
/// Every field is optional so that any mapping can be represented; use
/// [`ClientMessage::into_kind`] to find out what the object actually is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessageKind {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// A result or error answering a request the server sent.
    Response(RequestId),
    Invalid(Option<RequestId>),
}

impl ClientMessage {
    pub fn is_initialize_request(&self) -> bool {
        self.method.as_deref() == Some(INITIALIZE_METHOD)
    }

    pub fn into_kind(self) -> ClientMessageKind {
        if self.jsonrpc.as_deref().is_some_and(|version| version != "2.0") {
            return ClientMessageKind::Invalid(self.id);
        }
        match (self.id, self.method) {
            (Some(id), Some(method)) => ClientMessageKind::Request(JsonRpcRequest {
                jsonrpc: JsonRpcVersion2_0,
                id,
                method,
                params: self.params,
            }),
            (None, Some(method)) => ClientMessageKind::Notification(JsonRpcNotification {
                jsonrpc: JsonRpcVersion2_0,
                method: method.into(),
                params: self.params,
            }),
            (Some(id), None) if self.result.is_some() || self.error.is_some() => {
                ClientMessageKind::Response(id)
            }
            (id, None) => ClientMessageKind::Invalid(id),
        }
    }
}

/// One element of an inbound body: either something shaped like a JSON-RPC
/// message, or any other JSON value that was found in its place.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageItem {
    Message(ClientMessage),
    Other(Value),
}

impl MessageItem {
    pub fn is_initialize_request(&self) -> bool {
        matches!(self, MessageItem::Message(message) if message.is_initialize_request())
    }
}

impl From<Value> for MessageItem {
    fn from(value: Value) -> Self {
        if !value.is_object() {
            return MessageItem::Other(value);
        }
        match ClientMessage::deserialize(&value) {
            Ok(message) => MessageItem::Message(message),
            Err(_) => MessageItem::Other(value),
        }
    }
}

/// An inbound HTTP body: a single message or an ordered batch.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Single(MessageItem),
    Batch(Vec<MessageItem>),
}

impl InboundMessage {
    pub fn is_initialize_request(&self) -> bool {
        match self {
            InboundMessage::Single(item) => item.is_initialize_request(),
            InboundMessage::Batch(items) => items.iter().any(MessageItem::is_initialize_request),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, InboundMessage::Batch(_))
    }

    pub fn into_items(self) -> Vec<MessageItem> {
        match self {
            InboundMessage::Single(item) => vec![item],
            InboundMessage::Batch(items) => items,
        }
    }
}

impl From<Value> for InboundMessage {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                InboundMessage::Batch(items.into_iter().map(MessageItem::from).collect())
            }
            value => InboundMessage::Single(MessageItem::from(value)),
        }
    }
}

/// Whether a parsed body opens a new session.
///
/// True iff the body is a mapping whose `method` is exactly `"initialize"`,
/// or a sequence in which at least one element is such a mapping.
pub fn is_initialize_request(body: &Value) -> bool {
    fn is_initialize_object(value: &Value) -> bool {
        value
            .as_object()
            .and_then(|object| object.get("method"))
            .and_then(Value::as_str)
            == Some(INITIALIZE_METHOD)
    }
    match body {
        Value::Array(items) => items.iter().any(is_initialize_object),
        value => is_initialize_object(value),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: JsonRpcVersion2_0,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Deserialize the params, treating absent params as an empty object.
    pub fn parse_params<P: serde::de::DeserializeOwned>(&self) -> Result<P, ErrorData> {
        let params = self
            .params
            .clone()
            .unwrap_or_else(|| Value::Object(JsonObject::new()));
        serde_json::from_value(params)
            .map_err(|e| ErrorData::invalid_params(format!("invalid params: {e}"), None))
    }

    /// The `_meta.progressToken` a client attached to the request, if any.
    pub fn progress_token(&self) -> Option<ProgressToken> {
        self.params
            .as_ref()?
            .get("_meta")?
            .get("progressToken")
            .cloned()
            .and_then(|token| serde_json::from_value(token).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: JsonRpcVersion2_0,
    pub method: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcVersion2_0,
    pub id: RequestId,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub jsonrpc: JsonRpcVersion2_0,
    pub error: ErrorData,
    /// `null` when the offending message could not be attributed to a request.
    pub id: Option<RequestId>,
}

/// A message sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerJsonRpcMessage {
    Error(JsonRpcError),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl ServerJsonRpcMessage {
    pub fn response(result: Value, id: RequestId) -> Self {
        ServerJsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: JsonRpcVersion2_0,
            id,
            result,
        })
    }
    pub fn error(error: ErrorData, id: Option<RequestId>) -> Self {
        ServerJsonRpcMessage::Error(JsonRpcError {
            jsonrpc: JsonRpcVersion2_0,
            error,
            id,
        })
    }
    pub fn notification(method: impl Into<Cow<'static, str>>, params: Option<Value>) -> Self {
        ServerJsonRpcMessage::Notification(JsonRpcNotification {
            jsonrpc: JsonRpcVersion2_0,
            method: method.into(),
            params,
        })
    }
    pub fn is_notification(&self) -> bool {
        matches!(self, ServerJsonRpcMessage::Notification(_))
    }
}

/// The body of a JSON-mode reply: one message, or one per request of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerJsonRpcPayload {
    Single(ServerJsonRpcMessage),
    Batch(Vec<ServerJsonRpcMessage>),
}
