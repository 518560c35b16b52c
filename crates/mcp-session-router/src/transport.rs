//! # Transport
//! A transport carries the messages of exactly one session between the HTTP
//! layer and the [`ServerEngine`].
//!
//! The router treats a transport as opaque and only relies on the contract
//! of the [`Transport`] trait:
//!
//! 1. it is bound to the engine with [`Transport::connect`] before it sees
//!    any message;
//! 2. every inbound body is handed to [`Transport::handle_request`], which
//!    produces either one JSON document or a stream of messages;
//! 3. once it has handled an `initialize` request it reports a stable
//!    [`Transport::session_id`];
//! 4. [`Transport::close`] ends the session.
//!
//! The crate ships one implementation,
//! [`StreamableHttpServerTransport`](streamable_http_server::StreamableHttpServerTransport).
use bytes::Bytes;
use futures::stream::BoxStream;
use http::StatusCode;

use crate::{
    model::{ServerJsonRpcMessage, ServerJsonRpcPayload},
    service::ServerEngine,
};

pub mod common;
pub mod streamable_http_server;

pub use streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpServerTransport, StreamableHttpService,
    session::{SessionId, SessionRegistry},
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The messages of a streamed reply. An `Err` item means the stream broke
/// after it had started; nothing more will follow it.
pub type MessageStream = BoxStream<'static, Result<ServerJsonRpcMessage, BoxError>>;

/// How a reply is delivered. Chosen once per server, not per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Requests are answered with a `text/event-stream` that carries
    /// notifications and then the response.
    #[default]
    Stream,
    /// Requests are answered with a single `application/json` document.
    Json,
}

/// Construction parameters for a new session transport.
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub session_id_generator: fn() -> SessionId,
    pub response_mode: ResponseMode,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            session_id_generator: streamable_http_server::session::session_id,
            response_mode: ResponseMode::default(),
        }
    }
}

pub enum ResponseBody {
    Empty,
    Json(ServerJsonRpcPayload),
    Stream(MessageStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Json(payload) => f.debug_tuple("Json").field(payload).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// What a transport produced for one inbound body.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    /// Echoed to the client in the `Mcp-Session-Id` header.
    pub session_id: Option<SessionId>,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn accepted(session_id: Option<SessionId>) -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            session_id,
            body: ResponseBody::Empty,
        }
    }

    pub fn json(
        status: StatusCode,
        session_id: Option<SessionId>,
        payload: ServerJsonRpcPayload,
    ) -> Self {
        Self {
            status,
            session_id,
            body: ResponseBody::Json(payload),
        }
    }

    pub fn stream(session_id: Option<SessionId>, stream: MessageStream) -> Self {
        Self {
            status: StatusCode::OK,
            session_id,
            body: ResponseBody::Stream(stream),
        }
    }
}

/// One session's message channel. See the [module docs](self).
///
/// Implementations must tolerate concurrent `handle_request` calls: the
/// router does not serialize requests that share a session id.
pub trait Transport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Bind this transport to the protocol engine.
    fn connect(&self, engine: ServerEngine) -> Result<(), Self::Error>;

    /// Handle one inbound body. `raw_body` is the exact bytes the client sent.
    fn handle_request(
        &self,
        message: crate::model::InboundMessage,
        raw_body: Bytes,
    ) -> impl Future<Output = Result<TransportResponse, Self::Error>> + Send;

    /// The session id, once one has been assigned.
    fn session_id(&self) -> Option<SessionId>;

    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
