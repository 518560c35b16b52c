//! Streamable HTTP Server Transport Module
//!
//! One endpoint (`/mcp` by default) carries every session:
//!
//! - `POST` delivers a JSON-RPC message or batch. Requests without an
//!   `Mcp-Session-Id` header are only accepted when they initialize a new
//!   session; all others must name a live session.
//! - `GET` is answered with `405 Method Not Allowed`; resuming a stream
//!   without a request is not supported.
//! - `DELETE` closes the named session.
//!
//! # Module Organization
//!
//! - [`session`] - session ids and the registry that owns each session's transport
//! - [`transport`](self::transport) - the per-session transport bound to the protocol engine
//! - [`axum`](self::axum) - the dispatcher, served as an axum `Router`
//!
//! # Examples
//!
//! ```ignore
//! use mcp_session_router::transport::streamable_http_server::{
//!     StreamableHttpServerConfig, StreamableHttpService,
//! };
//! let service = StreamableHttpService::new(engine, StreamableHttpServerConfig::default());
//! axum::serve(listener, service.router()).await?;
//! ```

pub mod axum;
pub mod session;
pub mod transport;

use std::time::Duration;

use super::ResponseMode;

/// Configuration for the streamable HTTP server
#[derive(Debug, Clone)]
pub struct StreamableHttpServerConfig {
    /// The path the endpoint is mounted on.
    pub path: String,
    /// If true, requests are answered with a single JSON document instead
    /// of an SSE stream.
    pub json_response: bool,
    /// The ping message duration for SSE connections.
    pub sse_keep_alive: Option<Duration>,
}

impl StreamableHttpServerConfig {
    pub const DEFAULT_PATH: &str = "/mcp";
    pub const DEFAULT_SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

    pub fn response_mode(&self) -> ResponseMode {
        if self.json_response {
            ResponseMode::Json
        } else {
            ResponseMode::Stream
        }
    }
}

impl Default for StreamableHttpServerConfig {
    fn default() -> Self {
        Self {
            path: Self::DEFAULT_PATH.to_owned(),
            json_response: false,
            sse_keep_alive: Some(Self::DEFAULT_SSE_KEEP_ALIVE),
        }
    }
}

pub use self::{axum::StreamableHttpService, transport::StreamableHttpServerTransport};
pub use session::{SessionId, SessionRegistry};
