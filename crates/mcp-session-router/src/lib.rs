//! Session routing for the MCP streamable HTTP transport.
//!
//! Many logical client sessions share one HTTP endpoint. Each session is
//! bound to exactly one stateful [`Transport`](transport::Transport) that
//! survives across requests; the only message allowed to arrive without a
//! session id is `initialize`, which creates a new session.
//!
//! ```ignore
//! use mcp_session_router::{
//!     service::ServerEngine,
//!     transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService},
//! };
//!
//! let engine = ServerEngine::new(handler);
//! let service = StreamableHttpService::new(engine, StreamableHttpServerConfig::default());
//! axum::serve(listener, service.router()).await?;
//! ```

mod error;
pub use error::RouterError;

/// Basic data types of the JSON-RPC / MCP wire format
pub mod model;
pub use model::ErrorData;

pub mod handler;
pub use handler::server::ServerHandler;

pub mod service;
pub use service::{Peer, RequestContext, ServerEngine};

pub mod transport;

// re-export
pub use schemars;
pub use serde_json;
