//! The server-side protocol engine.
//!
//! A [`ServerEngine`] is created once per process and bound to every
//! session transport. It decodes requests, answers the protocol methods
//! itself (`initialize`, `ping`) and routes the rest to the application's
//! [`ServerHandler`].

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::{
    handler::server::{DynServerHandler, ServerHandler},
    model::{
        CALL_TOOL_METHOD, CANCELLED_NOTIFICATION_METHOD, CallToolRequestParam,
        CancelledNotificationParam, ErrorData, INITIALIZE_METHOD,
        INITIALIZED_NOTIFICATION_METHOD, InitializeRequestParam, InitializeResult,
        JsonRpcNotification, JsonRpcRequest, LIST_TOOLS_METHOD,
        LOGGING_MESSAGE_NOTIFICATION_METHOD, LoggingMessageNotificationParam, PING_METHOD,
        PROGRESS_NOTIFICATION_METHOD, ProgressNotificationParam, ProgressToken, ProtocolVersion,
        RequestId, ServerInfo, ServerJsonRpcMessage,
    },
    transport::streamable_http_server::session::SessionId,
};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("the response stream for request {0} has been closed")]
    StreamClosed(RequestId),
    #[error("failed to encode notification params: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A handle for pushing notifications to the client while a request runs.
///
/// In streaming mode the notifications travel on the request's event stream
/// ahead of the final response. In JSON mode there is nowhere to put them,
/// so they are dropped.
#[derive(Debug, Clone)]
pub struct Peer {
    request_id: RequestId,
    tx: Option<Sender<ServerJsonRpcMessage>>,
}

impl Peer {
    pub(crate) fn streaming(request_id: RequestId, tx: Sender<ServerJsonRpcMessage>) -> Self {
        Self {
            request_id,
            tx: Some(tx),
        }
    }

    pub(crate) fn detached(request_id: RequestId) -> Self {
        Self {
            request_id,
            tx: None,
        }
    }

    /// Whether notifications sent through this peer can reach the client.
    pub fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    pub async fn send_notification(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<(), PeerError> {
        let Some(tx) = &self.tx else {
            tracing::debug!(request_id = %self.request_id, method, "dropping notification in json response mode");
            return Ok(());
        };
        tx.send(ServerJsonRpcMessage::notification(method, Some(params)))
            .await
            .map_err(|_| PeerError::StreamClosed(self.request_id.clone()))
    }

    pub async fn notify_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
    ) -> Result<(), PeerError> {
        self.send_notification(
            LOGGING_MESSAGE_NOTIFICATION_METHOD,
            serde_json::to_value(params)?,
        )
        .await
    }

    pub async fn notify_progress(&self, params: ProgressNotificationParam) -> Result<(), PeerError> {
        self.send_notification(PROGRESS_NOTIFICATION_METHOD, serde_json::to_value(params)?)
            .await
    }
}

/// Per-request state handed to the handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: RequestId,
    /// Cancelled when the session transport is closed.
    pub ct: CancellationToken,
    pub peer: Peer,
    pub session_id: Option<SessionId>,
    pub progress_token: Option<ProgressToken>,
}

struct EngineInner {
    handler: Box<dyn DynServerHandler>,
    ct: CancellationToken,
}

/// The long-lived protocol engine shared by all sessions.
#[derive(Clone)]
pub struct ServerEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ServerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEngine")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ServerEngine {
    pub fn new<H: ServerHandler>(handler: H) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                handler: Box::new(handler),
                ct: CancellationToken::new(),
            }),
        }
    }

    pub fn info(&self) -> ServerInfo {
        self.inner.handler.get_info()
    }

    /// Stop serving: in-flight requests are cancelled and later requests
    /// fail with an internal error.
    pub fn close(&self) {
        if !self.inner.ct.is_cancelled() {
            tracing::info!("server engine closed");
        }
        self.inner.ct.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.ct.is_cancelled()
    }

    /// A token that is cancelled when the engine closes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.ct.child_token()
    }

    /// Answer one request. Never fails: errors become JSON-RPC error
    /// responses carrying the request id.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        context: RequestContext,
    ) -> ServerJsonRpcMessage {
        let id = request.id.clone();
        if self.is_closed() {
            return ServerJsonRpcMessage::error(
                ErrorData::internal_error("server engine is closed", None),
                Some(id),
            );
        }
        let ct = context.ct.clone();
        let method = request.method.clone();
        let result = tokio::select! {
            result = self.dispatch(request, context) => result,
            _ = ct.cancelled() => Err(ErrorData::internal_error("request cancelled", None)),
            _ = self.inner.ct.cancelled() => {
                Err(ErrorData::internal_error("server engine is closed", None))
            }
        };
        match result {
            Ok(result) => ServerJsonRpcMessage::response(result, id),
            Err(error) => {
                tracing::debug!(%id, %method, %error, "request failed");
                ServerJsonRpcMessage::error(error, Some(id))
            }
        }
    }

    async fn dispatch(
        &self,
        request: JsonRpcRequest,
        context: RequestContext,
    ) -> Result<Value, ErrorData> {
        match request.method.as_str() {
            INITIALIZE_METHOD => {
                let params: InitializeRequestParam = request.parse_params()?;
                to_result(self.initialize(params, &context))
            }
            PING_METHOD => Ok(Value::Object(Default::default())),
            LIST_TOOLS_METHOD => to_result(self.inner.handler.list_tools(context).await?),
            CALL_TOOL_METHOD => {
                let params: CallToolRequestParam = request.parse_params()?;
                tracing::debug!(tool = %params.name, session_id = ?context.session_id, "calling tool");
                to_result(self.inner.handler.call_tool(params, context).await?)
            }
            method => Err(ErrorData::method_not_found(method)),
        }
    }

    fn initialize(&self, params: InitializeRequestParam, context: &RequestContext) -> InitializeResult {
        let mut info = self.info();
        info.protocol_version = ProtocolVersion::negotiate(&params.protocol_version);
        tracing::info!(
            session_id = ?context.session_id,
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            requested = %params.protocol_version,
            negotiated = %info.protocol_version,
            "client initializing"
        );
        info
    }

    /// Accept a client notification. Notifications have no reply.
    pub async fn handle_notification(
        &self,
        notification: JsonRpcNotification,
        session_id: Option<&SessionId>,
    ) {
        match notification.method.as_ref() {
            INITIALIZED_NOTIFICATION_METHOD => {
                tracing::info!(?session_id, "client initialized");
            }
            CANCELLED_NOTIFICATION_METHOD => {
                let params = notification
                    .params
                    .map(serde_json::from_value::<CancelledNotificationParam>);
                match params {
                    Some(Ok(params)) => tracing::debug!(
                        ?session_id,
                        request_id = %params.request_id,
                        reason = ?params.reason,
                        "client cancelled request"
                    ),
                    _ => tracing::warn!(?session_id, "malformed cancelled notification"),
                }
            }
            method => {
                tracing::debug!(?session_id, method, "ignoring client notification");
            }
        }
    }
}

fn to_result<T: serde::Serialize>(value: T) -> Result<Value, ErrorData> {
    serde_json::to_value(value)
        .map_err(|e| ErrorData::internal_error(format!("failed to encode result: {e}"), None))
}
