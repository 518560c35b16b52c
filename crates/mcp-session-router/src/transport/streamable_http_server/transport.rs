use std::sync::OnceLock;

use bytes::Bytes;
use futures::StreamExt;
use http::StatusCode;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::session::SessionId;
use crate::{
    model::{
        ClientMessageKind, ErrorCode, ErrorData, InboundMessage, JsonRpcRequest, MessageItem,
        RequestId, ServerJsonRpcMessage, ServerJsonRpcPayload,
    },
    service::{Peer, RequestContext, ServerEngine},
    transport::{BoxError, ResponseMode, Transport, TransportOptions, TransportResponse},
};

#[derive(Debug, thiserror::Error)]
pub enum StreamableHttpError {
    #[error("transport is closed")]
    Closed,
    #[error("transport is not connected to a server engine")]
    NotConnected,
    #[error("transport is already connected to a server engine")]
    AlreadyConnected,
}

/// The transport behind one streamable HTTP session.
///
/// It assigns the session id while handling the `initialize` request, then
/// answers every later body on that session, either as one JSON document
/// or as a stream of messages depending on [`ResponseMode`].
#[derive(Debug)]
pub struct StreamableHttpServerTransport {
    options: TransportOptions,
    engine: OnceLock<ServerEngine>,
    session_id: OnceLock<SessionId>,
    ct: CancellationToken,
}

impl Default for StreamableHttpServerTransport {
    fn default() -> Self {
        Self::new(TransportOptions::default())
    }
}

impl StreamableHttpServerTransport {
    const RESPONSE_CHANNEL_SIZE: usize = 16;

    pub fn new(options: TransportOptions) -> Self {
        Self {
            options,
            engine: OnceLock::new(),
            session_id: OnceLock::new(),
            ct: CancellationToken::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ct.is_cancelled()
    }

    fn reject(&self, error: ErrorData) -> TransportResponse {
        TransportResponse::json(
            StatusCode::BAD_REQUEST,
            self.session_id(),
            ServerJsonRpcPayload::Single(ServerJsonRpcMessage::error(error, None)),
        )
    }

    fn context(&self, request: &JsonRpcRequest, peer: Peer) -> RequestContext {
        RequestContext {
            id: request.id.clone(),
            ct: self.ct.child_token(),
            peer,
            session_id: self.session_id(),
            progress_token: request.progress_token(),
        }
    }

    /// Assign the session id if `items` is a well-formed initialization.
    fn begin_session(&self, items: &[MessageItem]) -> Result<(), ErrorData> {
        if self.session_id.get().is_some() {
            return Err(ErrorData::invalid_request(
                "Invalid Request: Server already initialized",
                None,
            ));
        }
        if items.len() > 1 {
            return Err(ErrorData::invalid_request(
                "Invalid Request: Only one initialization request is allowed",
                None,
            ));
        }
        let session_id = (self.options.session_id_generator)();
        if self.session_id.set(session_id.clone()).is_err() {
            return Err(ErrorData::invalid_request(
                "Invalid Request: Server already initialized",
                None,
            ));
        }
        tracing::debug!(%session_id, "session id assigned");
        Ok(())
    }

    async fn respond_json(
        &self,
        engine: &ServerEngine,
        requests: Vec<JsonRpcRequest>,
        mut messages: Vec<ServerJsonRpcMessage>,
        is_batch: bool,
    ) -> TransportResponse {
        let handled = requests.into_iter().map(|request| {
            let context = self.context(&request, Peer::detached(request.id.clone()));
            engine.handle_request(request, context)
        });
        messages.extend(futures::future::join_all(handled).await);
        let payload = match (is_batch, messages.len()) {
            (false, 1) => ServerJsonRpcPayload::Single(messages.remove(0)),
            _ => ServerJsonRpcPayload::Batch(messages),
        };
        TransportResponse::json(StatusCode::OK, self.session_id(), payload)
    }

    fn respond_stream(
        &self,
        engine: ServerEngine,
        requests: Vec<JsonRpcRequest>,
        rejected: Vec<ServerJsonRpcMessage>,
    ) -> TransportResponse {
        let (tx, rx) = mpsc::channel(Self::RESPONSE_CHANNEL_SIZE);
        let (done_tx, done_rx) = oneshot::channel::<Result<(), StreamableHttpError>>();
        let ct = self.ct.child_token();
        let session_id = self.session_id();

        let handled: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let context =
                    self.context(&request, Peer::streaming(request.id.clone(), tx.clone()));
                let engine = engine.clone();
                let tx = tx.clone();
                async move {
                    let id = request.id.clone();
                    let response = engine.handle_request(request, context).await;
                    if tx.send(response).await.is_err() {
                        tracing::debug!(%id, "client went away before the response was sent");
                    }
                }
            })
            .collect();

        tokio::spawn(
            async move {
                for message in rejected {
                    if tx.send(message).await.is_err() {
                        tracing::debug!("client went away before the stream started");
                    }
                }
                drop(tx);
                // each request ends on its own once `ct` fires, with an error response
                futures::future::join_all(handled).await;
                let outcome = if ct.is_cancelled() {
                    Err(StreamableHttpError::Closed)
                } else {
                    Ok(())
                };
                if let Err(error) = &outcome {
                    tracing::debug!(%error, "response stream interrupted");
                }
                let _ = done_tx.send(outcome);
            }
            .instrument(tracing::debug_span!("response_stream", session_id = ?session_id)),
        );

        let outcome = futures::stream::once(done_rx).filter_map(|outcome| {
            futures::future::ready(match outcome {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(Err(BoxError::from(error))),
                Err(_) => Some(Err(BoxError::from(StreamableHttpError::Closed))),
            })
        });
        let stream = ReceiverStream::new(rx).map(Ok).chain(outcome).boxed();
        TransportResponse::stream(self.session_id(), stream)
    }
}

impl Transport for StreamableHttpServerTransport {
    type Error = StreamableHttpError;

    fn connect(&self, engine: ServerEngine) -> Result<(), Self::Error> {
        if self.is_closed() {
            return Err(StreamableHttpError::Closed);
        }
        self.engine
            .set(engine)
            .map_err(|_| StreamableHttpError::AlreadyConnected)
    }

    async fn handle_request(
        &self,
        message: InboundMessage,
        raw_body: Bytes,
    ) -> Result<TransportResponse, Self::Error> {
        if self.is_closed() {
            return Err(StreamableHttpError::Closed);
        }
        let engine = self
            .engine
            .get()
            .cloned()
            .ok_or(StreamableHttpError::NotConnected)?;
        tracing::trace!(bytes = raw_body.len(), session_id = ?self.session_id(), "transport received body");

        let is_batch = message.is_batch();
        let items = message.into_items();
        if items.is_empty() {
            return Ok(self.reject(ErrorData::invalid_request(
                "Invalid Request: empty batch",
                None,
            )));
        }
        if items.iter().any(MessageItem::is_initialize_request) {
            if let Err(error) = self.begin_session(&items) {
                return Ok(self.reject(error));
            }
        } else if self.session_id.get().is_none() {
            return Ok(self.reject(ErrorData::new(
                ErrorCode::BAD_REQUEST,
                "Bad Request: Server not initialized",
                None,
            )));
        }

        let session_id = self.session_id();
        let mut requests = Vec::new();
        let mut rejected = Vec::new();
        for item in items {
            let message = match item {
                MessageItem::Message(message) => message,
                MessageItem::Other(value) => {
                    tracing::debug!(%value, "body element is not a JSON-RPC message");
                    rejected.push(invalid_request(None));
                    continue;
                }
            };
            match message.into_kind() {
                ClientMessageKind::Request(request) => requests.push(request),
                ClientMessageKind::Notification(notification) => {
                    engine
                        .handle_notification(notification, session_id.as_ref())
                        .await
                }
                ClientMessageKind::Response(id) => {
                    tracing::debug!(%id, "ignoring client response, the server sent no request");
                }
                ClientMessageKind::Invalid(id) => rejected.push(invalid_request(id)),
            }
        }

        if requests.is_empty() {
            if rejected.is_empty() {
                return Ok(TransportResponse::accepted(session_id));
            }
            let payload = match (is_batch, rejected.len()) {
                (false, 1) => ServerJsonRpcPayload::Single(rejected.remove(0)),
                _ => ServerJsonRpcPayload::Batch(rejected),
            };
            return Ok(TransportResponse::json(
                StatusCode::BAD_REQUEST,
                session_id,
                payload,
            ));
        }

        Ok(match self.options.response_mode {
            ResponseMode::Json => {
                self.respond_json(&engine, requests, rejected, is_batch)
                    .await
            }
            ResponseMode::Stream => self.respond_stream(engine, requests, rejected),
        })
    }

    fn session_id(&self) -> Option<SessionId> {
        self.session_id.get().cloned()
    }

    async fn close(&self) -> Result<(), Self::Error> {
        if !self.ct.is_cancelled() {
            tracing::debug!(session_id = ?self.session_id(), "closing transport");
        }
        self.ct.cancel();
        Ok(())
    }
}

fn invalid_request(id: Option<RequestId>) -> ServerJsonRpcMessage {
    ServerJsonRpcMessage::error(ErrorData::invalid_request("Invalid Request", None), id)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        handler::server::ServerHandler,
        model::{
            CallToolRequestParam, CallToolResult, Content, LoggingLevel,
            LoggingMessageNotificationParam,
        },
        transport::ResponseBody,
    };

    struct Chatty;

    impl ServerHandler for Chatty {
        async fn call_tool(
            &self,
            request: CallToolRequestParam,
            context: RequestContext,
        ) -> Result<CallToolResult, ErrorData> {
            context
                .peer
                .notify_logging_message(LoggingMessageNotificationParam {
                    level: LoggingLevel::Info,
                    logger: None,
                    data: json!("working"),
                })
                .await
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
            Ok(CallToolResult::success(vec![Content::text(
                request.name.to_string(),
            )]))
        }
    }

    fn fixed_id() -> SessionId {
        "fixed-session".into()
    }

    fn transport(response_mode: ResponseMode) -> StreamableHttpServerTransport {
        let transport = StreamableHttpServerTransport::new(TransportOptions {
            session_id_generator: fixed_id,
            response_mode,
        });
        transport.connect(ServerEngine::new(Chatty)).unwrap();
        transport
    }

    fn inbound(value: Value) -> InboundMessage {
        InboundMessage::from(value)
    }

    fn initialize_body() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        })
    }

    fn json_payload(response: TransportResponse) -> Value {
        match response.body {
            ResponseBody::Json(payload) => serde_json::to_value(payload).unwrap(),
            other => panic!("expected json body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initialize_assigns_session_id() {
        let transport = transport(ResponseMode::Json);
        assert!(transport.session_id().is_none());

        let response = transport
            .handle_request(inbound(initialize_body()), Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.session_id.as_deref(), Some("fixed-session"));
        assert_eq!(transport.session_id().as_deref(), Some("fixed-session"));
        let payload = json_payload(response);
        assert_eq!(payload["result"]["protocolVersion"], json!("2025-03-26"));
    }

    #[tokio::test]
    async fn test_second_initialize_is_rejected() {
        let transport = transport(ResponseMode::Json);
        transport
            .handle_request(inbound(initialize_body()), Bytes::new())
            .await
            .unwrap();
        let response = transport
            .handle_request(inbound(initialize_body()), Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let payload = json_payload(response);
        assert_eq!(payload["error"]["code"], json!(-32600));
        assert_eq!(
            payload["error"]["message"],
            json!("Invalid Request: Server already initialized")
        );
    }

    #[tokio::test]
    async fn test_batched_initialize_is_rejected() {
        let transport = transport(ResponseMode::Json);
        let body = json!([initialize_body(), {"jsonrpc": "2.0", "id": 1, "method": "ping"}]);
        let response = transport
            .handle_request(inbound(body), Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(transport.session_id().is_none());
    }

    #[tokio::test]
    async fn test_initialize_without_id_opens_session() {
        let transport = transport(ResponseMode::Json);
        let response = transport
            .handle_request(
                inbound(json!({"jsonrpc": "2.0", "method": "initialize"})),
                Bytes::new(),
            )
            .await
            .unwrap();
        // nothing to answer, but the session exists from here on
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert!(matches!(response.body, ResponseBody::Empty));
        assert_eq!(response.session_id.as_deref(), Some("fixed-session"));
        assert_eq!(transport.session_id().as_deref(), Some("fixed-session"));
    }

    #[tokio::test]
    async fn test_requests_before_initialize_are_rejected() {
        let transport = transport(ResponseMode::Json);
        let response = transport
            .handle_request(
                inbound(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})),
                Bytes::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let payload = json_payload(response);
        assert_eq!(payload["error"]["code"], json!(-32000));
        assert_eq!(payload["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_notifications_are_accepted() {
        let transport = transport(ResponseMode::Json);
        transport
            .handle_request(inbound(initialize_body()), Bytes::new())
            .await
            .unwrap();
        let response = transport
            .handle_request(
                inbound(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})),
                Bytes::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert!(matches!(response.body, ResponseBody::Empty));
    }

    #[tokio::test]
    async fn test_json_batch_keeps_one_response_per_request() {
        let transport = transport(ResponseMode::Json);
        transport
            .handle_request(inbound(initialize_body()), Bytes::new())
            .await
            .unwrap();
        let body = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "work"}}
        ]);
        let payload = json_payload(
            transport
                .handle_request(inbound(body), Bytes::new())
                .await
                .unwrap(),
        );
        let responses = payload.as_array().expect("batch reply");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], json!(1));
        assert_eq!(responses[1]["result"]["content"][0]["text"], json!("work"));
    }

    #[tokio::test]
    async fn test_stream_carries_notifications_then_response() {
        let transport = transport(ResponseMode::Stream);
        transport
            .handle_request(inbound(initialize_body()), Bytes::new())
            .await
            .unwrap();
        let response = transport
            .handle_request(
                inbound(json!({
                    "jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "work"}
                })),
                Bytes::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.session_id.as_deref(), Some("fixed-session"));
        let ResponseBody::Stream(stream) = response.body else {
            panic!("expected stream body");
        };
        let messages: Vec<_> = stream.collect().await;
        assert_eq!(messages.len(), 2);
        let first = messages[0].as_ref().unwrap();
        assert!(first.is_notification());
        match messages[1].as_ref().unwrap() {
            ServerJsonRpcMessage::Response(response) => {
                assert_eq!(response.id, RequestId::Number(7));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_transport_refuses_requests() {
        let transport = transport(ResponseMode::Json);
        transport.close().await.unwrap();
        let result = transport
            .handle_request(inbound(initialize_body()), Bytes::new())
            .await;
        assert!(matches!(result, Err(StreamableHttpError::Closed)));
    }

    #[test]
    fn test_connect_twice_fails() {
        let transport = transport(ResponseMode::Json);
        let result = transport.connect(ServerEngine::new(Chatty));
        assert!(matches!(result, Err(StreamableHttpError::AlreadyConnected)));
    }

    #[tokio::test]
    async fn test_unconnected_transport_errors() {
        let transport = StreamableHttpServerTransport::default();
        let result = transport
            .handle_request(inbound(initialize_body()), Bytes::new())
            .await;
        assert!(matches!(result, Err(StreamableHttpError::NotConnected)));
    }
}
