use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures::StreamExt;
use serde_json::Value;

use super::{
    StreamableHttpServerConfig,
    session::{self, SessionRegistry},
    transport::StreamableHttpServerTransport,
};
use crate::{
    RouterError,
    model::{ErrorData, InboundMessage, ServerJsonRpcMessage, is_initialize_request},
    service::ServerEngine,
    transport::{
        MessageStream, ResponseBody, Transport, TransportOptions, TransportResponse,
        common::http_header::{HEADER_SESSION_ID, HEADER_X_ACCEL_BUFFERING},
    },
};

/// Builds the transport for a new session.
pub type TransportFactory<T> =
    Arc<dyn Fn(TransportOptions) -> Result<T, std::io::Error> + Send + Sync>;

/// The streamable HTTP endpoint: routes every call to the transport of its
/// session, creating one when a client initializes.
pub struct StreamableHttpService<T = StreamableHttpServerTransport> {
    pub config: StreamableHttpServerConfig,
    engine: ServerEngine,
    sessions: Arc<SessionRegistry<T>>,
    transport_factory: TransportFactory<T>,
}

impl<T> Clone for StreamableHttpService<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            engine: self.engine.clone(),
            sessions: self.sessions.clone(),
            transport_factory: self.transport_factory.clone(),
        }
    }
}

impl<T> std::fmt::Debug for StreamableHttpService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpService")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl StreamableHttpService {
    pub fn new(engine: ServerEngine, config: StreamableHttpServerConfig) -> Self {
        Self::with_transport_factory(
            engine,
            |options| Ok(StreamableHttpServerTransport::new(options)),
            config,
        )
    }
}

impl<T: Transport> StreamableHttpService<T> {
    pub fn with_transport_factory<F>(
        engine: ServerEngine,
        transport_factory: F,
        config: StreamableHttpServerConfig,
    ) -> Self
    where
        F: Fn(TransportOptions) -> Result<T, std::io::Error> + Send + Sync + 'static,
    {
        Self {
            config,
            engine,
            sessions: Arc::new(SessionRegistry::new()),
            transport_factory: Arc::new(transport_factory),
        }
    }

    pub fn engine(&self) -> &ServerEngine {
        &self.engine
    }

    pub fn sessions(&self) -> Arc<SessionRegistry<T>> {
        self.sessions.clone()
    }

    /// An axum router serving `GET`, `POST` and `DELETE` on the configured path.
    pub fn router(self) -> Router {
        let path = self.config.path.clone();
        Router::new()
            .route(
                &path,
                get(get_handler)
                    .post(post_handler::<T>)
                    .delete(delete_handler::<T>),
            )
            .with_state(Arc::new(self))
    }

    pub async fn handle_post(&self, headers: &HeaderMap, body: Bytes) -> Response {
        let value: Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, "request body is not valid JSON");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    ErrorData::parse_error("Parse error", None),
                );
            }
        };
        let initialize = is_initialize_request(&value);
        let message = InboundMessage::from(value);

        let result = match SessionHeader::read(headers) {
            SessionHeader::Present(session_id) => match self.sessions.get(session_id).await {
                Some(transport) => {
                    tracing::debug!(%session_id, "POST request with existing session");
                    transport.handle_request(message, body).await.map_err(|error| {
                        RouterError::transport::<T>(error, "handling a session request")
                    })
                }
                None => {
                    tracing::warn!(%session_id, "no live session for the given id");
                    return reject();
                }
            },
            SessionHeader::Invalid => {
                tracing::warn!("session id header is not a valid session id");
                return reject();
            }
            SessionHeader::Absent if initialize => self.create_session(message, body).await,
            SessionHeader::Absent => {
                tracing::warn!("request without session id is not an initialize request");
                return reject();
            }
        };

        match result {
            Ok(response) => self.http_response(response),
            Err(error) => {
                tracing::error!(%error, "failed to handle request");
                internal_error()
            }
        }
    }

    async fn create_session(
        &self,
        message: InboundMessage,
        body: Bytes,
    ) -> Result<TransportResponse, RouterError> {
        let options = TransportOptions {
            session_id_generator: session::session_id,
            response_mode: self.config.response_mode(),
        };
        let transport =
            Arc::new((self.transport_factory)(options).map_err(RouterError::transport_creation::<T>)?);
        transport
            .connect(self.engine.clone())
            .map_err(|error| RouterError::transport::<T>(error, "connecting to the server engine"))?;
        let response = transport
            .handle_request(message, body)
            .await
            .map_err(|error| RouterError::transport::<T>(error, "handling an initialize request"))?;

        match transport.session_id().filter(|id| !id.is_empty()) {
            Some(session_id) => {
                if let Err(error) = self
                    .sessions
                    .put(session_id.clone(), transport.clone())
                    .await
                {
                    if let Err(error) = transport.close().await {
                        tracing::debug!(%session_id, %error, "failed to close unregistered transport");
                    }
                    return Err(error.into());
                }
                tracing::info!(%session_id, "created new session");
            }
            None => {
                tracing::debug!("transport did not assign a session id, discarding it");
            }
        }
        Ok(response)
    }

    pub async fn handle_delete(&self, headers: &HeaderMap) -> Response {
        let SessionHeader::Present(session_id) = SessionHeader::read(headers) else {
            tracing::warn!("DELETE request without a valid session id");
            return reject();
        };
        let Some(transport) = self.sessions.remove(session_id).await else {
            tracing::warn!(%session_id, "DELETE request for unknown session");
            return error_response(StatusCode::NOT_FOUND, ErrorData::session_not_found());
        };
        match transport.close().await {
            Ok(()) => {
                tracing::info!(%session_id, "session closed");
                StatusCode::NO_CONTENT.into_response()
            }
            Err(error) => {
                let error = RouterError::transport::<T>(error, "closing a session");
                tracing::error!(%session_id, %error, "failed to close session");
                internal_error()
            }
        }
    }

    /// Close every live session and empty the registry.
    pub async fn close_all(&self) {
        let sessions = self.sessions.drain().await;
        tracing::info!(count = sessions.len(), "closing all sessions");
        for (session_id, transport) in sessions {
            if let Err(error) = transport.close().await {
                tracing::warn!(%session_id, %error, "failed to close session");
            }
        }
    }

    fn http_response(&self, response: TransportResponse) -> Response {
        let TransportResponse {
            status,
            session_id,
            body,
        } = response;
        let mut response = match body {
            ResponseBody::Empty => status.into_response(),
            ResponseBody::Json(payload) => (status, Json(payload)).into_response(),
            ResponseBody::Stream(stream) => {
                let mut response = self.sse_response(stream);
                *response.status_mut() = status;
                response
            }
        };
        if let Some(session_id) = session_id {
            match HeaderValue::from_str(&session_id) {
                Ok(value) => {
                    response.headers_mut().insert(HEADER_SESSION_ID, value);
                }
                Err(error) => {
                    tracing::error!(%session_id, %error, "session id is not a valid header value");
                }
            }
        }
        response
    }

    fn sse_response(&self, stream: MessageStream) -> Response {
        let events = stream
            .scan((), |_, item| {
                futures::future::ready(match item {
                    Ok(message) => Some(message),
                    Err(error) => {
                        tracing::error!(%error, "response stream failed after it was started");
                        None
                    }
                })
            })
            .map(|message: ServerJsonRpcMessage| {
                Event::default()
                    .event("message")
                    .json_data(&message)
                    .inspect_err(|error| tracing::error!(%error, "failed to encode event"))
            });
        let sse = Sse::new(events);
        let mut response = match self.config.sse_keep_alive {
            Some(interval) => sse
                .keep_alive(KeepAlive::new().interval(interval))
                .into_response(),
            None => sse.into_response(),
        };
        response
            .headers_mut()
            .insert(HEADER_X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
        response
    }
}

async fn get_handler() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        "Method Not Allowed",
    )
        .into_response()
}

async fn post_handler<T: Transport>(
    State(service): State<Arc<StreamableHttpService<T>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    service.handle_post(&headers, body).await
}

async fn delete_handler<T: Transport>(
    State(service): State<Arc<StreamableHttpService<T>>>,
    headers: HeaderMap,
) -> Response {
    service.handle_delete(&headers).await
}

/// What a request carries in its `Mcp-Session-Id` header.
enum SessionHeader<'a> {
    Absent,
    /// Present, but not visible ASCII, so it cannot name any session.
    Invalid,
    Present(&'a str),
}

impl<'a> SessionHeader<'a> {
    fn read(headers: &'a HeaderMap) -> Self {
        match headers.get(HEADER_SESSION_ID) {
            None => SessionHeader::Absent,
            Some(value) => match value.to_str() {
                Ok(session_id) => SessionHeader::Present(session_id),
                Err(_) => SessionHeader::Invalid,
            },
        }
    }
}

fn error_response(status: StatusCode, error: ErrorData) -> Response {
    (status, Json(ServerJsonRpcMessage::error(error, None))).into_response()
}

fn reject() -> Response {
    error_response(StatusCode::BAD_REQUEST, ErrorData::no_valid_session())
}

fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorData::internal_error("Internal server error", None),
    )
}
