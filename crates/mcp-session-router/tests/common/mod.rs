#![allow(dead_code)]

pub mod counter;

use futures::StreamExt;
use mcp_session_router::{
    ServerEngine,
    transport::{StreamableHttpServerConfig, StreamableHttpService},
};
use serde_json::{Value, json};
use sse_stream::SseStream;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use self::counter::Counter;

pub const HEADER_SESSION_ID: &str = "mcp-session-id";

pub async fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// A router bound to an ephemeral local port, shut down on drop.
pub struct TestServer {
    pub url: String,
    pub service: StreamableHttpService,
    pub client: reqwest::Client,
    ct: CancellationToken,
}

impl TestServer {
    pub async fn start(config: StreamableHttpServerConfig) -> anyhow::Result<Self> {
        init().await;
        let service = StreamableHttpService::new(ServerEngine::new(Counter::default()), config);
        let path = service.config.path.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let ct = CancellationToken::new();
        let router = service.clone().router();
        let shutdown = ct.clone();
        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
                .await
            {
                tracing::error!(%error, "test server stopped with error");
            }
        });
        Ok(Self {
            url: format!("http://{addr}{path}"),
            service,
            client: reqwest::Client::new(),
            ct,
        })
    }

    pub async fn post(
        &self,
        session_id: Option<&str>,
        body: &Value,
    ) -> anyhow::Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.url)
            .header("accept", "application/json, text/event-stream")
            .json(body);
        if let Some(session_id) = session_id {
            request = request.header(HEADER_SESSION_ID, session_id);
        }
        Ok(request.send().await?)
    }

    /// Initialize a new session and return its id.
    pub async fn open_session(&self) -> anyhow::Result<String> {
        let response = self.post(None, &initialize_request(0)).await?;
        anyhow::ensure!(
            response.status() == reqwest::StatusCode::OK,
            "initialize failed with {}",
            response.status()
        );
        let session_id = session_id_of(&response)?;
        // drain the body so a streamed reply completes
        response.bytes().await?;
        self.post(Some(&session_id), &initialized_notification())
            .await?;
        Ok(session_id)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

pub fn session_id_of(response: &reqwest::Response) -> anyhow::Result<String> {
    let value = response
        .headers()
        .get(HEADER_SESSION_ID)
        .ok_or_else(|| anyhow::anyhow!("response has no session id header"))?;
    Ok(value.to_str()?.to_owned())
}

pub fn initialize_request(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "0.1.0"}
        }
    })
}

pub fn initialized_notification() -> Value {
    json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
}

pub fn call_tool(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

pub fn no_valid_session() -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": -32000, "message": "Bad Request: No valid session ID provided"},
        "id": null
    })
}

/// The JSON-RPC messages carried by an event stream response.
pub async fn sse_messages(response: reqwest::Response) -> anyhow::Result<Vec<Value>> {
    let mut events = SseStream::from_byte_stream(response.bytes_stream()).boxed();
    let mut messages = Vec::new();
    while let Some(sse) = events.next().await {
        let sse = sse?;
        let Some(data) = sse.data else {
            continue;
        };
        anyhow::ensure!(
            sse.event.as_deref() == Some("message"),
            "unexpected event type {:?}",
            sse.event
        );
        messages.push(serde_json::from_str(&data)?);
    }
    Ok(messages)
}
