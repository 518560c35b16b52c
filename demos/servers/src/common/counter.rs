use std::{sync::Arc, time::Duration};

use mcp_session_router::{
    ErrorData, RequestContext, ServerHandler,
    handler::server::common::schema_for_type,
    model::{
        CallToolRequestParam, CallToolResult, Content, EmptyObject, Implementation,
        ListToolsResult, LoggingLevel, LoggingMessageNotificationParam, ProtocolVersion,
        ServerCapabilities, ServerInfo, Tool,
    },
    schemars,
};
use serde_json::json;
use tokio::sync::Mutex;

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct AddArgs {
    /// The amount to add to the counter, may be negative
    pub amount: i32,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct NotificationStreamArgs {
    /// Milliseconds between two notifications
    #[serde(default = "NotificationStreamArgs::default_interval")]
    pub interval_ms: u64,
    /// Number of notifications to send
    #[serde(default = "NotificationStreamArgs::default_count")]
    pub count: u32,
}

impl NotificationStreamArgs {
    fn default_interval() -> u64 {
        100
    }
    fn default_count() -> u32 {
        10
    }
}

#[derive(Clone, Default)]
pub struct Counter {
    counter: Arc<Mutex<i32>>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counter: Arc::new(Mutex::new(0)),
        }
    }

    async fn increment(&self) -> i32 {
        let mut counter = self.counter.lock().await;
        *counter += 1;
        *counter
    }

    async fn decrement(&self) -> i32 {
        let mut counter = self.counter.lock().await;
        *counter -= 1;
        *counter
    }

    async fn get_value(&self) -> i32 {
        *self.counter.lock().await
    }

    async fn add(&self, AddArgs { amount }: AddArgs) -> i32 {
        let mut counter = self.counter.lock().await;
        *counter += amount;
        *counter
    }

    async fn start_notification_stream(
        &self,
        NotificationStreamArgs { interval_ms, count }: NotificationStreamArgs,
        context: &RequestContext,
    ) -> Result<CallToolResult, ErrorData> {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        for i in 0..count {
            interval.tick().await;
            if context.ct.is_cancelled() {
                break;
            }
            let level = if i % 2 == 0 {
                LoggingLevel::Info
            } else {
                LoggingLevel::Debug
            };
            context
                .peer
                .notify_logging_message(LoggingMessageNotificationParam {
                    level,
                    logger: Some("notification-stream".into()),
                    data: json!({
                        "message": format!("notification {} of {count}", i + 1),
                        "session": context.session_id.as_deref(),
                    }),
                })
                .await
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        }
        Ok(CallToolResult::success(vec![Content::text(format!(
            "sent {count} notifications every {interval_ms}ms"
        ))]))
    }
}

fn value_result(value: i32) -> CallToolResult {
    CallToolResult::success(vec![Content::text(value.to_string())])
}

impl ServerHandler for Counter {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_logging()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some("This server provides a counter tool that can increment and decrement values. The counter starts at 0 and is shared by every session. Use 'get_value' to check the current count, and 'start_notification_stream' to receive log notifications on the response stream.".to_string()),
        }
    }

    async fn list_tools(&self, _context: RequestContext) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(vec![
            Tool::new(
                "increment",
                "Increment the counter by 1",
                schema_for_type::<EmptyObject>(),
            ),
            Tool::new(
                "decrement",
                "Decrement the counter by 1",
                schema_for_type::<EmptyObject>(),
            ),
            Tool::new(
                "get_value",
                "Get the current counter value",
                schema_for_type::<EmptyObject>(),
            ),
            Tool::new(
                "add",
                "Add an amount to the counter",
                schema_for_type::<AddArgs>(),
            ),
            Tool::new(
                "start_notification_stream",
                "Send periodic log notifications on the response stream",
                schema_for_type::<NotificationStreamArgs>(),
            ),
        ]))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext,
    ) -> Result<CallToolResult, ErrorData> {
        match request.name.as_ref() {
            "increment" => Ok(value_result(self.increment().await)),
            "decrement" => Ok(value_result(self.decrement().await)),
            "get_value" => Ok(value_result(self.get_value().await)),
            "add" => Ok(value_result(self.add(request.parse_arguments()?).await)),
            "start_notification_stream" => {
                self.start_notification_stream(request.parse_arguments()?, &context)
                    .await
            }
            name => Err(ErrorData::invalid_params(
                format!("tool not found: {name}"),
                None,
            )),
        }
    }
}
