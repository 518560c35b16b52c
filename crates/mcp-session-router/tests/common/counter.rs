use std::sync::Arc;

use mcp_session_router::{
    ErrorData, RequestContext, ServerHandler,
    handler::server::common::schema_for_type,
    model::{
        CallToolRequestParam, CallToolResult, Content, EmptyObject, ListToolsResult,
        LoggingLevel, LoggingMessageNotificationParam, ServerCapabilities, ServerInfo, Tool,
    },
    schemars,
};
use serde_json::json;
use tokio::sync::Mutex;

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct NotifyArgs {
    /// How many log notifications to send before answering
    pub count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    counter: Arc<Mutex<i32>>,
}

impl Counter {
    async fn notify(
        &self,
        request: &CallToolRequestParam,
        context: &RequestContext,
    ) -> Result<CallToolResult, ErrorData> {
        let NotifyArgs { count } = request.parse_arguments()?;
        for i in 0..count {
            context
                .peer
                .notify_logging_message(LoggingMessageNotificationParam {
                    level: LoggingLevel::Info,
                    logger: Some("counter".into()),
                    data: json!({ "tick": i }),
                })
                .await
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        }
        Ok(CallToolResult::success(vec![Content::text(format!(
            "sent {count} notifications"
        ))]))
    }
}

impl ServerHandler for Counter {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_logging()
                .build(),
            instructions: Some("A counter shared by every session".to_string()),
            ..Default::default()
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
                "get_value",
                "Get the current counter value",
                schema_for_type::<EmptyObject>(),
            ),
            Tool::new(
                "notify",
                "Send log notifications, then answer",
                schema_for_type::<NotifyArgs>(),
            ),
        ]))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext,
    ) -> Result<CallToolResult, ErrorData> {
        match request.name.as_ref() {
            "increment" => {
                let mut counter = self.counter.lock().await;
                *counter += 1;
                Ok(CallToolResult::success(vec![Content::text(
                    counter.to_string(),
                )]))
            }
            "get_value" => {
                let counter = self.counter.lock().await;
                Ok(CallToolResult::success(vec![Content::text(
                    counter.to_string(),
                )]))
            }
            "notify" => self.notify(&request, &context).await,
            name => Err(ErrorData::invalid_params(
                format!("tool not found: {name}"),
                None,
            )),
        }
    }
}
