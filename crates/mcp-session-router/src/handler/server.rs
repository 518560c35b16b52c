use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{
    model::{CallToolRequestParam, CallToolResult, ErrorData, ListToolsResult, ServerInfo},
    service::RequestContext,
};

pub mod common;

/// The application side of a server: what it is and which tools it offers.
///
/// Every method has a default, so a handler only overrides what it supports.
/// A single handler instance serves all sessions, so it must be shareable.
pub trait ServerHandler: Send + Sync + 'static {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::default()
    }

    fn list_tools(
        &self,
        context: RequestContext,
    ) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        let _ = context;
        std::future::ready(Ok(ListToolsResult::default()))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        let _ = context;
        std::future::ready(Err(ErrorData::invalid_params(
            format!("tool not found: {}", request.name),
            None,
        )))
    }
}

/// Object-safe mirror of [`ServerHandler`], so the engine can hold any
/// handler behind one pointer type.
pub(crate) trait DynServerHandler: Send + Sync + 'static {
    fn get_info(&self) -> ServerInfo;
    fn list_tools(&self, context: RequestContext)
    -> BoxFuture<'_, Result<ListToolsResult, ErrorData>>;
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext,
    ) -> BoxFuture<'_, Result<CallToolResult, ErrorData>>;
}

impl<H: ServerHandler> DynServerHandler for H {
    fn get_info(&self) -> ServerInfo {
        ServerHandler::get_info(self)
    }

    fn list_tools(
        &self,
        context: RequestContext,
    ) -> BoxFuture<'_, Result<ListToolsResult, ErrorData>> {
        Box::pin(ServerHandler::list_tools(self, context))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext,
    ) -> BoxFuture<'_, Result<CallToolResult, ErrorData>> {
        Box::pin(ServerHandler::call_tool(self, request, context))
    }
}

impl<H: ServerHandler> ServerHandler for Arc<H> {
    fn get_info(&self) -> ServerInfo {
        ServerHandler::get_info(&**self)
    }

    fn list_tools(
        &self,
        context: RequestContext,
    ) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        ServerHandler::list_tools(&**self, context)
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        ServerHandler::call_tool(&**self, request, context)
    }
}
