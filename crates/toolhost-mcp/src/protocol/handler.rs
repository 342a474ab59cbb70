//! Per-session request handler — gates on negotiation state, routes to the
//! dispatcher, and shapes results for the wire.

use tokio::sync::Mutex;

use serde_json::Value;
use toolhost::{CapabilityKind, Dispatcher};

use crate::types::*;

use super::convert;
use super::negotiation::{NegotiatedCapabilities, SessionState};
use super::validator::{parse_optional_params, parse_params, validate_request};

/// Handles JSON-RPC messages for exactly one session.
pub struct ProtocolHandler {
    dispatcher: Dispatcher,
    catalog: Catalog,
    capabilities: Mutex<NegotiatedCapabilities>,
}

impl ProtocolHandler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let catalog = convert::catalog(dispatcher.registry());
        Self {
            dispatcher,
            catalog,
            capabilities: Mutex::new(NegotiatedCapabilities::default()),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn state(&self) -> SessionState {
        self.capabilities.lock().await.state
    }

    /// Move to `Closed`. Returns `false` if it already was.
    pub async fn close(&self) -> bool {
        self.capabilities.lock().await.close()
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        if let Err(e) = self.admit(&request).await {
            return e.to_json_rpc_error(request.id).into();
        }

        let id = request.id.clone();
        match self.dispatch_request(request).await {
            Ok(value) => JsonRpcResponse::new(id, value).into(),
            Err(e) => {
                tracing::debug!("Request {id} failed: {e}");
                e.to_json_rpc_error(id).into()
            }
        }
    }

    /// Check a request against the session state without running it.
    ///
    /// `initialize` is always admitted (negotiation itself rejects repeats);
    /// `ping` is admitted until close; everything else needs `Negotiated`.
    pub async fn admit(&self, request: &JsonRpcRequest) -> McpResult<()> {
        validate_request(request)?;
        let caps = self.capabilities.lock().await;
        match request.method.as_str() {
            "initialize" => Ok(()),
            "ping" if caps.state != SessionState::Closed => Ok(()),
            method => caps.require_negotiated(method),
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        let JsonRpcRequest { method, params, .. } = request;
        match method.as_str() {
            "initialize" => self.handle_initialize(params).await,
            "shutdown" => {
                tracing::info!("Shutdown requested");
                Ok(Value::Object(serde_json::Map::new()))
            }
            "ping" => Ok(Value::Object(serde_json::Map::new())),

            "tools/list" => self.handle_tools_list(params),
            "tools/call" => self.handle_tools_call(params).await,

            "resources/list" => self.handle_resources_list(params),
            "resources/templates/list" => self.handle_resource_templates_list(params),
            "resources/read" => self.handle_resources_read(params).await,

            "prompts/list" => self.handle_prompts_list(params),
            "prompts/get" => self.handle_prompts_get(params).await,

            _ => Err(McpError::MethodNotFound(method)),
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            NOTIFICATION_INITIALIZED | "initialized" => {
                let mut caps = self.capabilities.lock().await;
                if let Err(e) = caps.mark_initialized() {
                    tracing::warn!("Ignoring initialized notification: {e}");
                }
            }
            NOTIFICATION_CANCELLED => {
                tracing::debug!("Cancellation for a request that is no longer in flight");
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let init_params: InitializeParams = parse_params("initialize", params)?;

        let mut caps = self.capabilities.lock().await;
        let result = caps.negotiate(init_params, self.catalog.clone())?;

        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    fn handle_tools_list(&self, params: Option<Value>) -> McpResult<Value> {
        let _: ListParams = parse_optional_params("tools/list", params)?;
        let result = ToolListResult {
            tools: self.catalog.tools.clone(),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> McpResult<Value> {
        let call_params: ToolCallParams = parse_params("tools/call", params)?;

        let payload = self
            .dispatcher
            .dispatch(CapabilityKind::Tool, &call_params.name, call_params.arguments)
            .await
            .into_result()
            .map_err(|f| McpError::from_failure(CapabilityKind::Tool, f))?;

        serde_json::to_value(ToolCallResult::from_payload(payload))
            .map_err(|e| McpError::InternalError(e.to_string()))
    }

    fn handle_resources_list(&self, params: Option<Value>) -> McpResult<Value> {
        let _: ListParams = parse_optional_params("resources/list", params)?;
        let result = ResourceListResult {
            resources: self.catalog.resources.clone(),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    fn handle_resource_templates_list(&self, params: Option<Value>) -> McpResult<Value> {
        let _: ListParams = parse_optional_params("resources/templates/list", params)?;
        let result = ResourceTemplateListResult {
            resource_templates: self.catalog.resource_templates.clone(),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> McpResult<Value> {
        let read_params: ResourceReadParams = parse_params("resources/read", params)?;
        let uri = read_params.uri;

        let payload = self
            .dispatcher
            .dispatch(CapabilityKind::Resource, &uri, read_params.arguments)
            .await
            .into_result()
            .map_err(|f| McpError::from_failure(CapabilityKind::Resource, f))?;

        let mime_type = self
            .dispatcher
            .registry()
            .match_resource(&uri)
            .and_then(|(descriptor, _, _)| descriptor.mime_type.clone());

        serde_json::to_value(convert::read_result(&uri, mime_type, payload))
            .map_err(|e| McpError::InternalError(e.to_string()))
    }

    fn handle_prompts_list(&self, params: Option<Value>) -> McpResult<Value> {
        let _: ListParams = parse_optional_params("prompts/list", params)?;
        let result = PromptListResult {
            prompts: self.catalog.prompts.clone(),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_prompts_get(&self, params: Option<Value>) -> McpResult<Value> {
        let get_params: PromptGetParams = parse_params("prompts/get", params)?;

        let payload = self
            .dispatcher
            .dispatch(CapabilityKind::Prompt, &get_params.name, get_params.arguments)
            .await
            .into_result()
            .map_err(|f| McpError::from_failure(CapabilityKind::Prompt, f))?;

        let description = self
            .dispatcher
            .registry()
            .lookup(CapabilityKind::Prompt, &get_params.name)
            .ok()
            .map(|(descriptor, _)| descriptor.description.clone())
            .filter(|d| !d.is_empty());

        serde_json::to_value(convert::prompt_result(description, payload))
            .map_err(|e| McpError::InternalError(e.to_string()))
    }
}
