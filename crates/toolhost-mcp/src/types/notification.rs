//! MCP notification types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{JsonRpcNotification, RequestId};

pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";

/// Parameters of `notifications/cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    pub request_id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CancelledParams {
    pub fn request_id(&self) -> Option<RequestId> {
        RequestId::from_value(&self.request_id)
    }

    pub fn notification(id: &RequestId, reason: impl Into<String>) -> JsonRpcNotification {
        let params = CancelledParams {
            request_id: serde_json::to_value(id).unwrap_or(Value::Null),
            reason: Some(reason.into()),
        };
        JsonRpcNotification::new(
            NOTIFICATION_CANCELLED,
            serde_json::to_value(params).ok(),
        )
    }
}
