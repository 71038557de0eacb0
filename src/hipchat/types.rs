use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::reply::{Color, MessageFormat};

/// Room message webhook delivered by HipChat.
///
/// Only the message text is needed to dispatch; the rest is kept for logging.
#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
    #[serde(default)]
    pub event: String,
    pub item: WebhookItem,
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    #[serde(default)]
    pub webhook_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookItem {
    pub message: WebhookMessage,
    #[serde(default)]
    pub room: Option<WebhookRoom>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRoom {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

impl Webhook {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| BridgeError::Parse(format!("Invalid webhook body: {e}")))
    }

    pub fn text(&self) -> &str {
        &self.item.message.message
    }

    pub fn room_id(&self) -> Option<String> {
        self.item.room.as_ref().map(|room| room.id.to_string())
    }

    pub fn room_name(&self) -> Option<&str> {
        self.item.room.as_ref().and_then(|room| room.name.as_deref())
    }
}

/// Installation callback sent when the integration is added to a room.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPayload {
    pub oauth_id: String,
    #[serde(default)]
    pub room_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub capabilities_url: Option<String>,
}

impl InstallPayload {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| BridgeError::Parse(format!("Invalid installation body: {e}")))
    }
}

/// Body posted to a room notification URL.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub color: Color,
    pub message: String,
    pub notify: bool,
    pub message_format: MessageFormat,
}
