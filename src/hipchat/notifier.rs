use log::debug;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::error::{BridgeError, Result};
use crate::reply::{MessageFormat, Reply};

use super::types::OutgoingMessage;

/// Posts replies to a HipChat room notification URL.
pub struct HipChatNotifier {
    client: Client,
    url: Url,
    format: MessageFormat,
}

impl HipChatNotifier {
    pub fn new(url: &str, format: MessageFormat, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("teamcity-buildbot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {e}")))?;

        let url = Url::parse(url)
            .map_err(|e| BridgeError::Config(format!("Invalid HipChat URL: {e}")))?;

        Ok(Self {
            client,
            url,
            format,
        })
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    /// # Errors
    ///
    /// `Api` when HipChat answers with a non-2xx status, `Network` when it
    /// cannot be reached.
    pub async fn notify(&self, reply: &Reply) -> Result<()> {
        let message = OutgoingMessage {
            color: reply.color,
            message: reply.render(self.format),
            notify: false,
            message_format: self.format,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(BridgeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Posted {:?} reply to HipChat", reply.color);
        Ok(())
    }
}
