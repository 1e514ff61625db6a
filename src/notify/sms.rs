use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{AlertSink, SendAck};
use crate::config::SmsSettings;
use crate::utils::error::SendError;

/// Sends alerts as SMS through a Twilio-compatible REST endpoint.
pub struct SmsSink {
    client: Client,
    settings: SmsSettings,
}

impl SmsSink {
    pub fn new(settings: SmsSettings) -> Self {
        SmsSink {
            client: Client::new(),
            settings,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.account_sid
        )
    }
}

#[async_trait]
impl AlertSink for SmsSink {
    fn name(&self) -> &str {
        "sms"
    }

    async fn send(&self, message: &str) -> Result<SendAck, SendError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(&[
                ("From", self.settings.from_number.as_str()),
                ("To", self.settings.to_number.as_str()),
                ("Body", message),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("sid").and_then(Value::as_str).map(str::to_string));
        debug!("SMS accepted, sid {:?}", message_id);
        Ok(SendAck { message_id })
    }
}
