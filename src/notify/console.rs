use async_trait::async_trait;
use tracing::warn;

use super::{AlertSink, SendAck};
use crate::utils::error::SendError;

/// Fallback sink that only logs, used when no SMS credentials are present.
/// A run still surfaces alert-worthy transitions this way.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, message: &str) -> Result<SendAck, SendError> {
        warn!("ALERT: {message}");
        Ok(SendAck { message_id: None })
    }
}
