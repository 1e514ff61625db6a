use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SmsSettings;
use crate::utils::error::SendError;

pub mod console;
pub mod sms;

pub use console::ConsoleSink;
pub use sms::SmsSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    pub message_id: Option<String>,
}

/// Delivery transport for restock alerts. Fire-and-forget: one message in,
/// an ack or a transport error out. The runner never retries a send.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, message: &str) -> Result<SendAck, SendError>;
}

/// Picks the SMS sink when credentials are configured, the console sink
/// otherwise.
pub fn build_sink(sms: Option<SmsSettings>) -> Arc<dyn AlertSink> {
    match sms {
        Some(settings) => Arc::new(SmsSink::new(settings)),
        None => Arc::new(ConsoleSink::new()),
    }
}
