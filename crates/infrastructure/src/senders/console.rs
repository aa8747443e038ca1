use async_trait::async_trait;
use tracing::info;

use hookcast_core::{Destination, HookcastResult, IncomingEvent, Sender};

use super::Envelope;

/// 只记录日志的发送器，用于本地调试
#[derive(Debug, Default)]
pub struct ConsoleSender;

impl ConsoleSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sender for ConsoleSender {
    fn name(&self) -> &str {
        "console"
    }

    async fn send_event(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<()> {
        let envelope = serde_json::to_string(&Envelope::new(event, destination))?;
        info!(
            destination = %destination.name(),
            callback_url = %destination.callback_url(),
            "{}",
            envelope
        );
        Ok(())
    }
}
