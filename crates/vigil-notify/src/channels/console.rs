use crate::Notifier;
use anyhow::Result;
use async_trait::async_trait;
use vigil_common::types::Event;

/// Console notification channel: logs the rendered message. Used for
/// operator visibility and in tests.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, message: &str, target: Option<&str>, event: &Event) -> Result<()> {
        tracing::info!(
            event_id = %event.id,
            to = target.unwrap_or("-"),
            "NOTIFICATION: {message}"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
