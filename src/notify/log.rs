use async_trait::async_trait;

use super::Notifier;

/// Fallback notifier that writes to the log instead of sending anything
///
/// Used when no `[notify]` section is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_once(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!("Notification (log only): {}\n{}", subject, body);
        Ok(())
    }
}
