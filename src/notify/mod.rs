//! Outbound notifications
//!
//! A single-message trait keeps delivery pluggable: production wires in
//! SMTP, deployments without mail fall back to the log, and tests inject
//! recording doubles.

mod email;
mod log;

pub use email::EmailNotifier;
pub use log::LogNotifier;

use async_trait::async_trait;

/// Delivers one standalone notification
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_once(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}
