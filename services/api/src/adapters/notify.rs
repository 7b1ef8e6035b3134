//! services/api/src/adapters/notify.rs
//!
//! The only `NotificationSink` shipped today: it writes the notification to the
//! log. A mail or SMS sink can implement the same port later.

use async_trait::async_trait;
use dumpster_core::ports::NotificationSink;
use tracing::info;

#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, email: &str, subject: &str, message: &str) {
        info!(target: "notify", to = email, subject, "{}", message);
    }
}
