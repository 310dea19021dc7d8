//! Notification display collaborator.

use async_trait::async_trait;
use tracing::info;

use crate::ServiceWorkerError;

/// Options passed alongside a notification title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    pub body: String,
    /// Icon path.
    pub icon: String,
    /// Badge path.
    pub badge: String,
}

/// Displays system notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<(), ServiceWorkerError>;
}

/// Writes notifications to the log instead of a desktop surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<(), ServiceWorkerError> {
        info!(
            title,
            body = %options.body,
            icon = %options.icon,
            badge = %options.badge,
            "Showing notification"
        );
        Ok(())
    }
}
