// Notification collaborator and the in-process admin alert hub
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

const ALERT_CAPACITY: usize = 64;

/// A local or push notification. Without a target token it is shown on the
/// current device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub target_token: Option<String>,
}

impl Notification {
    pub fn local(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            target_token: None,
        }
    }

    pub fn push(title: impl Into<String>, body: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            target_token: Some(token.into()),
        }
    }
}

/// Fire-and-forget delivery. Callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Hand a notification to the collaborator, swallowing failures.
pub async fn deliver(notifier: &dyn Notifier, notification: Notification) {
    let title = notification.title.clone();
    if let Err(e) = notifier.notify(notification).await {
        tracing::warn!(%title, "Notification delivery failed: {}", e);
    }
}

/// Writes notifications to the log. Stands in for a device notification
/// service when running as a standalone server.
pub struct LogNotifier {
    enabled: bool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        tracing::info!(
            title = %notification.title,
            push = notification.target_token.is_some(),
            "{}",
            notification.body
        );
        Ok(())
    }
}

/// Raised when a report is filed, for admin sessions that are listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAlert {
    pub report_id: String,
    pub reporter_id: String,
    pub reported_user_id: String,
    pub reason: String,
}

#[derive(Clone)]
pub struct AdminAlerts {
    tx: broadcast::Sender<AdminAlert>,
}

impl AdminAlerts {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(ALERT_CAPACITY);
        Self { tx }
    }

    /// Returns how many admin sessions received the alert.
    pub fn publish(&self, alert: AdminAlert) -> usize {
        self.tx.send(alert).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdminAlert> {
        self.tx.subscribe()
    }
}

impl Default for AdminAlerts {
    fn default() -> Self {
        Self::new()
    }
}
