//! Notification sink port
//!
//! Alerts for risk-limit breaches, generation summaries, and failures. Delivery is best-effort:
//! `notify` must return immediately and never block the controller loop.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Allocations scaled down to respect the drawdown limit
    RiskLimitBreach,
    /// A generation boundary completed
    GenerationSummary,
    /// A component failed and was replaced
    ComponentFailure,
    /// A record could not be persisted after all retries
    PersistenceFailure,
    /// Controller shut down
    Shutdown,
}

impl NotificationKind {
    /// Whether operators should be woken up for this
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            NotificationKind::RiskLimitBreach
                | NotificationKind::ComponentFailure
                | NotificationKind::PersistenceFailure
        )
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::RiskLimitBreach => write!(f, "RISK_LIMIT_BREACH"),
            NotificationKind::GenerationSummary => write!(f, "GENERATION_SUMMARY"),
            NotificationKind::ComponentFailure => write!(f, "COMPONENT_FAILURE"),
            NotificationKind::PersistenceFailure => write!(f, "PERSISTENCE_FAILURE"),
            NotificationKind::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

/// A notification event with a free-form JSON payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(kind: NotificationKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload,
        }
    }
}

/// Alert sink
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification. Must not block.
    fn notify(&self, notification: Notification);
}

/// Sink that writes notifications to the log
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: Notification) {
        if notification.kind.is_alert() {
            warn!(kind = %notification.kind, payload = %notification.payload, "Notification");
        } else {
            info!(kind = %notification.kind, payload = %notification.payload, "Notification");
        }
    }
}

/// Sink that forwards notifications to an async consumer (chat bridge, webhook, ...)
///
/// Uses `try_send`; notifications are dropped when the buffer is full.
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            warn!("Dropping notification: {}", e);
        }
    }
}
