//! In-process notifications.
//!
//! Every notification is persisted through the store, then published on a
//! broadcast channel for any live subscribers. Delivery beyond this process
//! is somebody else's job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::store::TaskStore;
use crate::types::{NotificationId, Task, TaskId, TenantId, UserId};

/// Capacity of the broadcast channel; slow subscribers lag past this.
const CHANNEL_CAPACITY: usize = 256;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    TaskStatusChanged,
    RecurringInstanceCreated,
    TaskDueSoon,
}

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub kind: NotificationKind,
    pub task_id: Option<TaskId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    /// An unread notification about `task` for `user`.
    pub fn about(
        task: &Task,
        user: UserId,
        kind: NotificationKind,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id: user,
            tenant_id: task.tenant_id,
            kind,
            task_id: Some(task.id),
            message: message.into(),
            created_at: now,
            read: false,
        }
    }
}

/// Persists notifications and fans them out to subscribers.
#[derive(Clone)]
pub struct NotificationHub {
    store: Arc<dyn TaskStore>,
    broadcast: broadcast::Sender<Notification>,
}

impl NotificationHub {
    /// Create a hub writing to `store`.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        let (broadcast, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { store, broadcast }
    }

    /// Store and broadcast a notification.
    ///
    /// Having no subscribers is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the notification.
    pub async fn publish(&self, notification: Notification) -> Result<()> {
        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = ?notification.kind,
            "Publishing notification"
        );
        self.store.insert_notification(notification.clone()).await?;
        let receivers = self.broadcast.send(notification).unwrap_or(0);
        tracing::trace!(receivers, "Notification broadcast");
        Ok(())
    }

    /// Subscribe to every notification published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.broadcast.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.broadcast.receiver_count()
    }
}
