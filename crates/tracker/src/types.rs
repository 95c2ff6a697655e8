//! Core types: identifiers, tenants, users, and tasks.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

use crate::error::{Result, TrackerError};
use crate::rbac::Role;
use crate::recurrence::{Recurrence, RecurrenceSpec};

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LEN: usize = 5000;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Create a new random ID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Create from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Get the inner ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TrackerError;

            fn from_str(s: &str) -> Result<Self> {
                s.parse::<Ulid>()
                    .map(Self)
                    .map_err(|_| TrackerError::validation($entity, format!("'{s}' is not a valid id")))
            }
        }
    };
}

ulid_id!(
    /// Unique identifier for a tenant (organization).
    TenantId,
    "tenant_id"
);
ulid_id!(
    /// Unique identifier for a user.
    UserId,
    "user_id"
);
ulid_id!(
    /// Unique identifier for a task.
    TaskId,
    "task_id"
);
ulid_id!(
    /// Unique identifier for a notification.
    NotificationId,
    "notification_id"
);

/// An isolated organization. Users and tasks never cross tenants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    /// Lowercased, unique across all tenants.
    pub email: String,
    pub display_name: String,
    pub role: Role,
    /// `salt$digest`, both hex.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// Done and cancelled tasks are never overdue and never notified.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TrackerError::validation(
                "status",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A task, a recurring template, or an instance spawned from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub created_by: UserId,
    pub assigned_to: Option<UserId>,
    pub due_date: Option<DateTime<Utc>>,
    /// Present only on recurring templates.
    pub recurrence: Option<Recurrence>,
    /// The template this instance was spawned from.
    pub parent_id: Option<TaskId>,
    /// The scheduled instant this instance stands for.
    pub occurrence: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once a due-soon notification has gone out.
    #[serde(default)]
    pub due_soon_notified: bool,
}

impl Task {
    /// Whether this task is a recurring template.
    #[must_use]
    pub const fn is_template(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Whether the task is past due and still open.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.due_date.is_some_and(|due| due < now)
    }

    /// Whether `user` created the task or is its assignee.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.created_by == user || self.assigned_to == Some(user)
    }

    /// Move to `status`, keeping `completed_at` in step.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        if status == TaskStatus::Done && self.status != TaskStatus::Done {
            self.completed_at = Some(now);
        } else if status != TaskStatus::Done {
            self.completed_at = None;
        }
        self.status = status;
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Turns the task into a recurring template.
    #[serde(default)]
    pub recurrence: Option<RecurrenceSpec>,
}

impl TaskDraft {
    /// A draft with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update for a task.
///
/// `assigned_to` and `due_date` distinguish "absent" (leave alone) from an
/// explicit `null` (clear).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<UserId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceSpec>,
}

fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trim and bound a title.
///
/// # Errors
///
/// Returns a validation error for empty or over-long titles.
pub fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::validation("title", "must not be empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(TrackerError::validation(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Bound a description.
///
/// # Errors
///
/// Returns a validation error for over-long descriptions.
pub fn validate_description(description: &str) -> Result<String> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(TrackerError::validation(
            "description",
            format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
        ));
    }
    Ok(description.to_string())
}
