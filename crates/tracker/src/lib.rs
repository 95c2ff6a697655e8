//! Task tracking domain for TaskHub.
//!
//! This crate owns everything below the HTTP layer:
//!
//! - **RBAC**: a static role → permission table plus ownership-aware checks
//! - **Recurrence**: pattern → next-instance date arithmetic
//! - **Store**: async storage trait with an in-memory backend and JSON snapshots
//! - **Accounts**: registration, password hashing, bearer sessions
//! - **Service**: permission-checked task CRUD
//! - **Notifications**: persisted and broadcast in-process
//! - **Reports**: role-scoped task statistics
//! - **Generator**: the periodic job that spawns recurring instances
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskhub_tracker::{InMemoryTaskStore, NotificationHub, SystemClock, TaskService};
//!
//! let store = Arc::new(InMemoryTaskStore::new());
//! let hub = NotificationHub::new(store.clone());
//! let service = TaskService::new(store, hub, Arc::new(SystemClock));
//! let task = service.create(&actor, draft).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod accounts;
pub mod clock;
pub mod error;
pub mod generator;
pub mod notify;
pub mod rbac;
pub mod recurrence;
pub mod reports;
pub mod service;
pub mod store;
pub mod types;

pub use accounts::{Accounts, LoginRequest, RegisterRequest, Session, SessionRegistry};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Result, TrackerError};
pub use generator::{Backoff, GenerationSummary, GeneratorConfig, RecurrenceGenerator};
pub use notify::{Notification, NotificationHub, NotificationKind};
pub use rbac::{Actor, Permission, Role, TaskAction};
pub use recurrence::{Frequency, Recurrence, RecurrenceSpec};
pub use reports::{ReportScope, TaskReport};
pub use service::TaskService;
pub use store::{InMemoryTaskStore, Snapshot, TaskFilter, TaskStore, TracingTaskStore};
pub use types::{
    NotificationId, Task, TaskDraft, TaskId, TaskPatch, TaskPriority, TaskStatus, Tenant,
    TenantId, User, UserId,
};
