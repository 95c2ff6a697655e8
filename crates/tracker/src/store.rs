//! Storage trait and implementations.
//!
//! The in-memory store keeps the whole dataset behind one tokio `RwLock`, so
//! uniqueness checks (emails, tenant names, one instance per occurrence) are
//! atomic with their inserts. [`Snapshot`] is the serialized form of that
//! dataset and is what gets written to disk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, TrackerError};
use crate::notify::Notification;
use crate::rbac::Role;
use crate::recurrence::Recurrence;
use crate::types::{NotificationId, Task, TaskId, TaskStatus, Tenant, TenantId, User, UserId};

/// Criteria for listing tasks within a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee: Option<UserId>,
    pub created_by: Option<UserId>,
    pub parent: Option<TaskId>,
    /// Only tasks created by or assigned to this user.
    pub involving: Option<UserId>,
    /// Open tasks whose due date is before this instant.
    pub overdue_at: Option<DateTime<Utc>>,
    /// Include recurring templates; concrete tasks only when false.
    pub include_templates: bool,
}

impl TaskFilter {
    /// Whether `task` passes every criterion.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        (self.include_templates || !task.is_template())
            && self.status.is_none_or(|s| task.status == s)
            && self.assignee.is_none_or(|a| task.assigned_to == Some(a))
            && self.created_by.is_none_or(|c| task.created_by == c)
            && self.parent.is_none_or(|p| task.parent_id == Some(p))
            && self.involving.is_none_or(|u| task.involves(u))
            && self.overdue_at.is_none_or(|now| task.is_overdue(now))
    }
}

/// Trait for storage backends.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a tenant together with its founding user, or neither. Tenant
    /// names are unique (case-insensitive), emails unique across tenants.
    async fn create_tenant(&self, tenant: Tenant, founder: User) -> Result<()>;

    async fn get_tenant(&self, id: TenantId) -> Result<Tenant>;

    async fn tenant_by_name(&self, name: &str) -> Result<Option<Tenant>>;

    /// Insert a user; emails are unique across all tenants.
    async fn insert_user(&self, user: User) -> Result<()>;

    async fn get_user(&self, id: UserId) -> Result<User>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Users of a tenant, oldest first.
    async fn list_users(&self, tenant: TenantId) -> Result<Vec<User>>;

    /// Change a user's role. Demoting the tenant's last admin fails with
    /// [`TrackerError::NotAllowed`].
    async fn update_user_role(&self, id: UserId, role: Role) -> Result<User>;

    async fn insert_task(&self, task: Task) -> Result<()>;

    /// Insert a recurring instance unless one already exists for the same
    /// (parent, occurrence). Returns whether it was inserted.
    async fn insert_instance(&self, task: Task) -> Result<bool>;

    async fn get_task(&self, id: TaskId) -> Result<Task>;

    async fn update_task(&self, task: Task) -> Result<()>;

    /// Replace a template's schedule if it still equals `expected`. Returns
    /// `false` when the template is gone or its schedule was edited since.
    async fn advance_recurrence(
        &self,
        id: TaskId,
        expected: &Recurrence,
        next: Recurrence,
    ) -> Result<bool>;

    /// Flag an open task as reminded if it is still due at `due` and not yet
    /// flagged. Returns the updated task, or `None` when it no longer
    /// qualifies.
    async fn mark_due_soon_notified(&self, id: TaskId, due: DateTime<Utc>)
    -> Result<Option<Task>>;

    /// Remove a task and return it. Instances of a deleted template stay.
    async fn delete_task(&self, id: TaskId) -> Result<Task>;

    /// Tasks of a tenant matching `filter`, oldest first.
    async fn list_tasks(&self, tenant: TenantId, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Instances spawned from `parent`, in occurrence order.
    async fn instances_of(&self, parent: TaskId) -> Result<Vec<Task>>;

    /// Templates in any tenant with an occurrence due at `now`.
    async fn due_templates(&self, now: DateTime<Utc>) -> Result<Vec<Task>>;

    /// Open, not-yet-notified tasks in any tenant due in `(now, until]`.
    async fn due_soon(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Task>>;

    async fn insert_notification(&self, notification: Notification) -> Result<()>;

    /// Notifications for a user, newest first.
    async fn notifications_for(&self, user: UserId, unread_only: bool)
    -> Result<Vec<Notification>>;

    /// Mark a notification read; only its recipient may do so.
    async fn mark_notification_read(&self, user: UserId, id: NotificationId)
    -> Result<Notification>;

    /// Copy of the full dataset.
    async fn snapshot(&self) -> Result<Snapshot>;
}

/// The full dataset in serializable form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tenants: Vec<Tenant>,
    pub users: Vec<User>,
    pub tasks: Vec<Task>,
    pub notifications: Vec<Notification>,
}

impl Snapshot {
    /// Write the snapshot as JSON, replacing `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Persistence`] if serialization or I/O fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::info!(
            path = %path.display(),
            tasks = self.tasks.len(),
            users = self.users.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Read a snapshot; a missing file yields an empty dataset.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Persistence`] if the file exists but cannot be
    /// read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No snapshot found, starting empty");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
struct StoreState {
    tenants: HashMap<TenantId, Tenant>,
    users: HashMap<UserId, User>,
    tasks: HashMap<TaskId, Task>,
    notifications: HashMap<NotificationId, Notification>,
}

impl StoreState {
    fn tenant_name_taken(&self, name: &str) -> bool {
        self.tenants
            .values()
            .any(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn email_taken(&self, email: &str) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn email_conflict(&self, email: &str) -> Result<()> {
        if self.email_taken(email) {
            return Err(TrackerError::Conflict(format!(
                "email '{email}' is already registered"
            )));
        }
        Ok(())
    }

    fn admin_count(&self, tenant: TenantId) -> usize {
        self.users
            .values()
            .filter(|u| u.tenant_id == tenant && u.role == Role::Admin)
            .count()
    }
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryTaskStore {
    state: RwLock<StoreState>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store wrapped in an Arc.
    #[must_use]
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a store holding the contents of `snapshot`.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let state = StoreState {
            tenants: snapshot.tenants.into_iter().map(|t| (t.id, t)).collect(),
            users: snapshot.users.into_iter().map(|u| (u.id, u)).collect(),
            tasks: snapshot.tasks.into_iter().map(|t| (t.id, t)).collect(),
            notifications: snapshot
                .notifications
                .into_iter()
                .map(|n| (n.id, n))
                .collect(),
        };
        Self {
            state: RwLock::new(state),
        }
    }
}

fn sorted_tasks<'a>(tasks: impl Iterator<Item = &'a Task>) -> Vec<Task> {
    let mut out: Vec<Task> = tasks.cloned().collect();
    out.sort_by_key(|t| (t.created_at, t.id));
    out
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_tenant(&self, tenant: Tenant, founder: User) -> Result<()> {
        let mut state = self.state.write().await;
        if founder.tenant_id != tenant.id {
            return Err(TrackerError::validation(
                "tenant_id",
                "founder must belong to the new tenant",
            ));
        }
        if state.tenant_name_taken(&tenant.name) {
            return Err(TrackerError::Conflict(format!(
                "tenant '{}' already exists",
                tenant.name
            )));
        }
        state.email_conflict(&founder.email)?;
        state.tenants.insert(tenant.id, tenant);
        state.users.insert(founder.id, founder);
        Ok(())
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Tenant> {
        let state = self.state.read().await;
        state
            .tenants
            .get(&id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found("tenant", id))
    }

    async fn tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
        let state = self.state.read().await;
        Ok(state
            .tenants
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.tenants.contains_key(&user.tenant_id) {
            return Err(TrackerError::not_found("tenant", user.tenant_id));
        }
        state.email_conflict(&user.email)?;
        state.users.insert(user.id, user);
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        let state = self.state.read().await;
        state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found("user", id))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self, tenant: TenantId) -> Result<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.tenant_id == tenant)
            .cloned()
            .collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users)
    }

    async fn update_user_role(&self, id: UserId, role: Role) -> Result<User> {
        let mut state = self.state.write().await;
        let (tenant, current) = state
            .users
            .get(&id)
            .map(|u| (u.tenant_id, u.role))
            .ok_or_else(|| TrackerError::not_found("user", id))?;
        if current == Role::Admin && role != Role::Admin && state.admin_count(tenant) <= 1 {
            return Err(TrackerError::not_allowed(
                "cannot demote the tenant's last admin",
            ));
        }
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| TrackerError::not_found("user", id))?;
        user.role = role;
        Ok(user.clone())
    }

    async fn insert_task(&self, task: Task) -> Result<()> {
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(TrackerError::Conflict(format!("task {} already exists", task.id)));
        }
        state.tasks.insert(task.id, task);
        Ok(())
    }

    async fn insert_instance(&self, task: Task) -> Result<bool> {
        let mut state = self.state.write().await;
        let duplicate = state.tasks.values().any(|existing| {
            existing.parent_id.is_some()
                && existing.parent_id == task.parent_id
                && existing.occurrence == task.occurrence
        });
        if duplicate {
            return Ok(false);
        }
        state.tasks.insert(task.id, task);
        Ok(true)
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        let state = self.state.read().await;
        state
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found("task", id))
    }

    async fn update_task(&self, task: Task) -> Result<()> {
        let mut state = self.state.write().await;
        match state.tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task;
                Ok(())
            }
            None => Err(TrackerError::not_found("task", task.id)),
        }
    }

    async fn advance_recurrence(
        &self,
        id: TaskId,
        expected: &Recurrence,
        next: Recurrence,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.tasks.get_mut(&id) {
            Some(task) if task.recurrence.as_ref() == Some(expected) => {
                task.recurrence = Some(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_due_soon_notified(
        &self,
        id: TaskId,
        due: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let mut state = self.state.write().await;
        match state.tasks.get_mut(&id) {
            Some(task)
                if !task.due_soon_notified
                    && !task.status.is_terminal()
                    && task.due_date == Some(due) =>
            {
                task.due_soon_notified = true;
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_task(&self, id: TaskId) -> Result<Task> {
        let mut state = self.state.write().await;
        state
            .tasks
            .remove(&id)
            .ok_or_else(|| TrackerError::not_found("task", id))
    }

    async fn list_tasks(&self, tenant: TenantId, filter: &TaskFilter) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        Ok(sorted_tasks(
            state
                .tasks
                .values()
                .filter(|t| t.tenant_id == tenant && filter.matches(t)),
        ))
    }

    async fn instances_of(&self, parent: TaskId) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        let mut instances: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.parent_id == Some(parent))
            .cloned()
            .collect();
        instances.sort_by_key(|t| (t.occurrence, t.id));
        Ok(instances)
    }

    async fn due_templates(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        Ok(sorted_tasks(state.tasks.values().filter(|t| {
            t.recurrence.as_ref().is_some_and(|r| r.is_due(now))
        })))
    }

    async fn due_soon(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        Ok(sorted_tasks(state.tasks.values().filter(|t| {
            !t.is_template()
                && !t.status.is_terminal()
                && !t.due_soon_notified
                && t.due_date.is_some_and(|due| due > now && due <= until)
        })))
    }

    async fn insert_notification(&self, notification: Notification) -> Result<()> {
        let mut state = self.state.write().await;
        state.notifications.insert(notification.id, notification);
        Ok(())
    }

    async fn notifications_for(
        &self,
        user: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let state = self.state.read().await;
        let mut out: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.user_id == user && (!unread_only || !n.read))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn mark_notification_read(
        &self,
        user: UserId,
        id: NotificationId,
    ) -> Result<Notification> {
        let mut state = self.state.write().await;
        match state.notifications.get_mut(&id) {
            Some(n) if n.user_id == user => {
                n.read = true;
                Ok(n.clone())
            }
            _ => Err(TrackerError::not_found("notification", id)),
        }
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let state = self.state.read().await;
        let mut snapshot = Snapshot {
            tenants: state.tenants.values().cloned().collect(),
            users: state.users.values().cloned().collect(),
            tasks: sorted_tasks(state.tasks.values()),
            notifications: state.notifications.values().cloned().collect(),
        };
        snapshot.tenants.sort_by_key(|t| (t.created_at, t.id));
        snapshot.users.sort_by_key(|u| (u.created_at, u.id));
        snapshot.notifications.sort_by_key(|n| (n.created_at, n.id));
        Ok(snapshot)
    }
}

/// A wrapper that adds tracing to a store.
pub struct TracingTaskStore<S: TaskStore> {
    inner: S,
}

impl<S: TaskStore> TracingTaskStore<S> {
    /// Create a new tracing store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: TaskStore> TaskStore for TracingTaskStore<S> {
    async fn create_tenant(&self, tenant: Tenant, founder: User) -> Result<()> {
        tracing::debug!(tenant_id = %tenant.id, name = %tenant.name, founder = %founder.id, "Creating tenant");
        self.inner.create_tenant(tenant, founder).await
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Tenant> {
        self.inner.get_tenant(id).await
    }

    async fn tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
        self.inner.tenant_by_name(name).await
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        tracing::debug!(user_id = %user.id, tenant_id = %user.tenant_id, role = %user.role, "Inserting user");
        self.inner.insert_user(user).await
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        self.inner.get_user(id).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.user_by_email(email).await
    }

    async fn list_users(&self, tenant: TenantId) -> Result<Vec<User>> {
        self.inner.list_users(tenant).await
    }

    async fn update_user_role(&self, id: UserId, role: Role) -> Result<User> {
        tracing::debug!(user_id = %id, role = %role, "Updating user role");
        self.inner.update_user_role(id, role).await
    }

    async fn insert_task(&self, task: Task) -> Result<()> {
        tracing::debug!(task_id = %task.id, tenant_id = %task.tenant_id, template = task.is_template(), "Inserting task");
        self.inner.insert_task(task).await
    }

    async fn insert_instance(&self, task: Task) -> Result<bool> {
        let task_id = task.id;
        let parent = task.parent_id;
        let result = self.inner.insert_instance(task).await;
        if let Ok(inserted) = result {
            tracing::debug!(task_id = %task_id, parent = ?parent, inserted, "Inserting recurring instance");
        }
        result
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.inner.get_task(id).await
    }

    async fn update_task(&self, task: Task) -> Result<()> {
        tracing::trace!(task_id = %task.id, status = %task.status, "Updating task");
        self.inner.update_task(task).await
    }

    async fn advance_recurrence(
        &self,
        id: TaskId,
        expected: &Recurrence,
        next: Recurrence,
    ) -> Result<bool> {
        let next_run = next.next_run;
        let result = self.inner.advance_recurrence(id, expected, next).await;
        if let Ok(advanced) = result {
            tracing::trace!(task_id = %id, next_run = ?next_run, advanced, "Advancing recurrence");
        }
        result
    }

    async fn mark_due_soon_notified(
        &self,
        id: TaskId,
        due: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        self.inner.mark_due_soon_notified(id, due).await
    }

    async fn delete_task(&self, id: TaskId) -> Result<Task> {
        tracing::debug!(task_id = %id, "Deleting task");
        self.inner.delete_task(id).await
    }

    async fn list_tasks(&self, tenant: TenantId, filter: &TaskFilter) -> Result<Vec<Task>> {
        tracing::trace!(tenant_id = %tenant, filter = ?filter, "Listing tasks");
        self.inner.list_tasks(tenant, filter).await
    }

    async fn instances_of(&self, parent: TaskId) -> Result<Vec<Task>> {
        self.inner.instances_of(parent).await
    }

    async fn due_templates(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        self.inner.due_templates(now).await
    }

    async fn due_soon(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Task>> {
        self.inner.due_soon(now, until).await
    }

    async fn insert_notification(&self, notification: Notification) -> Result<()> {
        tracing::trace!(notification_id = %notification.id, user_id = %notification.user_id, "Storing notification");
        self.inner.insert_notification(notification).await
    }

    async fn notifications_for(
        &self,
        user: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        self.inner.notifications_for(user, unread_only).await
    }

    async fn mark_notification_read(
        &self,
        user: UserId,
        id: NotificationId,
    ) -> Result<Notification> {
        self.inner.mark_notification_read(user, id).await
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        self.inner.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::notify::NotificationKind;
    use crate::recurrence::{Frequency, Recurrence};
    use crate::types::TaskPriority;
    use chrono::{TimeDelta, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, day, 8, 0, 0).unwrap()
    }

    fn tenant(name: &str) -> Tenant {
        Tenant {
            id: TenantId::new(),
            name: name.to_string(),
            created_at: at(1),
        }
    }

    fn user(tenant: TenantId, email: &str) -> User {
        User {
            id: UserId::new(),
            tenant_id: tenant,
            email: email.to_string(),
            display_name: "U".to_string(),
            role: Role::Member,
            password_hash: String::new(),
            created_at: at(1),
        }
    }

    fn task(tenant: TenantId, creator: UserId) -> Task {
        Task {
            id: TaskId::new(),
            tenant_id: tenant,
            title: "task".to_string(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            created_by: creator,
            assigned_to: None,
            due_date: None,
            recurrence: None,
            parent_id: None,
            occurrence: None,
            created_at: at(1),
            updated_at: at(1),
            completed_at: None,
            due_soon_notified: false,
        }
    }

    fn founded(name: &str, email: &str) -> (Tenant, User) {
        let t = tenant(name);
        let mut founder = user(t.id, email);
        founder.role = Role::Admin;
        (t, founder)
    }

    #[tokio::test]
    async fn test_tenant_names_are_unique_case_insensitive() {
        let store = InMemoryTaskStore::new();
        let (acme, alice) = founded("Acme", "alice@x.io");
        store.create_tenant(acme, alice).await.unwrap();

        let (dup, bob) = founded("ACME", "bob@x.io");
        let err = store.create_tenant(dup, bob).await.unwrap_err();
        assert!(matches!(err, TrackerError::Conflict(_)));
        assert!(store.tenant_by_name("acme").await.unwrap().is_some());
        assert!(store.user_by_email("bob@x.io").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tenant_not_created_when_founder_email_taken() {
        let store = InMemoryTaskStore::new();
        let (acme, alice) = founded("Acme", "alice@x.io");
        store.create_tenant(acme, alice).await.unwrap();

        let (globex, again) = founded("Globex", "ALICE@x.io");
        let err = store.create_tenant(globex, again).await.unwrap_err();
        assert!(matches!(err, TrackerError::Conflict(_)));
        assert!(store.tenant_by_name("globex").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_demoted() {
        let store = InMemoryTaskStore::new();
        let (acme, alice) = founded("Acme", "alice@x.io");
        let (tid, alice_id) = (acme.id, alice.id);
        store.create_tenant(acme, alice).await.unwrap();

        let err = store.update_user_role(alice_id, Role::Member).await.unwrap_err();
        assert!(matches!(err, TrackerError::NotAllowed { .. }));

        let mut bob = user(tid, "bob@x.io");
        bob.role = Role::Admin;
        let bob_id = bob.id;
        store.insert_user(bob).await.unwrap();
        store.update_user_role(alice_id, Role::Member).await.unwrap();
        let err = store.update_user_role(bob_id, Role::Manager).await.unwrap_err();
        assert!(matches!(err, TrackerError::NotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_user_requires_tenant_and_unique_email() {
        let store = InMemoryTaskStore::new();
        let t = tenant("Acme");
        let tid = t.id;

        let orphan = store.insert_user(user(TenantId::new(), "a@x.io")).await;
        assert!(matches!(orphan, Err(TrackerError::NotFound { .. })));

        store.create_tenant(t, user(tid, "founder@x.io")).await.unwrap();
        store.insert_user(user(tid, "a@x.io")).await.unwrap();
        let dup = store.insert_user(user(tid, "A@X.io")).await;
        assert!(matches!(dup, Err(TrackerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_tasks_is_tenant_scoped_and_filtered() {
        let store = InMemoryTaskStore::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        let alice = UserId::new();
        let mut done = task(t1, alice);
        done.status = TaskStatus::Done;
        store.insert_task(done).await.unwrap();
        store.insert_task(task(t1, alice)).await.unwrap();
        store.insert_task(task(t2, alice)).await.unwrap();

        let all = store.list_tasks(t1, &TaskFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let filter = TaskFilter {
            status: Some(TaskStatus::Todo),
            ..TaskFilter::default()
        };
        assert_eq!(store.list_tasks(t1, &filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_templates_hidden_unless_requested() {
        let store = InMemoryTaskStore::new();
        let t = TenantId::new();
        let mut template = task(t, UserId::new());
        template.recurrence = Some(Recurrence::new(Frequency::Daily, 1, at(1), None).unwrap());
        store.insert_task(template).await.unwrap();

        assert!(store.list_tasks(t, &TaskFilter::default()).await.unwrap().is_empty());
        let filter = TaskFilter {
            include_templates: true,
            ..TaskFilter::default()
        };
        assert_eq!(store.list_tasks(t, &filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_instance_is_idempotent_per_occurrence() {
        let store = InMemoryTaskStore::new();
        let parent = TaskId::new();
        let mut first = task(TenantId::new(), UserId::new());
        first.parent_id = Some(parent);
        first.occurrence = Some(at(2));
        let mut again = first.clone();
        again.id = TaskId::new();

        assert!(store.insert_instance(first).await.unwrap());
        assert!(!store.insert_instance(again).await.unwrap());
        assert_eq!(store.instances_of(parent).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_template_keeps_instances() {
        let store = InMemoryTaskStore::new();
        let t = TenantId::new();
        let template = task(t, UserId::new());
        let template_id = template.id;
        let mut child = task(t, UserId::new());
        child.parent_id = Some(template_id);
        child.occurrence = Some(at(3));
        store.insert_task(template).await.unwrap();
        store.insert_instance(child).await.unwrap();

        store.delete_task(template_id).await.unwrap();
        assert!(store.get_task(template_id).await.is_err());
        assert_eq!(store.instances_of(template_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_due_soon_window() {
        let store = InMemoryTaskStore::new();
        let t = TenantId::new();
        let mut soon = task(t, UserId::new());
        soon.due_date = Some(at(2) + TimeDelta::hours(3));
        let mut later = task(t, UserId::new());
        later.due_date = Some(at(10));
        let mut notified = soon.clone();
        notified.id = TaskId::new();
        notified.due_soon_notified = true;
        let soon_id = soon.id;
        for t in [soon, later, notified] {
            store.insert_task(t).await.unwrap();
        }

        let due = store.due_soon(at(2), at(3)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due.first().map(|t| t.id), Some(soon_id));
    }

    #[tokio::test]
    async fn test_advance_recurrence_only_from_expected_schedule() {
        let store = InMemoryTaskStore::new();
        let mut template = task(TenantId::new(), UserId::new());
        let daily = Recurrence::new(Frequency::Daily, 1, at(1), None).unwrap();
        template.recurrence = Some(daily.clone());
        let id = template.id;
        store.insert_task(template).await.unwrap();

        let mut advanced = daily.clone();
        assert_eq!(advanced.advance(at(2), 10), vec![at(1), at(2)]);
        assert!(store.advance_recurrence(id, &daily, advanced.clone()).await.unwrap());

        // The stored schedule moved on; a second advance from the old one is refused
        assert!(!store.advance_recurrence(id, &daily, daily.clone()).await.unwrap());
        let stored = store.get_task(id).await.unwrap();
        assert_eq!(stored.recurrence, Some(advanced));
        assert!(!store.advance_recurrence(TaskId::new(), &daily, daily.clone()).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_due_soon_keeps_concurrent_edits() {
        let store = InMemoryTaskStore::new();
        let mut t = task(TenantId::new(), UserId::new());
        let due = at(3);
        t.due_date = Some(due);
        let id = t.id;
        store.insert_task(t.clone()).await.unwrap();

        let mut edited = t.clone();
        edited.title = "renamed".to_string();
        store.update_task(edited).await.unwrap();

        let marked = store.mark_due_soon_notified(id, due).await.unwrap().unwrap();
        assert!(marked.due_soon_notified);
        assert_eq!(marked.title, "renamed");
        assert!(store.mark_due_soon_notified(id, due).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_due_soon_skips_done_or_rescheduled() {
        let store = InMemoryTaskStore::new();
        let mut done = task(TenantId::new(), UserId::new());
        done.due_date = Some(at(3));
        done.status = TaskStatus::Done;
        let mut moved = task(TenantId::new(), UserId::new());
        moved.due_date = Some(at(9));
        let (done_id, moved_id) = (done.id, moved.id);
        store.insert_task(done).await.unwrap();
        store.insert_task(moved).await.unwrap();

        assert!(store.mark_due_soon_notified(done_id, at(3)).await.unwrap().is_none());
        assert!(store.mark_due_soon_notified(moved_id, at(3)).await.unwrap().is_none());
        assert!(!store.get_task(moved_id).await.unwrap().due_soon_notified);
    }

    #[tokio::test]
    async fn test_notifications_only_readable_by_recipient() {
        let store = InMemoryTaskStore::new();
        let recipient = UserId::new();
        let n = Notification {
            id: NotificationId::new(),
            user_id: recipient,
            tenant_id: TenantId::new(),
            kind: NotificationKind::TaskAssigned,
            task_id: None,
            message: "hi".to_string(),
            created_at: at(1),
            read: false,
        };
        let id = n.id;
        store.insert_notification(n).await.unwrap();

        assert!(store.mark_notification_read(UserId::new(), id).await.is_err());
        let read = store.mark_notification_read(recipient, id).await.unwrap();
        assert!(read.read);
        assert!(store.notifications_for(recipient, true).await.unwrap().is_empty());
        assert_eq!(store.notifications_for(recipient, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = InMemoryTaskStore::new();
        let t = tenant("Acme");
        let tid = t.id;
        let u = user(tid, "a@x.io");
        let uid = u.id;
        store.create_tenant(t, u).await.unwrap();
        store.insert_task(task(tid, uid)).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        snapshot.save(&path).await.unwrap();

        let loaded = Snapshot::load(&path).await.unwrap();
        assert_eq!(loaded, snapshot);

        let restored = InMemoryTaskStore::from_snapshot(loaded);
        assert_eq!(restored.get_user(uid).await.unwrap().email, "a@x.io");
    }

    #[tokio::test]
    async fn test_snapshot_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Snapshot::load(&dir.path().join("none.json")).await.unwrap();
        assert_eq!(loaded, Snapshot::default());
    }

    #[tokio::test]
    async fn test_tracing_store_delegates() {
        let store = TracingTaskStore::new(InMemoryTaskStore::new());
        let t = tenant("Traced");
        let tid = t.id;
        store.create_tenant(t, user(tid, "t@x.io")).await.unwrap();
        assert_eq!(store.get_tenant(tid).await.unwrap().name, "Traced");
    }
}
