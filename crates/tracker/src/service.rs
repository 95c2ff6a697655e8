//! Task CRUD with permission checks and notifications.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{Result, TrackerError};
use crate::notify::{Notification, NotificationHub, NotificationKind};
use crate::rbac::{Actor, Permission, TaskAction, authorize, authorize_assignment};
use crate::store::{TaskFilter, TaskStore};
use crate::types::{
    Task, TaskDraft, TaskId, TaskPatch, TaskStatus, UserId, validate_description, validate_title,
};

/// Permission-checked task operations.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    hub: NotificationHub,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    /// Create the service.
    pub fn new(store: Arc<dyn TaskStore>, hub: NotificationHub, clock: Arc<dyn Clock>) -> Self {
        Self { store, hub, clock }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Create a task, or a recurring template when the draft carries a
    /// recurrence.
    ///
    /// # Errors
    ///
    /// Requires [`Permission::TaskCreate`], plus [`Permission::TaskAssign`]
    /// to assign someone else and [`Permission::RecurrenceManage`] for
    /// templates.
    pub async fn create(&self, actor: &Actor, draft: TaskDraft) -> Result<Task> {
        actor.require(Permission::TaskCreate)?;
        authorize_assignment(actor, draft.assigned_to)?;
        if draft.recurrence.is_some() {
            actor.require(Permission::RecurrenceManage)?;
        }
        if let Some(assignee) = draft.assigned_to {
            self.check_assignee(actor, assignee).await?;
        }

        let now = self.clock.now();
        let recurrence = draft
            .recurrence
            .map(|pattern| pattern.into_recurrence(now))
            .transpose()?;
        let task = Task {
            id: TaskId::new(),
            tenant_id: actor.tenant_id,
            title: validate_title(&draft.title)?,
            description: validate_description(draft.description.as_deref().unwrap_or_default())?,
            status: TaskStatus::Todo,
            priority: draft.priority.unwrap_or_default(),
            created_by: actor.user_id,
            assigned_to: draft.assigned_to,
            due_date: draft.due_date,
            recurrence,
            parent_id: None,
            occurrence: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            due_soon_notified: false,
        };
        self.store.insert_task(task.clone()).await?;
        tracing::info!(
            task_id = %task.id,
            tenant_id = %task.tenant_id,
            template = task.is_template(),
            "Task created"
        );

        if let Some(assignee) = task.assigned_to.filter(|a| *a != actor.user_id) {
            self.notify_assigned(&task, assignee).await?;
        }
        Ok(task)
    }

    /// Fetch one task.
    ///
    /// # Errors
    ///
    /// Returns not-found for tasks the actor cannot see.
    pub async fn get(&self, actor: &Actor, id: TaskId) -> Result<Task> {
        let task = self.store.get_task(id).await?;
        authorize(actor, TaskAction::Read, &task)?;
        Ok(task)
    }

    /// List tasks in the actor's tenant. Without [`Permission::TaskReadAny`]
    /// only tasks the actor created or is assigned are returned.
    ///
    /// # Errors
    ///
    /// Requires at least [`Permission::TaskReadOwn`].
    pub async fn list(&self, actor: &Actor, mut filter: TaskFilter) -> Result<Vec<Task>> {
        if !actor.can(Permission::TaskReadAny) {
            actor.require(Permission::TaskReadOwn)?;
            filter.involving = Some(actor.user_id);
        }
        self.store.list_tasks(actor.tenant_id, &filter).await
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Requires update rights on the task, [`Permission::TaskAssign`] to
    /// reassign to someone else, and [`Permission::RecurrenceManage`] to
    /// change a schedule.
    pub async fn update(&self, actor: &Actor, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let before = self.store.get_task(id).await?;
        authorize(actor, TaskAction::Update, &before)?;

        let now = self.clock.now();
        let mut task = before.clone();
        if let Some(title) = patch.title {
            task.title = validate_title(&title)?;
        }
        if let Some(description) = patch.description {
            task.description = validate_description(&description)?;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
            task.due_soon_notified = false;
        }
        if let Some(assigned_to) = patch.assigned_to {
            if assigned_to != before.assigned_to {
                authorize_assignment(actor, assigned_to)?;
                if let Some(assignee) = assigned_to {
                    self.check_assignee(actor, assignee).await?;
                }
            }
            task.assigned_to = assigned_to;
        }
        if let Some(pattern) = patch.recurrence {
            if !task.is_template() {
                return Err(TrackerError::validation(
                    "recurrence",
                    "only recurring templates have a schedule",
                ));
            }
            actor.require(Permission::RecurrenceManage)?;
            task.recurrence = Some(pattern.into_recurrence(now)?);
        }
        if let Some(status) = patch.status {
            task.set_status(status, now);
        }
        task.updated_at = now;

        self.store.update_task(task.clone()).await?;
        tracing::info!(task_id = %task.id, actor = %actor.user_id, "Task updated");

        if task.assigned_to != before.assigned_to {
            if let Some(assignee) = task.assigned_to.filter(|a| *a != actor.user_id) {
                self.notify_assigned(&task, assignee).await?;
            }
        }
        if task.status != before.status && task.created_by != actor.user_id {
            let notification = Notification::about(
                &task,
                task.created_by,
                NotificationKind::TaskStatusChanged,
                format!(
                    "'{}' moved from {} to {}",
                    task.title, before.status, task.status
                ),
                now,
            );
            self.hub.publish(notification).await?;
        }
        Ok(task)
    }

    /// Delete a task. Instances of a deleted template are kept.
    ///
    /// # Errors
    ///
    /// Requires delete rights on the task.
    pub async fn delete(&self, actor: &Actor, id: TaskId) -> Result<Task> {
        let task = self.store.get_task(id).await?;
        authorize(actor, TaskAction::Delete, &task)?;
        let removed = self.store.delete_task(id).await?;
        tracing::info!(task_id = %id, actor = %actor.user_id, "Task deleted");
        Ok(removed)
    }

    /// Instances spawned from a template.
    ///
    /// # Errors
    ///
    /// Requires read rights on the template.
    pub async fn instances(&self, actor: &Actor, template: TaskId) -> Result<Vec<Task>> {
        let parent = self.get(actor, template).await?;
        if !parent.is_template() {
            return Err(TrackerError::validation("task_id", "task is not a recurring template"));
        }
        self.store.instances_of(template).await
    }

    async fn check_assignee(&self, actor: &Actor, assignee: UserId) -> Result<()> {
        match self.store.get_user(assignee).await {
            Ok(user) if user.tenant_id == actor.tenant_id => Ok(()),
            _ => Err(TrackerError::validation(
                "assigned_to",
                format!("user {assignee} is not in this tenant"),
            )),
        }
    }

    async fn notify_assigned(&self, task: &Task, assignee: UserId) -> Result<()> {
        let notification = Notification::about(
            task,
            assignee,
            NotificationKind::TaskAssigned,
            format!("You were assigned '{}'", task.title),
            self.clock.now(),
        );
        self.hub.publish(notification).await
    }
}
