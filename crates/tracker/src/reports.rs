//! Role-scoped task statistics.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::rbac::{Actor, Permission};
use crate::store::{TaskFilter, TaskStore};
use crate::types::{Task, TaskPriority, TaskStatus, UserId};

/// Which tasks a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportScope {
    /// Tasks the actor created or is assigned.
    #[default]
    Own,
    /// Every task in the actor's tenant.
    Tenant,
}

impl FromStr for ReportScope {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "own" => Ok(Self::Own),
            "tenant" => Ok(Self::Tenant),
            other => Err(TrackerError::validation(
                "scope",
                format!("unknown scope '{other}'"),
            )),
        }
    }
}

/// Task counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub cancelled: usize,
}

/// Task counts per priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub urgent: usize,
}

/// Per-assignee breakdown. `assignee` is `None` for unassigned tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeStats {
    pub assignee: Option<UserId>,
    pub total: usize,
    pub done: usize,
    pub overdue: usize,
}

/// Aggregated view over a set of concrete tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub scope: ReportScope,
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_priority: PriorityCounts,
    pub overdue: usize,
    /// done / (total - cancelled); 0.0 when nothing is countable.
    pub completion_rate: f64,
    pub by_assignee: Vec<AssigneeStats>,
    pub generated_at: DateTime<Utc>,
}

impl TaskReport {
    /// Aggregate `tasks`. Templates are skipped.
    #[must_use]
    pub fn from_tasks(scope: ReportScope, tasks: &[Task], now: DateTime<Utc>) -> Self {
        let concrete: Vec<&Task> = tasks.iter().filter(|t| !t.is_template()).collect();

        let mut by_status = StatusCounts::default();
        let mut by_priority = PriorityCounts::default();
        for task in &concrete {
            let slot = match task.status {
                TaskStatus::Todo => &mut by_status.todo,
                TaskStatus::InProgress => &mut by_status.in_progress,
                TaskStatus::Done => &mut by_status.done,
                TaskStatus::Cancelled => &mut by_status.cancelled,
            };
            *slot = slot.saturating_add(1);
            let slot = match task.priority {
                TaskPriority::Low => &mut by_priority.low,
                TaskPriority::Medium => &mut by_priority.medium,
                TaskPriority::High => &mut by_priority.high,
                TaskPriority::Urgent => &mut by_priority.urgent,
            };
            *slot = slot.saturating_add(1);
        }

        let overdue = concrete.iter().filter(|t| t.is_overdue(now)).count();
        let countable = concrete.len().saturating_sub(by_status.cancelled);
        #[allow(clippy::cast_precision_loss)]
        let completion_rate = if countable == 0 {
            0.0
        } else {
            by_status.done as f64 / countable as f64
        };

        let grouped: HashMap<Option<UserId>, Vec<&Task>> =
            concrete.iter().copied().into_group_map_by(|t| t.assigned_to);
        let by_assignee = grouped
            .into_iter()
            .map(|(assignee, tasks)| AssigneeStats {
                assignee,
                total: tasks.len(),
                done: tasks.iter().filter(|t| t.status == TaskStatus::Done).count(),
                overdue: tasks.iter().filter(|t| t.is_overdue(now)).count(),
            })
            .sorted_by(|a, b| b.total.cmp(&a.total).then(a.assignee.cmp(&b.assignee)))
            .collect();

        Self {
            scope,
            total: concrete.len(),
            by_status,
            by_priority,
            overdue,
            completion_rate,
            by_assignee,
            generated_at: now,
        }
    }
}

/// Build a report for `actor`.
///
/// # Errors
///
/// [`ReportScope::Tenant`] requires [`Permission::ReportViewTenant`];
/// [`ReportScope::Own`] requires [`Permission::ReportViewOwn`].
pub async fn build_report(
    store: &dyn TaskStore,
    actor: &Actor,
    scope: ReportScope,
    now: DateTime<Utc>,
) -> Result<TaskReport> {
    let filter = match scope {
        ReportScope::Tenant => {
            actor.require(Permission::ReportViewTenant)?;
            TaskFilter::default()
        }
        ReportScope::Own => {
            actor.require(Permission::ReportViewOwn)?;
            TaskFilter {
                involving: Some(actor.user_id),
                ..TaskFilter::default()
            }
        }
    };
    let tasks = store.list_tasks(actor.tenant_id, &filter).await?;
    tracing::debug!(actor = %actor.user_id, scope = ?scope, tasks = tasks.len(), "Building report");
    Ok(TaskReport::from_tasks(scope, &tasks, now))
}
