//! Task endpoints: POST/GET /api/tasks, GET/PATCH/DELETE /api/tasks/{id},
//! GET /api/tasks/{id}/instances

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use taskhub_tracker::{Task, TaskDraft, TaskFilter, TaskId, TaskPatch};

use super::{json_body, parse, query_params};
use crate::auth::authenticate;
use crate::error::Result;
use crate::state::AppState;

/// Query parameters for GET /api/tasks
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub overdue: bool,
    #[serde(default)]
    pub templates: bool,
}

impl ListTasksQuery {
    fn into_filter(self, state: &AppState) -> Result<TaskFilter> {
        Ok(TaskFilter {
            status: self.status.as_deref().map(parse).transpose()?,
            assignee: self.assignee.as_deref().map(parse).transpose()?,
            parent: self.parent.as_deref().map(parse).transpose()?,
            overdue_at: self.overdue.then(|| state.clock.now()),
            include_templates: self.templates,
            ..TaskFilter::default()
        })
    }
}

/// POST /api/tasks - Create a task or recurring template
pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<TaskDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>)> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let draft = json_body(payload)?;
    let task = state.tasks.create(&actor, draft).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks - Tasks visible to the caller
pub async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: std::result::Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let filter = query_params(query)?.into_filter(&state)?;
    let tasks = state.tasks.list(&actor, filter).await?;
    Ok(Json(tasks))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Task>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let id: TaskId = parse(&id)?;
    Ok(Json(state.tasks.get(&actor, id).await?))
}

/// PATCH /api/tasks/{id}
pub async fn update_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: std::result::Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let id: TaskId = parse(&id)?;
    let patch = json_body(payload)?;
    Ok(Json(state.tasks.update(&actor, id, patch).await?))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let id: TaskId = parse(&id)?;
    state.tasks.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/tasks/{id}/instances - Instances spawned from a template
pub async fn list_instances(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Task>>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let id: TaskId = parse(&id)?;
    Ok(Json(state.tasks.instances(&actor, id).await?))
}
