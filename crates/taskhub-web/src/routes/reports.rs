//! Report endpoint: GET /api/reports/tasks?scope=own|tenant

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    http::HeaderMap,
};
use serde::Deserialize;
use taskhub_tracker::reports::build_report;
use taskhub_tracker::{ReportScope, TaskReport};

use super::{parse, query_params};
use crate::auth::authenticate;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub scope: Option<String>,
}

/// GET /api/reports/tasks - Defaults to the caller's own tasks
pub async fn task_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: std::result::Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Json<TaskReport>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let scope = query_params(query)?
        .scope
        .as_deref()
        .map(parse::<ReportScope>)
        .transpose()?
        .unwrap_or_default();
    let report = build_report(state.store().as_ref(), &actor, scope, state.clock.now()).await?;
    Ok(Json(report))
}
