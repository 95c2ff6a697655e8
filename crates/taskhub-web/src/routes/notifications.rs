//! Notification endpoints: GET /api/notifications,
//! POST /api/notifications/{id}/read

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::HeaderMap,
};
use serde::Deserialize;
use taskhub_tracker::{Notification, NotificationId, Permission};

use super::{parse, query_params};
use crate::auth::authenticate;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread: bool,
}

/// GET /api/notifications - The caller's inbox, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: std::result::Result<Query<ListNotificationsQuery>, QueryRejection>,
) -> Result<Json<Vec<Notification>>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    actor.require(Permission::NotificationRead)?;
    let query = query_params(query)?;
    let inbox = state
        .store()
        .notifications_for(actor.user_id, query.unread)
        .await?;
    Ok(Json(inbox))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Notification>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    actor.require(Permission::NotificationRead)?;
    let id: NotificationId = parse(&id)?;
    let notification = state.store().mark_notification_read(actor.user_id, id).await?;
    Ok(Json(notification))
}
