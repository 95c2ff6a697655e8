//! User endpoints: GET /api/users/me, GET /api/users, PUT /api/users/{id}/role,
//! GET /api/permissions

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskhub_tracker::rbac::permissions;
use taskhub_tracker::{Permission, Role, TenantId, User, UserId};

use super::{json_body, parse};
use crate::auth::authenticate;
use crate::error::Result;
use crate::state::AppState;

/// A user as exposed over the API; never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub role: Role,
    pub permissions: &'static [Permission],
}

/// GET /api/users/me
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<UserView>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let user = state.accounts.me(&actor).await?;
    Ok(Json(user.into()))
}

/// GET /api/users - Users in the caller's tenant
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserView>>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let users = state.accounts.list_users(&actor).await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

/// PUT /api/users/{id}/role
pub async fn change_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: std::result::Result<Json<RoleChange>, JsonRejection>,
) -> Result<Json<UserView>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    let target: UserId = parse(&id)?;
    let change = json_body(payload)?;
    let user = state.accounts.change_role(&actor, target, change.role).await?;
    Ok(Json(user.into()))
}

/// GET /api/permissions - The caller's role and what it grants
pub async fn my_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PermissionsResponse>> {
    let (actor, _) = authenticate(&state, &headers).await?;
    Ok(Json(PermissionsResponse {
        role: actor.role,
        permissions: permissions(actor.role),
    }))
}
