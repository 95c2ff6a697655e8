//! Account endpoints: POST /api/auth/register, POST /api/auth/login,
//! POST /api/auth/logout

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use taskhub_tracker::{LoginRequest, RegisterRequest};

use super::json_body;
use super::users::UserView;
use crate::auth::BearerToken;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

/// POST /api/auth/register - Create a user, and its tenant if new
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>)> {
    let request = json_body(payload)?;
    let user = state.accounts.register(request).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// POST /api/auth/login - Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let request = json_body(payload)?;
    let (session, user) = state.accounts.login(request).await?;
    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user: user.into(),
    }))
}

/// POST /api/auth/logout - Revoke the presented token
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    let token = BearerToken::from_headers(&headers)?;
    state.accounts.logout(token.as_str()).await?;
    Ok(StatusCode::NO_CONTENT)
}
