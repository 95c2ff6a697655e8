//! REST API routes
//!
//! All routes are mounted under `/api`.
//!
//! ## Route Structure
//!
//! - `GET /api/health` - Liveness check
//! - `POST /api/auth/register`, `POST /api/auth/login`, `POST /api/auth/logout`
//! - `GET /api/users/me`, `GET /api/users`, `PUT /api/users/{id}/role`
//! - `POST /api/tasks`, `GET /api/tasks`
//! - `GET|PATCH|DELETE /api/tasks/{id}`, `GET /api/tasks/{id}/instances`
//! - `GET /api/notifications`, `POST /api/notifications/{id}/read`
//! - `GET /api/reports/tasks`
//! - `GET /api/permissions`
//!
//! Every route except health, register, and login requires a bearer token.

use std::str::FromStr;

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::Query,
    http::StatusCode,
    routing::{get, post, put},
};
use taskhub_tracker::TrackerError;

use crate::error::{AppError, Result};
use crate::state::AppState;

pub mod accounts;
pub mod health;
pub mod notifications;
pub mod reports;
pub mod tasks;
pub mod users;

/// Create the API router; the caller supplies state and middleware.
pub fn create_router() -> Router<AppState> {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        // Accounts
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/logout", post(accounts::logout))
        // Users
        .route("/users", get(users::list_users))
        .route("/users/me", get(users::me))
        .route("/users/{id}/role", put(users::change_role))
        .route("/permissions", get(users::my_permissions))
        // Tasks
        .route("/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route(
            "/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/{id}/instances", get(tasks::list_instances))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        // Reports
        .route("/reports/tasks", get(reports::task_report));

    Router::new().nest("/api", api_routes)
}

/// Unwrap a JSON body, turning axum's rejection into a problem response.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    })
}

/// Unwrap query parameters, turning axum's rejection into a problem response.
fn query_params<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Parse a path or query segment.
fn parse<T>(raw: &str) -> Result<T>
where
    T: FromStr<Err = TrackerError>,
{
    raw.parse::<T>().map_err(AppError::from)
}
