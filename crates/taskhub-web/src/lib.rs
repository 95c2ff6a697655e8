//! Taskhub Web Server
//!
//! JSON REST API over the tracker services, with tower middleware for CORS,
//! tracing, compression, and request size limits.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{AppError, ErrorResponse};
pub use server::{create_app, run_server};
pub use state::AppState;

/// Web server errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderValue),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
