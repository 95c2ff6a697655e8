//! Server setup with Tower middleware

use std::future::Future;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
};
use taskhub_core::ServerConfig;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::Error;
use crate::routes;
use crate::state::AppState;

/// Create the application router with middleware.
///
/// # Errors
///
/// Returns an error if the configured CORS origin is not a valid header value.
pub fn create_app(state: AppState, config: &ServerConfig) -> Result<Router, Error> {
    info!("Creating router with CORS origin: {}", config.cors_origin);

    let cors = if config.cors_origin == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(config.cors_origin.parse::<HeaderValue>()?)
    }
    .allow_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ])
    .allow_headers(Any);

    // Body extractors enforce the limit so oversized payloads surface as
    // problem responses instead of a bare 413 from the middleware stack.
    let router = routes::create_router()
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        );

    Ok(router)
}

/// Serve `app` on `bind_address` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_server<F>(app: Router, bind_address: &str, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind_address).await?;
    info!("Taskhub listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Taskhub server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use axum::{body::Body, http::StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use taskhub_core::AuthConfig;
    use taskhub_tracker::{InMemoryTaskStore, NotificationHub, SystemClock};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store = InMemoryTaskStore::new_arc();
        let hub = NotificationHub::new(store.clone());
        AppState::new(store, hub, Arc::new(SystemClock), &AuthConfig::default())
    }

    /// Helper to build a test request with proper error handling.
    fn build_test_request(
        uri: &str,
        method: Option<Method>,
        headers: Vec<(&str, &str)>,
        body: Body,
    ) -> Result<axum::http::Request<Body>, axum::http::Error> {
        let mut builder = axum::http::Request::builder();
        if let Some(m) = method {
            builder = builder.method(m);
        }
        builder = builder.uri(uri);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        builder.body(body)
    }

    #[test]
    fn test_create_app_with_invalid_origin() {
        let config = ServerConfig {
            cors_origin: "invalid\0origin".to_string(),
            ..ServerConfig::default()
        };
        let result = create_app(test_state(), &config);
        assert!(
            matches!(result, Err(Error::InvalidHeader(_))),
            "Expected InvalidHeader error"
        );
    }

    #[tokio::test]
    async fn test_health_check_endpoint() -> Result<(), Box<dyn std::error::Error>> {
        let router = create_app(test_state(), &ServerConfig::default())?;

        let request = build_test_request("/api/health", None, Vec::new(), Body::empty())?;
        let response = router.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = response.into_body().collect().await?.to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes)?;
        assert_eq!(json["status"], "ok");
        assert!(json.get("version").is_some(), "Should have version field");
        Ok(())
    }

    #[tokio::test]
    async fn test_cors_headers_for_configured_origin() -> Result<(), Box<dyn std::error::Error>> {
        let config = ServerConfig {
            cors_origin: "https://tasks.example.com".to_string(),
            ..ServerConfig::default()
        };
        let router = create_app(test_state(), &config)?;

        let request = build_test_request(
            "/api/health",
            Some(Method::OPTIONS),
            vec![
                ("Origin", "https://tasks.example.com"),
                ("Access-Control-Request-Method", "PATCH"),
            ],
            Body::empty(),
        )?;
        let response = router.oneshot(request).await?;

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("https://tasks.example.com")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_router_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let router = create_app(test_state(), &ServerConfig::default())?;

        let request = build_test_request("/nonexistent", None, Vec::new(), Body::empty())?;
        let response = router.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let config = ServerConfig {
            max_body_bytes: 64,
            ..ServerConfig::default()
        };
        let router = create_app(test_state(), &config)?;

        let payload = format!(r#"{{"title":"{}"}}"#, "x".repeat(256));
        let length = payload.len().to_string();
        let request = build_test_request(
            "/api/auth/register",
            Some(Method::POST),
            vec![
                ("content-type", "application/json"),
                ("content-length", length.as_str()),
            ],
            Body::from(payload),
        )?;
        let response = router.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/problem+json")
        );

        let body_bytes = response.into_body().collect().await?.to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes)?;
        assert_eq!(json["status"], 413);
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_body_without_length_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let config = ServerConfig {
            max_body_bytes: 64,
            ..ServerConfig::default()
        };
        let router = create_app(test_state(), &config)?;

        let payload = format!(
            r#"{{"email":"a@example.com","display_name":"{}","password":"longenough","tenant":"acme"}}"#,
            "x".repeat(256)
        );
        let request = build_test_request(
            "/api/auth/register",
            Some(Method::POST),
            vec![("content-type", "application/json")],
            Body::from(payload),
        )?;
        let response = router.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        Ok(())
    }
}
