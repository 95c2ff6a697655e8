//! Bearer token authentication.

use axum::http::HeaderMap;
use taskhub_tracker::Actor;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Token taken from the `Authorization: Bearer ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Extract the bearer token from request headers.
    ///
    /// # Errors
    ///
    /// * `AppError::Unauthorized` - If the header is missing, malformed, or empty
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Self(token.to_string()))
            .ok_or_else(|| {
                AppError::Unauthorized("Missing or invalid Authorization header".to_string())
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolve the caller behind the request's bearer token.
///
/// # Errors
///
/// * `AppError::Unauthorized` - If the token is missing, unknown, or expired
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(Actor, BearerToken)> {
    let token = BearerToken::from_headers(headers)?;
    let actor = state.accounts.authenticate(token.as_str()).await?;
    Ok((actor, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_token_parsed() {
        let token = BearerToken::from_headers(&headers("Bearer abc123"));
        assert_eq!(token.ok(), Some(BearerToken("abc123".to_string())));
    }

    #[test]
    fn test_missing_or_wrong_scheme_rejected() {
        assert!(BearerToken::from_headers(&HeaderMap::new()).is_err());
        assert!(BearerToken::from_headers(&headers("Basic abc")).is_err());
        assert!(BearerToken::from_headers(&headers("Bearer ")).is_err());
    }
}
