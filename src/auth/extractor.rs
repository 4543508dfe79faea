//! Request-side authentication for the REST surface.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::error::AppError;
use crate::server::AppState;

use super::Claims;

/// Caller identity resolved from a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn identity(&self) -> &str {
        self.0.identity()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(None, &parts.headers)
            .ok_or_else(|| AppError::Auth("Missing authentication token".to_string()))?;

        let claims = state.jwt_validator.validate(&token).map_err(|e| {
            tracing::warn!(error = %e, "JWT validation failed");
            e
        })?;

        Ok(AuthUser(claims))
    }
}

/// Extract a token from an explicit query value or the Authorization header
pub fn extract_token(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_query_token_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));

        assert_eq!(
            extract_token(Some("query-token"), &headers).as_deref(),
            Some("query-token")
        );
        assert_eq!(extract_token(None, &headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn test_non_bearer_header_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));

        assert!(extract_token(None, &headers).is_none());
        assert!(extract_token(None, &HeaderMap::new()).is_none());
    }
}
