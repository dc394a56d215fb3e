// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication middleware for the gateway.
//!
//! The platform's access-code scheme (school/counsellor codes, role
//! checks) lives in front of this service; the gateway itself only
//! requires a shared bearer token (`Authorization: Bearer <token>`).
//! When no token is configured, all requests are rejected (fail-closed).

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Authentication configuration for the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected bearer token. If `None`, everything is rejected.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl AuthConfig {
    /// Check a presented token against the configured one. Fail-closed:
    /// no configured token means no access.
    pub fn accepts(&self, presented: Option<&str>) -> bool {
        match (&self.bearer_token, presented) {
            (Some(expected), Some(token)) => token == expected,
            _ => false,
        }
    }
}

/// Middleware that validates the bearer token on `/v1` routes.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.bearer_token.is_none() {
        tracing::error!("gateway has no bearer token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if auth.accepts(presented) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_token() {
        let auth = AuthConfig {
            bearer_token: Some("secret-token-long-enough".to_string()),
        };
        assert!(auth.accepts(Some("secret-token-long-enough")));
        assert!(!auth.accepts(Some("wrong")));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn no_configured_token_rejects_everything() {
        let auth = AuthConfig { bearer_token: None };
        assert!(!auth.accepts(Some("anything")));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn debug_redacts_token() {
        let auth = AuthConfig {
            bearer_token: Some("secret-token".to_string()),
        };
        let debug_output = format!("{auth:?}");
        assert!(!debug_output.contains("secret-token"));
        assert!(debug_output.contains("[redacted]"));
    }
}
