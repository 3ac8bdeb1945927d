//! Bearer-token authentication and per-actor rate limiting.
//!
//! Tokens are HS256 JWTs whose `sub` is the numeric user id. The subject is
//! resolved through the user directory so that role and specializations
//! always come from the directory, never from the token.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::response::{error_codes, reject};
use super::state::AppState;
use crate::core_types::{Actor, UserId};
use crate::error::CoreError;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id as a decimal string
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct JwtAuth {
    secret: String,
}

impl JwtAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issue a token for `user`. Used by the dev tooling and tests; real
    /// tokens come from the identity service sharing the secret.
    pub fn issue(&self, user: UserId, ttl: Duration) -> Result<String, CoreError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.to_string(),
            exp: (now + ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| CoreError::validation(format!("Failed to issue token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);
        Ok(decode::<Claims>(token, &key, &validation)?.claims)
    }
}

/// Bearer header first; browsers opening a WebSocket pass `?token=` instead.
fn extract_token(request: &Request<Body>) -> Option<&str> {
    if let Some(value) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        return value.strip_prefix("Bearer ");
    }
    request
        .uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(&request) else {
        return reject(
            StatusCode::UNAUTHORIZED,
            error_codes::MISSING_AUTH,
            "Missing bearer token",
        );
    };

    let claims = match state.jwt.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Token rejected");
            return reject(
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "Invalid or expired token",
            );
        }
    };
    let Ok(user_id) = claims.sub.parse::<u64>().map(UserId) else {
        return reject(
            StatusCode::UNAUTHORIZED,
            error_codes::AUTH_FAILED,
            "Invalid token subject",
        );
    };

    let actor: Actor = match state.directory.resolve(user_id).await {
        Ok(Some(profile)) => profile.to_actor(),
        Ok(None) => {
            tracing::warn!(user_id = %user_id, "Token subject not in directory");
            return reject(
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "Unknown user",
            );
        }
        Err(e) => return axum::response::IntoResponse::into_response(e),
    };

    request.extensions_mut().insert(actor);
    next.run(request).await
}

/// Runs after `jwt_auth_middleware`; keyed by the authenticated user.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(actor) = request.extensions().get::<Actor>() else {
        return reject(
            StatusCode::UNAUTHORIZED,
            error_codes::MISSING_AUTH,
            "Missing bearer token",
        );
    };
    let key = format!("user:{}", actor.id);
    if !state.limiter.check(&key) {
        tracing::warn!(user_id = %actor.id, "Rate limit exceeded");
        return reject(
            StatusCode::TOO_MANY_REQUESTS,
            error_codes::RATE_LIMITED,
            "Too many requests",
        );
    }
    next.run(request).await
}
