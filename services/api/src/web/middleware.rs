//! services/api/src/web/middleware.rs
//!
//! The authentication gate. Resolves the caller's identity from a bearer token
//! on every request; whether a route needs one is decided by the route itself.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use market_chat_core::{AuthError, Identity, TokenCodec};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Pulls the token out of `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the identity carried by the request headers.
///
/// `Ok(None)` means no token was presented at all.
pub fn identify(tokens: &TokenCodec, headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
    match bearer_token(headers) {
        Some(token) => tokens.verify(token).map(Some),
        None => Ok(None),
    }
}

/// Middleware that verifies the bearer token, if any, and binds the identity.
///
/// If valid, inserts the `Identity` into request extensions for handlers to use.
/// If invalid, the request continues without one and any handler that needs an
/// identity rejects it. Nothing is stored between requests.
pub async fn resolve_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match identify(&state.tokens, req.headers()) {
        Ok(Some(identity)) => {
            req.extensions_mut().insert(identity);
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = ?e, path = %req.uri().path(), "Rejected bearer token");
        }
    }

    next.run(req).await
}

/// Extractor for handlers that require an authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or((StatusCode::UNAUTHORIZED, "Authentication required".to_string()))
    }
}
