//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: exchange credentials for a bearer token, and
//! report who the current token belongs to.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use chrono::{DateTime, Utc};
use market_chat_core::canonical_email;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::web::{middleware::CurrentUser, state::AppState};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub email: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub email: String,
    pub role: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/login - Exchange email and password for a bearer token
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "User store unavailable")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let invalid = || (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string());

    // 1. Get user by canonical email
    let email = canonical_email(&req.email);
    let creds = state
        .users
        .find_credentials(&email)
        .await
        .map_err(|e| {
            error!("Failed to look up user: {:?}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Failed to look up user".to_string())
        })?
        .ok_or_else(invalid)?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
    })?;

    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(invalid());
    }

    // 3. Issue a token; nothing is stored server-side
    let issued = state.tokens.issue(&creds.email, creds.role).map_err(|e| {
        error!("Failed to issue token: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue token".to_string())
    })?;

    info!("Issued token for {}", creds.email);
    Ok(Json(LoginResponse {
        token: issued.token,
        email: creds.email,
        role: creds.role.to_string(),
        expires_at: issued.expires_at,
    }))
}

/// GET /api/auth/me - The identity bound to the presented token
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current identity", body = MeResponse),
        (status = 401, description = "Missing, malformed or expired token")
    ),
    security(("bearer" = []))
)]
pub async fn me_handler(CurrentUser(identity): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        email: identity.email,
        role: identity.role.to_string(),
    })
}
