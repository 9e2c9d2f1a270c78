//! services/api/src/app.rs
//!
//! Builds the axum router shared by the server binary and the integration tests.

use crate::web::{
    login_handler, me_handler, listing_history_handler, resolve_identity,
    seller_inbox_handler, state::AppState, thread_history_handler, ws_handler,
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}

/// The API routes with authentication and CORS applied.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    // Allow-list: no identity is resolved for these.
    let public_routes = Router::new().route("/api/auth/login", post(login_handler));

    // Everything else passes the authentication gate; each handler decides
    // whether it needs an identity.
    let gated_routes = Router::new()
        .route("/api/auth/me", get(me_handler))
        .route("/api/chat/listings/{listing_id}", get(listing_history_handler))
        .route("/api/chat/thread", get(thread_history_handler))
        .route(
            "/api/chat/seller/{seller_email}/inbox",
            get(seller_inbox_handler),
        )
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            resolve_identity,
        ));

    Router::new()
        .merge(public_routes)
        .merge(gated_routes)
        .layer(cors_layer(&app_state.config.allowed_origins))
        .with_state(app_state)
}
