//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the chat history endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    auth::{self, LoginRequest, LoginResponse, MeResponse},
    middleware::CurrentUser,
    policy::{authorize, Capability},
    protocol::ChatMessageDto,
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use market_chat_core::{canonical_email, listing_segment, ChatMessage, PortError, SellerInbox};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::me_handler,
        listing_history_handler,
        thread_history_handler,
        seller_inbox_handler,
    ),
    components(
        schemas(LoginRequest, LoginResponse, MeResponse, ChatMessageDto)
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Marketplace Chat API", description = "Listing chat history and bearer-token authentication.")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Query Parameters
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ThreadQuery {
    pub listing_id: String,
    pub seller_email: String,
    pub buyer_email: String,
}

fn history_failed(e: PortError) -> (StatusCode, String) {
    error!("Failed to fetch chat history: {:?}", e);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Failed to fetch chat history".to_string(),
    )
}

fn listing_id_or_reject(raw: &str) -> Result<&str, (StatusCode, String)> {
    listing_segment(raw).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid listing id: {:?}", raw.trim()),
        )
    })
}

fn to_dtos(messages: &[ChatMessage]) -> Vec<ChatMessageDto> {
    messages.iter().map(ChatMessageDto::from).collect()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Full history of a listing across every buyer/seller pair. Admins only.
#[utoipa::path(
    get,
    path = "/api/chat/listings/{listing_id}",
    params(("listing_id" = String, Path, description = "The listing whose chats to load.")),
    responses(
        (status = 200, description = "Messages in timestamp order", body = [ChatMessageDto]),
        (status = 400, description = "Invalid listing id"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller is not an admin"),
        (status = 503, description = "History store unavailable")
    ),
    security(("bearer" = []))
)]
pub async fn listing_history_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(listing_id): Path<String>,
) -> Result<Json<Vec<ChatMessageDto>>, (StatusCode, String)> {
    authorize(&identity, Capability::ReadListingHistory)?;
    let listing_id = listing_id_or_reject(&listing_id)?;

    let messages = state
        .store
        .list_by_listing(listing_id)
        .await
        .map_err(history_failed)?;
    Ok(Json(to_dtos(&messages)))
}

/// History of one buyer/seller conversation about a listing.
#[utoipa::path(
    get,
    path = "/api/chat/thread",
    params(ThreadQuery),
    responses(
        (status = 200, description = "Messages in timestamp order", body = [ChatMessageDto]),
        (status = 400, description = "Invalid listing id"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller is not part of this conversation"),
        (status = 503, description = "History store unavailable")
    ),
    security(("bearer" = []))
)]
pub async fn thread_history_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<Vec<ChatMessageDto>>, (StatusCode, String)> {
    let seller_email = canonical_email(&query.seller_email);
    let buyer_email = canonical_email(&query.buyer_email);
    authorize(
        &identity,
        Capability::ReadThread {
            seller_email: &seller_email,
            buyer_email: &buyer_email,
        },
    )?;
    let listing_id = listing_id_or_reject(&query.listing_id)?;

    let messages = state
        .store
        .list_by_thread(listing_id, &seller_email, &buyer_email)
        .await
        .map_err(history_failed)?;
    Ok(Json(to_dtos(&messages)))
}

/// Listings a seller has conversations on, with the buyers of each.
#[utoipa::path(
    get,
    path = "/api/chat/seller/{seller_email}/inbox",
    params(("seller_email" = String, Path, description = "The seller's email.")),
    responses(
        (status = 200, description = "Map of listing id to buyer emails", body = std::collections::BTreeMap<String, Vec<String>>),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller is not this seller"),
        (status = 503, description = "History store unavailable")
    ),
    security(("bearer" = []))
)]
pub async fn seller_inbox_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(seller_email): Path<String>,
) -> Result<Json<SellerInbox>, (StatusCode, String)> {
    let seller_email = canonical_email(&seller_email);
    authorize(
        &identity,
        Capability::ReadInbox {
            seller_email: &seller_email,
        },
    )?;

    let inbox = state
        .store
        .inbox_for(&seller_email)
        .await
        .map_err(history_failed)?;
    Ok(Json(inbox))
}
