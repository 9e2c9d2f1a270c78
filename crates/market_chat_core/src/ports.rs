//! crates/market_chat_core/src/ports.rs
//!
//! Defines the service contracts (traits) the chat core depends on.
//! These traits form the boundary of the hexagonal architecture, so the core
//! stays independent of the concrete database and delivery mechanism.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{ChatMessage, NewChatMessage, SellerInbox, UserCredentials};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The backing medium could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable, append-only storage of chat messages.
///
/// Implementations must be safe to call concurrently and must rely on the
/// medium's own atomic append, not on an in-process lock, when the medium is
/// shared between processes. Every listing returns messages ordered by
/// timestamp ascending with ties broken by the store sequence.
#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    /// Persists a message and returns it with its store-assigned id and sequence.
    async fn append(&self, message: NewChatMessage) -> PortResult<ChatMessage>;

    /// Every message about a listing, across all buyer/seller pairs.
    async fn list_by_listing(&self, listing_id: &str) -> PortResult<Vec<ChatMessage>>;

    /// The conversation between one seller and one buyer about a listing.
    async fn list_by_thread(
        &self,
        listing_id: &str,
        seller_email: &str,
        buyer_email: &str,
    ) -> PortResult<Vec<ChatMessage>>;

    /// Listings and buyers a seller has conversations with.
    async fn inbox_for(&self, seller_email: &str) -> PortResult<SellerInbox>;
}

/// Best-effort real-time delivery of a persisted message to a named topic.
#[async_trait]
pub trait ChatPublisher: Send + Sync {
    async fn publish(&self, topic: &str, message: Arc<ChatMessage>) -> PortResult<()>;
}

/// Read-only access to account credentials, owned by the account service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks up credentials by canonical email; `None` when no account exists.
    async fn find_credentials(&self, email: &str) -> PortResult<Option<UserCredentials>>;
}
