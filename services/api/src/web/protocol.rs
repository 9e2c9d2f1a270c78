//! services/api/src/web/protocol.rs
//!
//! Wire types shared by the REST endpoints and the WebSocket chat protocol.
//! Field names are camelCase to match the browser client.

use chrono::{DateTime, Utc};
use market_chat_core::{ChatMessage, ChatSubmission};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Chat Message Payloads
//=========================================================================================

/// A persisted chat message as clients see it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    pub id: Uuid,
    pub listing_id: String,
    pub sender: String,
    pub buyer_email: String,
    pub seller_email: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatMessage> for ChatMessageDto {
    fn from(m: &ChatMessage) -> Self {
        Self {
            id: m.id,
            listing_id: m.listing_id.clone(),
            sender: m.sender.clone(),
            buyer_email: m.buyer_email.clone(),
            seller_email: m.seller_email.clone(),
            text: m.body.clone(),
            timestamp: m.timestamp,
        }
    }
}

/// The body of a chat message a client submits.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OutgoingChatMessage {
    pub sender: String,
    pub buyer_email: String,
    pub seller_email: String,
    #[serde(alias = "message")]
    pub text: String,
    /// Ignored when the frame names a destination listing.
    #[serde(alias = "carId")]
    pub listing_id: Option<String>,
    /// Client clocks are not trusted; the server stamps its own time.
    pub timestamp: Option<serde_json::Value>,
}

impl From<OutgoingChatMessage> for ChatSubmission {
    fn from(m: OutgoingChatMessage) -> Self {
        ChatSubmission {
            sender: m.sender,
            buyer_email: m.buyer_email,
            seller_email: m.seller_email,
            body: m.text,
            listing_id: m.listing_id,
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving the caller's own messages for a listing.
    Subscribe {
        #[serde(rename = "listingId")]
        listing_id: String,
    },

    Unsubscribe {
        #[serde(rename = "listingId")]
        listing_id: String,
    },

    /// Submit a chat message addressed to a listing.
    Send {
        #[serde(rename = "listingId")]
        listing_id: String,
        message: OutgoingChatMessage,
    },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { topic: String },

    Unsubscribed { topic: String },

    /// A chat message delivered on one of the client's topics.
    Message {
        topic: String,
        message: ChatMessageDto,
    },

    /// The submitted message could not be stored and was not delivered.
    DeliveryFailed { reason: String },

    /// Reports a protocol error. The connection stays open.
    Error { message: String },
}
