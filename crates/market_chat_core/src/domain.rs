//! crates/market_chat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the marketplace chat.
//! These structs are independent of any database or wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Trims and lowercases an email read from external input.
///
/// Every boundary that accepts an email runs it through here, so two
/// differently-cased spellings always resolve to the same participant.
pub fn canonical_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The account kinds a token can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Showroom,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Showroom => "SHOWROOM",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "SHOWROOM" => Ok(Role::Showroom),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// The authenticated caller, as resolved from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            email: canonical_email(email),
            role,
        }
    }
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub email: String,
    pub hashed_password: String,
    pub role: Role,
}

/// A validated chat message that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub listing_id: String,
    pub sender: String,
    pub buyer_email: String,
    pub seller_email: String,
    pub body: String,
    /// Server time at routing. A store may stamp the row with its own clock.
    pub timestamp: DateTime<Utc>,
}

/// A persisted chat message. Never mutated after the store hands it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Store-assigned append order, used to break timestamp ties.
    pub sequence: i64,
    pub listing_id: String,
    pub sender: String,
    pub buyer_email: String,
    pub seller_email: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_new(new: NewChatMessage, id: Uuid, sequence: i64) -> Self {
        Self {
            id,
            sequence,
            listing_id: new.listing_id,
            sender: new.sender,
            buyer_email: new.buyer_email,
            seller_email: new.seller_email,
            body: new.body,
            timestamp: new.timestamp,
        }
    }

    /// Ordering key of a thread: server timestamp, then store sequence.
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.timestamp, self.sequence)
    }
}

/// A seller's conversations: listing id -> buyers who wrote about it.
pub type SellerInbox = BTreeMap<String, BTreeSet<String>>;

/// Groups messages into the inbox of `seller_email`.
pub fn inbox_from_messages<'a, I>(seller_email: &str, messages: I) -> SellerInbox
where
    I: IntoIterator<Item = &'a ChatMessage>,
{
    let mut inbox = SellerInbox::new();
    for message in messages {
        if message.seller_email == seller_email {
            inbox
                .entry(message.listing_id.clone())
                .or_default()
                .insert(message.buyer_email.clone());
        }
    }
    inbox
}
