//! services/api/src/web/policy.rs
//!
//! Route-level capability checks. Every capability is matched explicitly and
//! anything not granted below is denied.

use axum::http::StatusCode;
use market_chat_core::{Identity, Role};

/// What a handler is about to do on behalf of the caller.
#[derive(Debug, Clone, Copy)]
pub enum Capability<'a> {
    /// Read every conversation about a listing.
    ReadListingHistory,
    /// Read one buyer/seller conversation.
    ReadThread {
        seller_email: &'a str,
        buyer_email: &'a str,
    },
    /// Read a seller's list of conversations.
    ReadInbox { seller_email: &'a str },
}

pub fn is_allowed(identity: &Identity, capability: Capability<'_>) -> bool {
    match (identity.role, capability) {
        (Role::Admin, _) => true,
        // Spans every buyer/seller pair of the listing, so it is a moderation view.
        (Role::Showroom | Role::User, Capability::ReadListingHistory) => false,
        (_, Capability::ReadThread { seller_email, buyer_email }) => {
            identity.email == seller_email || identity.email == buyer_email
        }
        (_, Capability::ReadInbox { seller_email }) => identity.email == seller_email,
    }
}

pub fn authorize(identity: &Identity, capability: Capability<'_>) -> Result<(), (StatusCode, String)> {
    if is_allowed(identity, capability) {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "Not allowed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participants_may_read_their_thread_only() {
        let buyer = Identity::new("b@x.com", Role::User);
        let thread = Capability::ReadThread {
            seller_email: "s@y.com",
            buyer_email: "b@x.com",
        };
        let other = Capability::ReadThread {
            seller_email: "s@y.com",
            buyer_email: "c@x.com",
        };
        assert!(is_allowed(&buyer, thread));
        assert!(!is_allowed(&buyer, other));
    }

    #[test]
    fn listing_history_is_admin_only() {
        assert!(!is_allowed(&Identity::new("b@x.com", Role::User), Capability::ReadListingHistory));
        assert!(!is_allowed(&Identity::new("s@y.com", Role::Showroom), Capability::ReadListingHistory));
        assert!(is_allowed(&Identity::new("a@z.com", Role::Admin), Capability::ReadListingHistory));
    }

    #[test]
    fn inbox_belongs_to_its_seller() {
        let seller = Identity::new("s@y.com", Role::Showroom);
        assert!(is_allowed(&seller, Capability::ReadInbox { seller_email: "s@y.com" }));
        assert!(!is_allowed(&seller, Capability::ReadInbox { seller_email: "t@y.com" }));
    }
}
