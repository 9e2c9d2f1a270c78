//! crates/market_chat_core/src/topic.rs
//!
//! Names of the per-participant delivery channels of a listing conversation.

use crate::domain::canonical_email;

const TOPIC_PREFIX: &str = "chat";

/// Makes an email usable as a single topic segment.
///
/// ASCII letters, digits, `-` and `@` are kept; every other byte (including
/// `.`, `_` and `/`) becomes `_` followed by two lowercase hex digits. The
/// escape is prefix-free, so distinct emails never share a segment.
pub fn sanitize_email(email: &str) -> String {
    let email = canonical_email(email);
    let mut out = String::with_capacity(email.len() + 8);
    for byte in email.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' | b'@' => out.push(byte as char),
            _ => out.push_str(&format!("_{:02x}", byte)),
        }
    }
    out
}

/// Normalizes a listing id for use as a topic segment and store key.
///
/// Returns `None` when nothing is left after trimming or the id contains `/`.
pub fn listing_segment(raw: &str) -> Option<&str> {
    let listing_id = raw.trim();
    if listing_id.is_empty() || listing_id.contains('/') {
        None
    } else {
        Some(listing_id)
    }
}

/// The topic a participant listens on for one listing.
pub fn participant_topic(listing_id: &str, email: &str) -> String {
    format!("{}/{}/{}", TOPIC_PREFIX, listing_id, sanitize_email(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dots_are_escaped() {
        assert_eq!(sanitize_email("b@x.com"), "b@x_2ecom");
        assert_eq!(participant_topic("car1", "B@X.com"), "chat/car1/b@x_2ecom");
    }

    #[test]
    fn distinct_emails_get_distinct_segments() {
        let emails = ["a.b@x.com", "a_b@x.com", "a_2eb@x.com", "ab@x.com", "a/b@x.com"];
        let mut segments: Vec<String> = emails.iter().map(|e| sanitize_email(e)).collect();
        segments.sort();
        segments.dedup();
        assert_eq!(segments.len(), emails.len());
    }

    #[test]
    fn sanitizing_is_case_insensitive() {
        assert_eq!(sanitize_email("S@Y.COM"), sanitize_email("s@y.com"));
    }

    #[test]
    fn listing_segment_trims_and_rejects_separators() {
        assert_eq!(listing_segment("  car1 "), Some("car1"));
        assert_eq!(listing_segment("   "), None);
        assert_eq!(listing_segment("car1/other"), None);
    }
}
