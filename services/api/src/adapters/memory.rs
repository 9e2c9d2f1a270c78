//! services/api/src/adapters/memory.rs
//!
//! Process-local implementations of the storage ports, used when no database is
//! configured and by the test suites. Not shared between processes.

use async_trait::async_trait;
use market_chat_core::domain::{
    canonical_email, inbox_from_messages, ChatMessage, NewChatMessage, SellerInbox,
    UserCredentials,
};
use market_chat_core::ports::{ChatHistoryStore, PortResult, UserDirectory};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Log {
    messages: Vec<ChatMessage>,
    next_sequence: i64,
}

/// An append-only in-memory chat log.
#[derive(Default)]
pub struct InMemoryChatStore {
    log: RwLock<Log>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select<F>(&self, keep: F) -> Vec<ChatMessage>
    where
        F: Fn(&ChatMessage) -> bool,
    {
        let log = self.log.read().await;
        let mut selected: Vec<ChatMessage> =
            log.messages.iter().filter(|m| keep(m)).cloned().collect();
        selected.sort_by_key(|m| m.order_key());
        selected
    }
}

#[async_trait]
impl ChatHistoryStore for InMemoryChatStore {
    async fn append(&self, mut message: NewChatMessage) -> PortResult<ChatMessage> {
        let mut log = self.log.write().await;
        // Keep timestamps monotonic with the append order.
        if let Some(last) = log.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        log.next_sequence += 1;
        let stored = ChatMessage::from_new(message, Uuid::new_v4(), log.next_sequence);
        log.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_by_listing(&self, listing_id: &str) -> PortResult<Vec<ChatMessage>> {
        Ok(self.select(|m| m.listing_id == listing_id).await)
    }

    async fn list_by_thread(
        &self,
        listing_id: &str,
        seller_email: &str,
        buyer_email: &str,
    ) -> PortResult<Vec<ChatMessage>> {
        Ok(self
            .select(|m| {
                m.listing_id == listing_id
                    && m.seller_email == seller_email
                    && m.buyer_email == buyer_email
            })
            .await)
    }

    async fn inbox_for(&self, seller_email: &str) -> PortResult<SellerInbox> {
        let log = self.log.read().await;
        Ok(inbox_from_messages(seller_email, log.messages.iter()))
    }
}

/// A fixed set of accounts keyed by canonical email.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: HashMap<String, UserCredentials>,
}

impl InMemoryUserDirectory {
    pub fn new(users: impl IntoIterator<Item = UserCredentials>) -> Self {
        let users = users
            .into_iter()
            .map(|mut creds| {
                creds.email = canonical_email(&creds.email);
                (creds.email.clone(), creds)
            })
            .collect();
        Self { users }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_credentials(&self, email: &str) -> PortResult<Option<UserCredentials>> {
        Ok(self.users.get(email).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn new_message(listing: &str, buyer: &str, seller: &str, body: &str) -> NewChatMessage {
        NewChatMessage {
            listing_id: listing.to_string(),
            sender: buyer.to_string(),
            buyer_email: buyer.to_string(),
            seller_email: seller.to_string(),
            body: body.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequence_and_unique_ids() {
        let store = InMemoryChatStore::new();
        let a = store.append(new_message("car1", "b@x.com", "s@y.com", "a")).await.unwrap();
        let b = store.append(new_message("car1", "b@x.com", "s@y.com", "b")).await.unwrap();
        assert!(b.sequence > a.sequence);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn thread_ordering_survives_a_clock_going_backwards() {
        let store = InMemoryChatStore::new();
        let first = store.append(new_message("car1", "b@x.com", "s@y.com", "first")).await.unwrap();
        let mut late = new_message("car1", "b@x.com", "s@y.com", "second");
        late.timestamp = first.timestamp - Duration::seconds(30);
        store.append(late).await.unwrap();

        let thread = store.list_by_thread("car1", "s@y.com", "b@x.com").await.unwrap();
        let bodies: Vec<&str> = thread.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn listing_history_spans_buyers_but_threads_do_not() {
        let store = InMemoryChatStore::new();
        store.append(new_message("car1", "b1@x.com", "s@y.com", "from b1")).await.unwrap();
        store.append(new_message("car1", "b2@x.com", "s@y.com", "from b2")).await.unwrap();
        store.append(new_message("car2", "b1@x.com", "s@y.com", "other car")).await.unwrap();

        assert_eq!(store.list_by_listing("car1").await.unwrap().len(), 2);
        let thread = store.list_by_thread("car1", "s@y.com", "b2@x.com").await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].body, "from b2");
    }

    #[tokio::test]
    async fn inbox_groups_buyers_by_listing() {
        let store = InMemoryChatStore::new();
        store.append(new_message("car1", "b1", "s@y.com", "hi")).await.unwrap();
        store.append(new_message("car2", "b2", "s@y.com", "hi")).await.unwrap();
        store.append(new_message("car3", "b3", "other@y.com", "hi")).await.unwrap();

        let inbox = store.inbox_for("s@y.com").await.unwrap();
        let mut expected = SellerInbox::new();
        expected.entry("car1".to_string()).or_default().insert("b1".to_string());
        expected.entry("car2".to_string()).or_default().insert("b2".to_string());
        assert_eq!(inbox, expected);
    }
}
