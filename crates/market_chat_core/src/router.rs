//! crates/market_chat_core/src/router.rs
//!
//! Takes a client-submitted chat message through validation, persistence and
//! fan-out to the two participant topics of its listing.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::domain::{canonical_email, ChatMessage, NewChatMessage};
use crate::ports::{ChatHistoryStore, ChatPublisher, PortError};
use crate::topic::{listing_segment, participant_topic};

/// A chat message as the client submitted it. Nothing in here is trusted.
#[derive(Debug, Clone, Default)]
pub struct ChatSubmission {
    pub sender: String,
    pub buyer_email: String,
    pub seller_email: String,
    pub body: String,
    /// Listing id from the message body; the routing destination overrides it.
    pub listing_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatValidationError {
    #[error("Missing participant: buyer, seller and sender are all required")]
    MissingParticipant,
    #[error("Buyer and seller must be different participants")]
    SameParticipant,
    #[error("Sender {0} is neither the buyer nor the seller")]
    SenderNotParticipant(String),
    #[error("Invalid listing id: {0:?}")]
    InvalidListing(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The message was dropped before it reached the store.
    #[error("Chat message rejected: {0}")]
    Rejected(#[from] ChatValidationError),
    /// The store refused the write; nothing was published.
    #[error("Chat message not persisted: {0}")]
    Store(#[from] PortError),
}

/// The result of a message that made it into the store.
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    pub message: Arc<ChatMessage>,
    pub topics: [String; 2],
    /// Topics whose publish failed. Persistence is not rolled back for these.
    pub failed_topics: Vec<String>,
}

/// Builds the validated form of a submission addressed to `destination`.
pub fn validate_submission(
    destination: &str,
    submission: ChatSubmission,
    now: DateTime<Utc>,
) -> Result<NewChatMessage, ChatValidationError> {
    let sender = canonical_email(&submission.sender);
    let buyer_email = canonical_email(&submission.buyer_email);
    let seller_email = canonical_email(&submission.seller_email);

    if sender.is_empty() || buyer_email.is_empty() || seller_email.is_empty() {
        return Err(ChatValidationError::MissingParticipant);
    }
    if buyer_email == seller_email {
        return Err(ChatValidationError::SameParticipant);
    }
    if sender != buyer_email && sender != seller_email {
        return Err(ChatValidationError::SenderNotParticipant(sender));
    }

    let raw_listing = match destination.trim() {
        "" => submission.listing_id.unwrap_or_default(),
        dest => dest.to_string(),
    };
    let listing_id = listing_segment(&raw_listing)
        .ok_or_else(|| ChatValidationError::InvalidListing(raw_listing.trim().to_string()))?
        .to_string();

    Ok(NewChatMessage {
        listing_id,
        sender,
        buyer_email,
        seller_email,
        body: submission.body,
        timestamp: now,
    })
}

/// Routes chat messages: validate, persist, then publish to both participants.
#[derive(Clone)]
pub struct ChatTopicRouter {
    store: Arc<dyn ChatHistoryStore>,
    publisher: Arc<dyn ChatPublisher>,
}

impl ChatTopicRouter {
    pub fn new(store: Arc<dyn ChatHistoryStore>, publisher: Arc<dyn ChatPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn route(
        &self,
        destination: &str,
        submission: ChatSubmission,
    ) -> Result<RoutedMessage, RouteError> {
        let validated = validate_submission(destination, submission, Utc::now()).map_err(|e| {
            warn!(destination, error = %e, "Dropping invalid chat message");
            e
        })?;

        // The write must be durable before anyone sees the message live.
        let stored = self.store.append(validated).await.map_err(|e| {
            error!(destination, error = %e, "Failed to persist chat message");
            e
        })?;
        let message = Arc::new(stored);

        let topics = [
            participant_topic(&message.listing_id, &message.seller_email),
            participant_topic(&message.listing_id, &message.buyer_email),
        ];

        let mut failed_topics = Vec::new();
        for topic in &topics {
            if let Err(e) = self.publisher.publish(topic, message.clone()).await {
                warn!(topic = %topic, message_id = %message.id, error = %e, "Failed to publish chat message");
                failed_topics.push(topic.clone());
            }
        }

        debug!(
            message_id = %message.id,
            listing_id = %message.listing_id,
            "Chat message routed"
        );

        Ok(RoutedMessage {
            message,
            topics,
            failed_topics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{inbox_from_messages, SellerInbox};
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct VecStore {
        messages: Mutex<Vec<ChatMessage>>,
        unavailable: bool,
    }

    #[async_trait]
    impl ChatHistoryStore for VecStore {
        async fn append(&self, message: NewChatMessage) -> PortResult<ChatMessage> {
            if self.unavailable {
                return Err(PortError::Unavailable("down".to_string()));
            }
            let mut messages = self.messages.lock().unwrap();
            let stored = ChatMessage::from_new(message, Uuid::new_v4(), messages.len() as i64 + 1);
            messages.push(stored.clone());
            Ok(stored)
        }

        async fn list_by_listing(&self, listing_id: &str) -> PortResult<Vec<ChatMessage>> {
            let messages = self.messages.lock().unwrap();
            Ok(messages.iter().filter(|m| m.listing_id == listing_id).cloned().collect())
        }

        async fn list_by_thread(
            &self,
            listing_id: &str,
            seller_email: &str,
            buyer_email: &str,
        ) -> PortResult<Vec<ChatMessage>> {
            let messages = self.messages.lock().unwrap();
            let mut thread: Vec<ChatMessage> = messages
                .iter()
                .filter(|m| {
                    m.listing_id == listing_id
                        && m.seller_email == seller_email
                        && m.buyer_email == buyer_email
                })
                .cloned()
                .collect();
            thread.sort_by_key(|m| m.order_key());
            Ok(thread)
        }

        async fn inbox_for(&self, seller_email: &str) -> PortResult<SellerInbox> {
            let messages = self.messages.lock().unwrap();
            Ok(inbox_from_messages(seller_email, messages.iter()))
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, Uuid)>>,
        failing_topic: Option<String>,
    }

    #[async_trait]
    impl ChatPublisher for RecordingPublisher {
        async fn publish(&self, topic: &str, message: Arc<ChatMessage>) -> PortResult<()> {
            if self.failing_topic.as_deref() == Some(topic) {
                return Err(PortError::Unexpected("listener gone".to_string()));
            }
            self.published.lock().unwrap().push((topic.to_string(), message.id));
            Ok(())
        }
    }

    fn submission(sender: &str, buyer: &str, seller: &str, body: &str) -> ChatSubmission {
        ChatSubmission {
            sender: sender.to_string(),
            buyer_email: buyer.to_string(),
            seller_email: seller.to_string(),
            body: body.to_string(),
            listing_id: None,
        }
    }

    #[tokio::test]
    async fn valid_message_is_stored_and_sent_to_both_participants() {
        let store = Arc::new(VecStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let router = ChatTopicRouter::new(store.clone(), publisher.clone());

        let routed = router
            .route("car1", submission("B@X.com", "B@X.com", "s@y.com", "is it still available?"))
            .await
            .unwrap();

        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(
            published,
            vec![
                (participant_topic("car1", "s@y.com"), routed.message.id),
                (participant_topic("car1", "b@x.com"), routed.message.id),
            ]
        );
        assert!(routed.failed_topics.is_empty());

        let thread = store.list_by_thread("car1", "s@y.com", "b@x.com").await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].id, routed.message.id);
        assert_eq!(thread[0].sender, "b@x.com");
        assert_eq!(thread[0].buyer_email, "b@x.com");
    }

    #[tokio::test]
    async fn missing_seller_is_dropped_without_side_effects() {
        let store = Arc::new(VecStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let router = ChatTopicRouter::new(store.clone(), publisher.clone());

        let err = router
            .route("car1", submission("b@x.com", "b@x.com", "  ", "hello"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RouteError::Rejected(ChatValidationError::MissingParticipant)
        ));
        assert!(store.messages.lock().unwrap().is_empty());
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_prevents_fan_out() {
        let store = Arc::new(VecStore {
            unavailable: true,
            ..Default::default()
        });
        let publisher = Arc::new(RecordingPublisher::default());
        let router = ChatTopicRouter::new(store, publisher.clone());

        let err = router
            .route("car1", submission("b@x.com", "b@x.com", "s@y.com", "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, RouteError::Store(PortError::Unavailable(_))));
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_failed_publish_still_attempts_the_other() {
        let store = Arc::new(VecStore::default());
        let publisher = Arc::new(RecordingPublisher {
            failing_topic: Some(participant_topic("car1", "s@y.com")),
            ..Default::default()
        });
        let router = ChatTopicRouter::new(store.clone(), publisher.clone());

        let routed = router
            .route("car1", submission("b@x.com", "b@x.com", "s@y.com", "hello"))
            .await
            .unwrap();

        assert_eq!(routed.failed_topics, vec![participant_topic("car1", "s@y.com")]);
        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(published, vec![(participant_topic("car1", "b@x.com"), routed.message.id)]);
        assert_eq!(store.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resubmission_creates_a_new_message() {
        let store = Arc::new(VecStore::default());
        let router = ChatTopicRouter::new(store.clone(), Arc::new(RecordingPublisher::default()));

        let first = router
            .route("car1", submission("b@x.com", "b@x.com", "s@y.com", "same"))
            .await
            .unwrap();
        let second = router
            .route("car1", submission("b@x.com", "b@x.com", "s@y.com", "same"))
            .await
            .unwrap();

        assert_ne!(first.message.id, second.message.id);
        let thread = store.list_by_thread("car1", "s@y.com", "b@x.com").await.unwrap();
        assert_eq!(
            thread.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![first.message.id, second.message.id]
        );
    }

    #[test]
    fn destination_overrides_body_listing() {
        let mut sub = submission("b@x.com", "b@x.com", "s@y.com", "hi");
        sub.listing_id = Some("spoofed".to_string());
        let validated = validate_submission("car1", sub, Utc::now()).unwrap();
        assert_eq!(validated.listing_id, "car1");
    }

    #[test]
    fn body_listing_is_used_without_a_destination() {
        let mut sub = submission("b@x.com", "b@x.com", "s@y.com", "hi");
        sub.listing_id = Some(" car9 ".to_string());
        let validated = validate_submission("", sub, Utc::now()).unwrap();
        assert_eq!(validated.listing_id, "car9");
    }

    #[test]
    fn participant_rules_are_enforced() {
        let now = Utc::now();
        assert_eq!(
            validate_submission("car1", submission("b@x.com", "b@x.com", "B@x.com", "hi"), now),
            Err(ChatValidationError::SameParticipant)
        );
        assert_eq!(
            validate_submission("car1", submission("eve@z.com", "b@x.com", "s@y.com", "hi"), now),
            Err(ChatValidationError::SenderNotParticipant("eve@z.com".to_string()))
        );
        assert_eq!(
            validate_submission("", submission("b@x.com", "b@x.com", "s@y.com", "hi"), now),
            Err(ChatValidationError::InvalidListing(String::new()))
        );
        assert_eq!(
            validate_submission("a/b", submission("b@x.com", "b@x.com", "s@y.com", "hi"), now),
            Err(ChatValidationError::InvalidListing("a/b".to_string()))
        );
    }
}
