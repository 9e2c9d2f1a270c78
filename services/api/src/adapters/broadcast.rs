//! services/api/src/adapters/broadcast.rs
//!
//! In-process topic hub: the `ChatPublisher` behind live WebSocket delivery.

use async_trait::async_trait;
use market_chat_core::domain::ChatMessage;
use market_chat_core::ports::{ChatPublisher, PortResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const TOPIC_CAPACITY: usize = 256;

/// One broadcast channel per topic name, created on first subscription.
#[derive(Default)]
pub struct TopicHub {
    topics: RwLock<HashMap<String, broadcast::Sender<Arc<ChatMessage>>>>,
}

impl TopicHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<Arc<ChatMessage>> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Forgets `topic` once its last receiver is gone. Called when a
    /// subscription ends so idle topics do not pile up.
    pub async fn release(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        if topics.get(topic).is_some_and(|s| s.receiver_count() == 0) {
            topics.remove(topic);
            debug!(topic, "Pruned idle topic");
        }
    }

    #[cfg(test)]
    pub(crate) async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}

#[async_trait]
impl ChatPublisher for TopicHub {
    async fn publish(&self, topic: &str, message: Arc<ChatMessage>) -> PortResult<()> {
        let sender = {
            let topics = self.topics.read().await;
            topics.get(topic).cloned()
        };

        let Some(sender) = sender else {
            debug!(topic, "No listeners for topic");
            return Ok(());
        };

        if sender.send(message).is_err() {
            // Every receiver is gone; forget the topic until someone subscribes again.
            self.release(topic).await;
        }
        Ok(())
    }
}
