//! services/api/src/web/chat_ws.rs
//!
//! The WebSocket chat endpoint. A connection subscribes to the caller's own
//! topics and submits messages, which go through the `ChatTopicRouter`.

use crate::adapters::TopicHub;
use crate::web::{
    middleware::CurrentUser,
    protocol::{ChatMessageDto, ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use market_chat_core::{
    listing_segment, participant_topic, ChatMessage, ChatSubmission, Identity, RouteError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const OUTBOUND_CAPACITY: usize = 64;
const MAX_SUBSCRIPTIONS: usize = 32;

/// The handler for upgrading HTTP requests to WebSocket connections.
///
/// The identity is extracted first so unauthenticated callers get a 401 before
/// any upgrade is attempted.
pub async fn ws_handler(
    CurrentUser(identity): CurrentUser,
    State(app_state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, identity))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, identity: Identity) {
    info!("New chat connection for {}", identity.email);

    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    // A single writer owns the sink; everyone else goes through `outbound`.
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut session = ChatSession::new(app_state, identity, outbound);

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_text(text.as_str()).await,
            Ok(Message::Ping(payload)) => session.push(Message::Pong(payload)).await,
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive failed: {}", e);
                break;
            }
        }
    }

    // --- Cleanup ---
    drop(session);
    writer.abort();
    info!("Chat connection closed.");
}

/// Per-connection state: who is connected and which topics it listens on.
struct ChatSession {
    app_state: Arc<AppState>,
    identity: Identity,
    outbound: mpsc::Sender<Message>,
    subscriptions: HashMap<String, CancellationToken>,
    shutdown: CancellationToken,
}

impl ChatSession {
    fn new(app_state: Arc<AppState>, identity: Identity, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            app_state,
            identity,
            outbound,
            subscriptions: HashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe { listing_id }) => self.subscribe(&listing_id).await,
            Ok(ClientMessage::Unsubscribe { listing_id }) => self.unsubscribe(&listing_id).await,
            Ok(ClientMessage::Send {
                listing_id,
                message,
            }) => {
                let mut submission = ChatSubmission::from(message);
                // The connection's identity is the only trusted sender.
                submission.sender = self.identity.email.clone();
                self.submit(&listing_id, submission).await;
            }
            Err(e) => {
                warn!("Failed to deserialize client message: {}", e);
                self.send(ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                })
                .await;
            }
        }
    }

    async fn subscribe(&mut self, listing_id: &str) {
        let Some(listing_id) = listing_segment(listing_id) else {
            self.send(ServerMessage::Error {
                message: format!("Invalid listing id: {:?}", listing_id.trim()),
            })
            .await;
            return;
        };

        // Only the caller's own topic can be subscribed.
        let topic = participant_topic(listing_id, &self.identity.email);
        if !self.subscriptions.contains_key(&topic) {
            if self.subscriptions.len() >= MAX_SUBSCRIPTIONS {
                warn!(email = %self.identity.email, "Subscription limit reached");
                self.send(ServerMessage::Error {
                    message: format!("At most {} listings can be followed at once", MAX_SUBSCRIPTIONS),
                })
                .await;
                return;
            }
            let rx = self.app_state.hub.subscribe(&topic).await;
            let token = self.shutdown.child_token();
            tokio::spawn(forward_topic(
                self.app_state.hub.clone(),
                topic.clone(),
                rx,
                self.outbound.clone(),
                token.clone(),
            ));
            self.subscriptions.insert(topic.clone(), token);
            debug!(topic = %topic, "Subscribed");
        }

        self.send(ServerMessage::Subscribed { topic }).await;
    }

    async fn unsubscribe(&mut self, listing_id: &str) {
        let topic = participant_topic(listing_id.trim(), &self.identity.email);
        if let Some(token) = self.subscriptions.remove(&topic) {
            token.cancel();
        }
        self.send(ServerMessage::Unsubscribed { topic }).await;
    }

    async fn submit(&mut self, listing_id: &str, submission: ChatSubmission) {
        match self.app_state.router.route(listing_id, submission).await {
            Ok(routed) => {
                debug!(message_id = %routed.message.id, "Message accepted");
            }
            // Invalid messages are dropped without telling the client; the
            // router has already logged why.
            Err(RouteError::Rejected(_)) => {}
            Err(RouteError::Store(e)) => {
                error!("Message from {} not delivered: {}", self.identity.email, e);
                self.send(ServerMessage::DeliveryFailed {
                    reason: "Message could not be saved; please retry.".to_string(),
                })
                .await;
            }
        }
    }

    async fn send(&self, msg: ServerMessage) {
        match serde_json::to_string(&msg) {
            Ok(json) => self.push(Message::Text(json.into())).await,
            Err(e) => error!("Failed to serialize server message: {}", e),
        }
    }

    async fn push(&self, msg: Message) {
        if self.outbound.send(msg).await.is_err() {
            debug!("Outbound channel closed");
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Copies messages from one hub topic onto the connection until cancelled,
/// then hands the topic back to the hub.
async fn forward_topic(
    hub: Arc<TopicHub>,
    topic: String,
    mut rx: broadcast::Receiver<Arc<ChatMessage>>,
    outbound: mpsc::Sender<Message>,
    token: CancellationToken,
) {
    loop {
        let server_msg = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = rx.recv() => match received {
                Ok(message) => ServerMessage::Message {
                    topic: topic.clone(),
                    message: ChatMessageDto::from(message.as_ref()),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %topic, skipped, "Listener lagged");
                    ServerMessage::Error {
                        message: format!("Missed {} live messages; reload the history.", skipped),
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        let json = match serde_json::to_string(&server_msg) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize server message: {}", e);
                continue;
            }
        };
        if outbound.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }

    drop(rx);
    hub.release(&topic).await;
}
