//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `ChatHistoryStore` and `UserDirectory` ports from the core crate. It handles
//! all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_chat_core::domain::{ChatMessage, NewChatMessage, Role, SellerInbox, UserCredentials};
use market_chat_core::ports::{ChatHistoryStore, PortError, PortResult, UserDirectory};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the chat and user ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn port_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const MESSAGE_COLUMNS: &str =
    "seq, id, listing_id, sender, buyer_email, seller_email, body, created_at";

#[derive(FromRow)]
struct ChatMessageRecord {
    seq: i64,
    id: Uuid,
    listing_id: String,
    sender: String,
    buyer_email: String,
    seller_email: String,
    body: String,
    created_at: DateTime<Utc>,
}
impl ChatMessageRecord {
    fn to_domain(self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            sequence: self.seq,
            listing_id: self.listing_id,
            sender: self.sender,
            buyer_email: self.buyer_email,
            seller_email: self.seller_email,
            body: self.body,
            timestamp: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct InboxRow {
    listing_id: String,
    buyer_email: String,
}

#[derive(FromRow)]
struct UserRecord {
    email: String,
    password_hash: String,
    role: String,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        let role = self.role.parse::<Role>().unwrap_or_else(|e| {
            warn!("{} for user {}, falling back to USER", e, self.email);
            Role::User
        });
        UserCredentials {
            email: self.email,
            hashed_password: self.password_hash,
            role,
        }
    }
}

//=========================================================================================
// `ChatHistoryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatHistoryStore for DbAdapter {
    async fn append(&self, message: NewChatMessage) -> PortResult<ChatMessage> {
        // API processes may disagree about the time, so the database clock
        // stamps the row, never earlier than the newest message in the thread.
        let sql = format!(
            "INSERT INTO chat_messages (id, listing_id, sender, buyer_email, seller_email, body, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, GREATEST(clock_timestamp(), \
                 (SELECT max(created_at) FROM chat_messages \
                  WHERE listing_id = $2 AND seller_email = $5 AND buyer_email = $4))) \
             RETURNING {}",
            MESSAGE_COLUMNS
        );
        let record = sqlx::query_as::<_, ChatMessageRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&message.listing_id)
            .bind(&message.sender)
            .bind(&message.buyer_email)
            .bind(&message.seller_email)
            .bind(&message.body)
            .fetch_one(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(record.to_domain())
    }

    async fn list_by_listing(&self, listing_id: &str) -> PortResult<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {} FROM chat_messages WHERE listing_id = $1 ORDER BY created_at ASC, seq ASC",
            MESSAGE_COLUMNS
        );
        let records = sqlx::query_as::<_, ChatMessageRecord>(&sql)
            .bind(listing_id)
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_by_thread(
        &self,
        listing_id: &str,
        seller_email: &str,
        buyer_email: &str,
    ) -> PortResult<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {} FROM chat_messages \
             WHERE listing_id = $1 AND seller_email = $2 AND buyer_email = $3 \
             ORDER BY created_at ASC, seq ASC",
            MESSAGE_COLUMNS
        );
        let records = sqlx::query_as::<_, ChatMessageRecord>(&sql)
            .bind(listing_id)
            .bind(seller_email)
            .bind(buyer_email)
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn inbox_for(&self, seller_email: &str) -> PortResult<SellerInbox> {
        let rows = sqlx::query_as::<_, InboxRow>(
            "SELECT DISTINCT listing_id, buyer_email FROM chat_messages WHERE seller_email = $1",
        )
        .bind(seller_email)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        let mut inbox = SellerInbox::new();
        for row in rows {
            inbox.entry(row.listing_id).or_default().insert(row.buyer_email);
        }
        Ok(inbox)
    }
}

//=========================================================================================
// `UserDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserDirectory for DbAdapter {
    async fn find_credentials(&self, email: &str) -> PortResult<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT email, password_hash, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(record.map(|r| r.to_domain()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::postgres::PgPoolOptions;

    /// Connects to `TEST_DATABASE_URL`, or returns `None` so the test is skipped.
    async fn test_adapter() -> Option<DbAdapter> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();
        let adapter = DbAdapter::new(pool);
        adapter.run_migrations().await.unwrap();
        Some(adapter)
    }

    fn new_message(listing_id: &str, body: &str, timestamp: DateTime<Utc>) -> NewChatMessage {
        NewChatMessage {
            listing_id: listing_id.to_string(),
            sender: "b@x.com".to_string(),
            buyer_email: "b@x.com".to_string(),
            seller_email: "s@y.com".to_string(),
            body: body.to_string(),
            timestamp,
        }
    }

    #[tokio::test]
    async fn thread_keeps_append_order_when_writer_clocks_disagree() {
        let Some(adapter) = test_adapter().await else {
            return;
        };
        let listing_id = format!("car-{}", Uuid::new_v4());

        // A writer running ahead, then one running behind.
        let ahead = new_message(&listing_id, "first", Utc::now() + Duration::hours(2));
        let behind = new_message(&listing_id, "second", Utc::now() - Duration::hours(2));
        let first = adapter.append(ahead).await.unwrap();
        let second = adapter.append(behind).await.unwrap();
        assert!(second.timestamp >= first.timestamp);

        let thread = adapter
            .list_by_thread(&listing_id, "s@y.com", "b@x.com")
            .await
            .unwrap();
        let bodies: Vec<&str> = thread.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);

        let listing = adapter.list_by_listing(&listing_id).await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].id, first.id);
    }
}
