pub mod broadcast;
pub mod db;
pub mod memory;

pub use broadcast::TopicHub;
pub use db::DbAdapter;
pub use memory::{InMemoryChatStore, InMemoryUserDirectory};
