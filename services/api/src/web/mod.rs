pub mod auth;
pub mod chat_ws;
pub mod middleware;
pub mod policy;
pub mod protocol;
pub mod rest;
pub mod state;

// Re-export the handlers the server binary wires into the router.
pub use auth::{login_handler, me_handler};
pub use chat_ws::ws_handler;
pub use middleware::resolve_identity;
pub use rest::{listing_history_handler, seller_inbox_handler, thread_history_handler};
