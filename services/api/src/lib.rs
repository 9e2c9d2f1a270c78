//! services/api/src/lib.rs
//!
//! The marketplace chat service: bearer-token authentication, chat history
//! endpoints and the live chat WebSocket, wired together by `app`.

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod web;
