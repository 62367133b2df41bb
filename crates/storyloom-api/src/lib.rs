//! Storyloom API — WebSocket event gateway.
//!
//! Thin transport over the round coordinator: clients speak a tagged JSON
//! protocol over one socket; state changes are broadcast to every member of
//! the affected lobby.

pub mod config;
pub mod connections;
pub mod error;
pub mod protocol;
pub mod routes;
pub mod state;
