//! Storyloom Store — PostgreSQL persistence.
//!
//! Implements the core repository traits over sqlx. Every mutating round
//! transition acquires the lobby row with `SELECT ... FOR UPDATE` inside a
//! transaction, which serializes transitions per lobby across all server
//! processes.

pub mod pg_lobby_repository;
pub mod schema;

pub use pg_lobby_repository::PgLobbyRepository;
