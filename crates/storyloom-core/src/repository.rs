//! Durable store abstraction.
//!
//! All mutating round transitions run inside one [`LobbyTransaction`], which
//! acquires an exclusive lease on the lobby row before reading it. The lock
//! serializes every state transition for that lobby regardless of how many
//! timer callbacks or player requests race to perform one. Read-only queries
//! go through the unlocked methods on [`LobbyRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::ids::{LobbyCode, UserId};
use crate::lobby::Lobby;
use crate::story::{Story, StoryElement};
use crate::user::User;

/// An open transaction against the durable store.
///
/// Consumed by [`commit`](Self::commit) or [`rollback`](Self::rollback);
/// dropping an uncommitted transaction must roll it back.
#[async_trait]
pub trait LobbyTransaction: Send {
    /// Loads a lobby (with its ordered member list) under an exclusive row
    /// lock, blocking until any concurrent transaction on the same lobby
    /// commits or rolls back.
    async fn lock_lobby(&mut self, code: &LobbyCode) -> Result<Option<Lobby>, StoreError>;

    /// Inserts a new lobby row.
    async fn insert_lobby(&mut self, lobby: &Lobby) -> Result<(), StoreError>;

    /// Writes the lobby row back (round counters, timestamps, host,
    /// settings). Does not touch member rows.
    async fn update_lobby(&mut self, lobby: &Lobby) -> Result<(), StoreError>;

    /// Deletes the lobby row. Stories cascade; member rows are detached by
    /// the caller first.
    async fn delete_lobby(&mut self, code: &LobbyCode) -> Result<(), StoreError>;

    /// Inserts or fully replaces a user row.
    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Deletes a user row.
    async fn delete_user(&mut self, id: &UserId) -> Result<(), StoreError>;

    /// Clears the `ready` flag for every member of the lobby.
    async fn clear_ready(&mut self, code: &LobbyCode) -> Result<(), StoreError>;

    /// Inserts a new story (without elements).
    async fn insert_story(&mut self, story: &Story) -> Result<(), StoreError>;

    /// Deletes all stories (and, by cascade, their elements) of a lobby.
    async fn delete_stories(&mut self, code: &LobbyCode) -> Result<(), StoreError>;

    /// Replaces one author's whole contribution to a story
    /// (upsert-and-truncate: any previous elements by that author in that
    /// story are removed first).
    async fn replace_elements(
        &mut self,
        story_id: Uuid,
        author_id: &UserId,
        elements: &[StoryElement],
    ) -> Result<(), StoreError>;

    /// Loads every story of a lobby, elements included, ordered by story
    /// index.
    async fn fetch_stories(&mut self, code: &LobbyCode) -> Result<Vec<Story>, StoreError>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Rolls the transaction back explicitly.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Handle to the durable store.
#[async_trait]
pub trait LobbyRepository: Send + Sync {
    /// Opens a transaction. The lobby row lock is taken later, by
    /// [`LobbyTransaction::lock_lobby`].
    async fn begin(&self) -> Result<Box<dyn LobbyTransaction>, StoreError>;

    /// Unlocked lobby read (with ordered members).
    async fn fetch_lobby(&self, code: &LobbyCode) -> Result<Option<Lobby>, StoreError>;

    /// Unlocked user read.
    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    /// Unlocked read of all stories of a lobby, ordered by rotation slot.
    async fn fetch_stories(&self, code: &LobbyCode) -> Result<Vec<Story>, StoreError>;

    /// Users with no activity since the cutoff.
    async fn idle_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, StoreError>;

    /// Lobbies currently mid-game (`round > 0`).
    async fn lobbies_in_round(&self) -> Result<Vec<Lobby>, StoreError>;

    /// Records user activity without opening a full transaction.
    async fn touch_user(&self, id: &UserId, now: DateTime<Utc>) -> Result<(), StoreError>;
}
