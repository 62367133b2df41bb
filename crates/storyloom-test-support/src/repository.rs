//! Test repositories — in-memory `LobbyRepository` implementations.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use storyloom_core::error::StoreError;
use storyloom_core::ids::{LobbyCode, UserId};
use storyloom_core::lobby::Lobby;
use storyloom_core::repository::{LobbyRepository, LobbyTransaction};
use storyloom_core::story::{Story, StoryElement};
use storyloom_core::user::User;

/// The whole stored state, cloned for rollback snapshots.
#[derive(Debug, Clone, Default)]
struct World {
    /// Lobby rows, keyed by code. Member lists are assembled on read.
    lobbies: HashMap<String, Lobby>,
    users: HashMap<String, User>,
    stories: Vec<Story>,
}

impl World {
    fn members(&self, code: &LobbyCode) -> Vec<User> {
        let mut members: Vec<User> = self
            .users
            .values()
            .filter(|u| u.lobby_code.as_ref() == Some(code))
            .cloned()
            .collect();
        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        members
    }

    fn assemble_lobby(&self, code: &LobbyCode) -> Option<Lobby> {
        let mut lobby = self.lobbies.get(code.as_str())?.clone();
        lobby.users = self.members(code);
        Some(lobby)
    }

    fn stories_for(&self, code: &LobbyCode) -> Vec<Story> {
        let mut stories: Vec<Story> = self
            .stories
            .iter()
            .filter(|s| &s.lobby_code == code)
            .cloned()
            .collect();
        stories.sort_by_key(|s| s.index);
        stories
    }
}

/// An in-memory repository whose transactions hold a lock on the whole
/// store, so concurrent transactions contend exactly like row-locked
/// transactions on one lobby do in production: the second `begin` +
/// `lock_lobby` pair observes the first one's committed state.
#[derive(Debug, Default)]
pub struct MemoryLobbyRepository {
    world: Arc<Mutex<World>>,
}

impl MemoryLobbyRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<World>,
    snapshot: World,
    committed: bool,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        // An abandoned transaction rolls back, like a dropped sqlx::Transaction.
        if !self.committed {
            *self.guard = mem::take(&mut self.snapshot);
        }
    }
}

#[async_trait]
impl LobbyTransaction for MemoryTransaction {
    async fn lock_lobby(&mut self, code: &LobbyCode) -> Result<Option<Lobby>, StoreError> {
        Ok(self.guard.assemble_lobby(code))
    }

    async fn insert_lobby(&mut self, lobby: &Lobby) -> Result<(), StoreError> {
        let mut row = lobby.clone();
        row.users = Vec::new();
        self.guard.lobbies.insert(lobby.code.as_str().to_owned(), row);
        Ok(())
    }

    async fn update_lobby(&mut self, lobby: &Lobby) -> Result<(), StoreError> {
        let mut row = lobby.clone();
        row.users = Vec::new();
        self.guard.lobbies.insert(lobby.code.as_str().to_owned(), row);
        Ok(())
    }

    async fn delete_lobby(&mut self, code: &LobbyCode) -> Result<(), StoreError> {
        self.guard.lobbies.remove(code.as_str());
        Ok(())
    }

    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.guard
            .users
            .insert(user.id.as_str().to_owned(), user.clone());
        Ok(())
    }

    async fn delete_user(&mut self, id: &UserId) -> Result<(), StoreError> {
        self.guard.users.remove(id.as_str());
        Ok(())
    }

    async fn clear_ready(&mut self, code: &LobbyCode) -> Result<(), StoreError> {
        for user in self.guard.users.values_mut() {
            if user.lobby_code.as_ref() == Some(code) {
                user.ready = false;
            }
        }
        Ok(())
    }

    async fn insert_story(&mut self, story: &Story) -> Result<(), StoreError> {
        self.guard.stories.push(story.clone());
        Ok(())
    }

    async fn delete_stories(&mut self, code: &LobbyCode) -> Result<(), StoreError> {
        self.guard.stories.retain(|s| &s.lobby_code != code);
        Ok(())
    }

    async fn replace_elements(
        &mut self,
        story_id: Uuid,
        author_id: &UserId,
        elements: &[StoryElement],
    ) -> Result<(), StoreError> {
        let story = self
            .guard
            .stories
            .iter_mut()
            .find(|s| s.id == story_id)
            .ok_or_else(|| StoreError::Corrupt(format!("no story with id {story_id}")))?;
        story.elements.retain(|e| &e.author_id != author_id);
        story.elements.extend_from_slice(elements);
        story.elements.sort_by_key(|e| (e.round, e.index));
        Ok(())
    }

    async fn fetch_stories(&mut self, code: &LobbyCode) -> Result<Vec<Story>, StoreError> {
        Ok(self.guard.stories_for(code))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.committed = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = mem::take(&mut self.snapshot);
        self.committed = true;
        Ok(())
    }
}

#[async_trait]
impl LobbyRepository for MemoryLobbyRepository {
    async fn begin(&self) -> Result<Box<dyn LobbyTransaction>, StoreError> {
        let guard = Arc::clone(&self.world).lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            snapshot,
            committed: false,
        }))
    }

    async fn fetch_lobby(&self, code: &LobbyCode) -> Result<Option<Lobby>, StoreError> {
        Ok(self.world.lock().await.assemble_lobby(code))
    }

    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.world.lock().await.users.get(id.as_str()).cloned())
    }

    async fn fetch_stories(&self, code: &LobbyCode) -> Result<Vec<Story>, StoreError> {
        Ok(self.world.lock().await.stories_for(code))
    }

    async fn idle_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, StoreError> {
        Ok(self
            .world
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.last_active_at < cutoff)
            .cloned()
            .collect())
    }

    async fn lobbies_in_round(&self) -> Result<Vec<Lobby>, StoreError> {
        let world = self.world.lock().await;
        Ok(world
            .lobbies
            .values()
            .filter(|l| l.round > 0)
            .map(|l| world.assemble_lobby(&l.code).unwrap_or_else(|| l.clone()))
            .collect())
    }

    async fn touch_user(&self, id: &UserId, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = self.world.lock().await.users.get_mut(id.as_str()) {
            user.last_active_at = now;
        }
        Ok(())
    }
}

/// A repository that always fails with a backend error. Useful for testing
/// error-handling paths.
#[derive(Debug, Default)]
pub struct FailingLobbyRepository;

fn backend_down() -> StoreError {
    StoreError::Backend("connection refused".into())
}

#[async_trait]
impl LobbyRepository for FailingLobbyRepository {
    async fn begin(&self) -> Result<Box<dyn LobbyTransaction>, StoreError> {
        Err(backend_down())
    }

    async fn fetch_lobby(&self, _code: &LobbyCode) -> Result<Option<Lobby>, StoreError> {
        Err(backend_down())
    }

    async fn fetch_user(&self, _id: &UserId) -> Result<Option<User>, StoreError> {
        Err(backend_down())
    }

    async fn fetch_stories(&self, _code: &LobbyCode) -> Result<Vec<Story>, StoreError> {
        Err(backend_down())
    }

    async fn idle_users(&self, _cutoff: DateTime<Utc>) -> Result<Vec<User>, StoreError> {
        Err(backend_down())
    }

    async fn lobbies_in_round(&self) -> Result<Vec<Lobby>, StoreError> {
        Err(backend_down())
    }

    async fn touch_user(&self, _id: &UserId, _now: DateTime<Utc>) -> Result<(), StoreError> {
        Err(backend_down())
    }
}
