//! `PostgreSQL` implementation of the lobby repository traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use storyloom_core::error::StoreError;
use storyloom_core::ids::{LobbyCode, UserId};
use storyloom_core::lobby::Lobby;
use storyloom_core::repository::{LobbyRepository, LobbyTransaction};
use storyloom_core::settings::LobbySettings;
use storyloom_core::story::{ElementKind, Story, StoryElement};
use storyloom_core::user::User;

/// PostgreSQL-backed lobby repository.
#[derive(Debug, Clone)]
pub struct PgLobbyRepository {
    pool: PgPool,
}

impl PgLobbyRepository {
    /// Creates a new `PgLobbyRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// One open sqlx transaction; the lobby row lock lives and dies with it.
pub struct PgLobbyTransaction {
    tx: Transaction<'static, Postgres>,
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[derive(Debug, FromRow)]
struct LobbyRow {
    code: String,
    host_id: String,
    round: i32,
    users_submitted: i32,
    round_started_at: Option<DateTime<Utc>>,
    round_ends_at: Option<DateTime<Utc>>,
    settings: serde_json::Value,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    nickname: String,
    lobby_code: Option<String>,
    ready: bool,
    joined_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct StoryRow {
    id: Uuid,
    lobby_code: String,
    story_index: i32,
    owner_id: String,
    name: String,
}

#[derive(Debug, FromRow)]
struct ElementRow {
    story_id: Uuid,
    author_id: String,
    element_index: i32,
    round: i32,
    kind: String,
    payload: String,
}

fn lobby_from_row(row: LobbyRow, users: Vec<User>) -> Result<Lobby, StoreError> {
    let settings: LobbySettings = serde_json::from_value(row.settings)
        .map_err(|e| StoreError::Corrupt(format!("lobby {} settings: {e}", row.code)))?;
    Ok(Lobby {
        code: LobbyCode::from(row.code),
        host_id: UserId::from(row.host_id),
        round: row.round,
        users_submitted: row.users_submitted,
        round_started_at: row.round_started_at,
        round_ends_at: row.round_ends_at,
        settings,
        users,
    })
}

fn user_from_row(row: UserRow) -> User {
    User {
        id: UserId::from(row.id),
        nickname: row.nickname,
        lobby_code: row.lobby_code.map(LobbyCode::from),
        ready: row.ready,
        joined_at: row.joined_at,
        last_active_at: row.last_active_at,
    }
}

fn element_from_row(row: ElementRow) -> Result<StoryElement, StoreError> {
    let kind = ElementKind::parse(&row.kind).ok_or_else(|| {
        StoreError::Corrupt(format!(
            "story {} element {}: unknown kind {:?}",
            row.story_id, row.element_index, row.kind
        ))
    })?;
    Ok(StoryElement {
        story_id: row.story_id,
        author_id: UserId::from(row.author_id),
        index: row.element_index,
        round: row.round,
        kind,
        payload: row.payload,
    })
}

fn story_from_row(row: StoryRow, elements: Vec<StoryElement>) -> Story {
    Story {
        id: row.id,
        index: row.story_index,
        lobby_code: LobbyCode::from(row.lobby_code),
        owner_id: UserId::from(row.owner_id),
        name: row.name,
        elements,
    }
}

const SELECT_LOBBY: &str = "SELECT code, host_id, round, users_submitted, round_started_at, \
     round_ends_at, settings FROM lobbies WHERE code = $1";
const SELECT_MEMBERS: &str = "SELECT id, nickname, lobby_code, ready, joined_at, last_active_at \
     FROM users WHERE lobby_code = $1 ORDER BY joined_at, id";
const SELECT_STORIES: &str = "SELECT id, lobby_code, story_index, owner_id, name FROM stories \
     WHERE lobby_code = $1 ORDER BY story_index";
const SELECT_ELEMENTS: &str = "SELECT e.story_id, e.author_id, e.element_index, e.round, e.kind, \
     e.payload FROM story_elements e JOIN stories s ON s.id = e.story_id \
     WHERE s.lobby_code = $1 ORDER BY e.story_id, e.round, e.element_index";

async fn load_lobby(
    conn: &mut PgConnection,
    code: &LobbyCode,
    for_update: bool,
) -> Result<Option<Lobby>, StoreError> {
    let sql = if for_update {
        format!("{SELECT_LOBBY} FOR UPDATE")
    } else {
        SELECT_LOBBY.to_owned()
    };
    let Some(row) = sqlx::query_as::<_, LobbyRow>(&sql)
        .bind(code.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?
    else {
        return Ok(None);
    };

    let members = sqlx::query_as::<_, UserRow>(SELECT_MEMBERS)
        .bind(code.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)?
        .into_iter()
        .map(user_from_row)
        .collect();

    lobby_from_row(row, members).map(Some)
}

async fn load_stories(conn: &mut PgConnection, code: &LobbyCode) -> Result<Vec<Story>, StoreError> {
    let story_rows = sqlx::query_as::<_, StoryRow>(SELECT_STORIES)
        .bind(code.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)?;
    let element_rows = sqlx::query_as::<_, ElementRow>(SELECT_ELEMENTS)
        .bind(code.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)?;

    let mut elements_by_story: std::collections::HashMap<Uuid, Vec<StoryElement>> =
        std::collections::HashMap::new();
    for row in element_rows {
        let element = element_from_row(row)?;
        elements_by_story
            .entry(element.story_id)
            .or_default()
            .push(element);
    }

    Ok(story_rows
        .into_iter()
        .map(|row| {
            let elements = elements_by_story.remove(&row.id).unwrap_or_default();
            story_from_row(row, elements)
        })
        .collect())
}

#[async_trait]
impl LobbyTransaction for PgLobbyTransaction {
    async fn lock_lobby(&mut self, code: &LobbyCode) -> Result<Option<Lobby>, StoreError> {
        load_lobby(&mut self.tx, code, true).await
    }

    async fn insert_lobby(&mut self, lobby: &Lobby) -> Result<(), StoreError> {
        let settings = serde_json::to_value(&lobby.settings)
            .map_err(|e| StoreError::Corrupt(format!("settings serialization: {e}")))?;
        sqlx::query(
            "INSERT INTO lobbies (code, host_id, round, users_submitted, round_started_at, \
             round_ends_at, settings) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(lobby.code.as_str())
        .bind(lobby.host_id.as_str())
        .bind(lobby.round)
        .bind(lobby.users_submitted)
        .bind(lobby.round_started_at)
        .bind(lobby.round_ends_at)
        .bind(settings)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn update_lobby(&mut self, lobby: &Lobby) -> Result<(), StoreError> {
        let settings = serde_json::to_value(&lobby.settings)
            .map_err(|e| StoreError::Corrupt(format!("settings serialization: {e}")))?;
        sqlx::query(
            "UPDATE lobbies SET host_id = $2, round = $3, users_submitted = $4, \
             round_started_at = $5, round_ends_at = $6, settings = $7 WHERE code = $1",
        )
        .bind(lobby.code.as_str())
        .bind(lobby.host_id.as_str())
        .bind(lobby.round)
        .bind(lobby.users_submitted)
        .bind(lobby.round_started_at)
        .bind(lobby.round_ends_at)
        .bind(settings)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_lobby(&mut self, code: &LobbyCode) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM lobbies WHERE code = $1")
            .bind(code.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, nickname, lobby_code, ready, joined_at, last_active_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET nickname = EXCLUDED.nickname, \
             lobby_code = EXCLUDED.lobby_code, ready = EXCLUDED.ready, \
             joined_at = EXCLUDED.joined_at, last_active_at = EXCLUDED.last_active_at",
        )
        .bind(user.id.as_str())
        .bind(&user.nickname)
        .bind(user.lobby_code.as_ref().map(LobbyCode::as_str))
        .bind(user.ready)
        .bind(user.joined_at)
        .bind(user.last_active_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_user(&mut self, id: &UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn clear_ready(&mut self, code: &LobbyCode) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET ready = FALSE WHERE lobby_code = $1")
            .bind(code.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn insert_story(&mut self, story: &Story) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO stories (id, lobby_code, story_index, owner_id, name) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(story.id)
        .bind(story.lobby_code.as_str())
        .bind(story.index)
        .bind(story.owner_id.as_str())
        .bind(&story.name)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_stories(&mut self, code: &LobbyCode) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM stories WHERE lobby_code = $1")
            .bind(code.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn replace_elements(
        &mut self,
        story_id: Uuid,
        author_id: &UserId,
        elements: &[StoryElement],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM story_elements WHERE story_id = $1 AND author_id = $2")
            .bind(story_id)
            .bind(author_id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        for element in elements {
            sqlx::query(
                "INSERT INTO story_elements (story_id, author_id, element_index, round, kind, \
                 payload) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(element.story_id)
            .bind(element.author_id.as_str())
            .bind(element.index)
            .bind(element.round)
            .bind(element.kind.as_str())
            .bind(&element.payload)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        }
        Ok(())
    }

    async fn fetch_stories(&mut self, code: &LobbyCode) -> Result<Vec<Story>, StoreError> {
        load_stories(&mut self.tx, code).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.commit().await.map_err(backend)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.rollback().await.map_err(backend)
    }
}

#[async_trait]
impl LobbyRepository for PgLobbyRepository {
    async fn begin(&self) -> Result<Box<dyn LobbyTransaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(backend)?;
        Ok(Box::new(PgLobbyTransaction { tx }))
    }

    async fn fetch_lobby(&self, code: &LobbyCode) -> Result<Option<Lobby>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        load_lobby(&mut conn, code, false).await
    }

    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, nickname, lobby_code, ready, joined_at, last_active_at FROM users \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(user_from_row))
    }

    async fn fetch_stories(&self, code: &LobbyCode) -> Result<Vec<Story>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        load_stories(&mut conn, code).await
    }

    async fn idle_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, nickname, lobby_code, ready, joined_at, last_active_at FROM users \
             WHERE last_active_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }

    async fn lobbies_in_round(&self) -> Result<Vec<Lobby>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        let rows = sqlx::query_as::<_, LobbyRow>(
            "SELECT code, host_id, round, users_submitted, round_started_at, round_ends_at, \
             settings FROM lobbies WHERE round > 0",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)?;

        let mut lobbies = Vec::with_capacity(rows.len());
        for row in rows {
            let code = LobbyCode::from(row.code.clone());
            let members = sqlx::query_as::<_, UserRow>(SELECT_MEMBERS)
                .bind(code.as_str())
                .fetch_all(&mut *conn)
                .await
                .map_err(backend)?
                .into_iter()
                .map(user_from_row)
                .collect();
            lobbies.push(lobby_from_row(row, members)?);
        }
        Ok(lobbies)
    }

    async fn touch_user(&self, id: &UserId, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_active_at = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
