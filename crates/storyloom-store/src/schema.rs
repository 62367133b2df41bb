//! Lobby store database schema.

use sqlx::PgPool;

use storyloom_core::error::StoreError;

/// SQL to create the coordinator tables.
pub const CREATE_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS lobbies (
    code             VARCHAR(8) PRIMARY KEY,
    host_id          TEXT NOT NULL,
    round            INT NOT NULL DEFAULT 0,
    users_submitted  INT NOT NULL DEFAULT 0,
    round_started_at TIMESTAMPTZ,
    round_ends_at    TIMESTAMPTZ,
    settings         JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id             TEXT PRIMARY KEY,
    nickname       TEXT NOT NULL,
    lobby_code     VARCHAR(8) REFERENCES lobbies (code) ON DELETE SET NULL,
    ready          BOOLEAN NOT NULL DEFAULT FALSE,
    joined_at      TIMESTAMPTZ NOT NULL,
    last_active_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_lobby_code
    ON users (lobby_code);

CREATE INDEX IF NOT EXISTS idx_users_last_active
    ON users (last_active_at);

CREATE TABLE IF NOT EXISTS stories (
    id          UUID PRIMARY KEY,
    lobby_code  VARCHAR(8) NOT NULL REFERENCES lobbies (code) ON DELETE CASCADE,
    story_index INT NOT NULL,
    owner_id    TEXT NOT NULL,
    name        TEXT NOT NULL,
    UNIQUE (lobby_code, story_index)
);

CREATE TABLE IF NOT EXISTS story_elements (
    story_id      UUID NOT NULL REFERENCES stories (id) ON DELETE CASCADE,
    author_id     TEXT NOT NULL,
    element_index INT NOT NULL,
    round         INT NOT NULL,
    kind          VARCHAR(16) NOT NULL,
    payload       TEXT NOT NULL,
    PRIMARY KEY (story_id, author_id, element_index)
);

CREATE INDEX IF NOT EXISTS idx_story_elements_story
    ON story_elements (story_id, round, element_index);
";

/// Creates the tables and indexes if they do not exist yet. Run once at
/// startup.
///
/// # Errors
///
/// Returns `StoreError::Backend` when DDL execution fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(CREATE_SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    tracing::debug!("lobby store schema ensured");
    Ok(())
}
