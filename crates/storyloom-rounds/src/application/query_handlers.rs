//! Query handlers for the round coordination context.
//!
//! Read-only views; they run unlocked, since display reads do not need a
//! linearizable snapshot of the round state.

use serde::Serialize;

use storyloom_core::error::DomainError;
use storyloom_core::ids::{LobbyCode, UserId};
use storyloom_core::repository::LobbyRepository;
use storyloom_core::story::Story;
use storyloom_rotation::RotationPlan;

use crate::domain::assignment;
use crate::domain::transitions;

/// Results playback view: one story part plus the requester's place in the
/// rotation.
#[derive(Debug, Clone, Serialize)]
pub struct StoryPartView {
    /// 0-based part (story slot) being played back.
    pub part: i32,
    /// The story at that slot; `None` past the last one.
    pub story: Option<Story>,
    /// The requester's rotation row.
    pub user_index: i32,
    /// Total number of stories in the game.
    pub stories_count: i32,
}

async fn member_lobby(
    user_id: &UserId,
    code: &LobbyCode,
    repo: &dyn LobbyRepository,
) -> Result<storyloom_core::lobby::Lobby, DomainError> {
    let lobby = repo
        .fetch_lobby(code)
        .await?
        .ok_or_else(|| DomainError::LobbyNotFound(code.clone()))?;
    transitions::ensure_member(&lobby, user_id)?;
    Ok(lobby)
}

/// The story `user_id` writes into during the current round.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `UserNotInLobby`, `GameNotStarted`, or
/// `StoryNotFound`.
pub async fn get_story(
    user_id: &UserId,
    code: &LobbyCode,
    repo: &dyn LobbyRepository,
) -> Result<Story, DomainError> {
    let lobby = member_lobby(user_id, code, repo).await?;
    if !lobby.in_progress() {
        return Err(DomainError::GameNotStarted(code.clone()));
    }
    let stories = repo.fetch_stories(code).await?;
    let story = assignment::assigned_story(code, &stories, user_id, lobby.round)?;
    Ok(story.clone())
}

/// Playback view of the story at `part`.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `UserNotInLobby`, or `GameNotStarted` when no
/// stories exist yet.
pub async fn story_at_part(
    user_id: &UserId,
    code: &LobbyCode,
    part: i32,
    repo: &dyn LobbyRepository,
) -> Result<StoryPartView, DomainError> {
    member_lobby(user_id, code, repo).await?;
    let stories = repo.fetch_stories(code).await?;
    if stories.is_empty() {
        return Err(DomainError::GameNotStarted(code.clone()));
    }

    let plan = RotationPlan::new(code, stories.len());
    let user_index = assignment::rotation_row(&plan, &stories, user_id).ok_or_else(|| {
        DomainError::UserNotInLobby {
            user: user_id.clone(),
            lobby: code.clone(),
        }
    })?;
    let stories_count = i32::try_from(stories.len()).unwrap_or(i32::MAX);
    let story = stories.iter().find(|s| s.index == part).cloned();

    Ok(StoryPartView {
        part,
        story,
        user_index: i32::try_from(user_index).unwrap_or(i32::MAX),
        stories_count,
    })
}

/// Advances results playback by one part (host only).
///
/// # Errors
///
/// Returns `LobbyNotFound`, `UserNotHost`, or `GameNotStarted` when no
/// stories exist yet.
pub async fn next_part(
    user_id: &UserId,
    code: &LobbyCode,
    current_part: i32,
    repo: &dyn LobbyRepository,
) -> Result<StoryPartView, DomainError> {
    let lobby = member_lobby(user_id, code, repo).await?;
    transitions::ensure_host(&lobby, user_id)?;
    story_at_part(user_id, code, current_part + 1, repo).await
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use storyloom_test_support::{FixedClock, MemoryLobbyRepository};

    use crate::application::command_handlers::{
        handle_create_lobby, handle_join_lobby, handle_start_game,
    };
    use crate::domain::commands::{CreateLobby, JoinLobby, StartGame};

    use super::*;

    async fn started_lobby(repo: &MemoryLobbyRepository, n: usize) -> LobbyCode {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        let lobby = handle_create_lobby(
            &CreateLobby {
                user_id: UserId::from("u0"),
                nickname: "player-0".to_owned(),
            },
            &clock,
            repo,
        )
        .await
        .unwrap();
        for i in 1..n {
            handle_join_lobby(
                &JoinLobby {
                    user_id: UserId::from(format!("u{i}")),
                    nickname: format!("player-{i}"),
                    lobby_code: lobby.code.clone(),
                },
                &clock,
                repo,
            )
            .await
            .unwrap();
        }
        handle_start_game(
            &StartGame {
                user_id: UserId::from("u0"),
                lobby_code: lobby.code.clone(),
            },
            &clock,
            repo,
        )
        .await
        .unwrap();
        lobby.code
    }

    #[tokio::test]
    async fn test_get_story_returns_own_story_in_round_one() {
        let repo = MemoryLobbyRepository::new();
        let code = started_lobby(&repo, 3).await;

        for i in 0..3 {
            let user = UserId::from(format!("u{i}"));
            let story = get_story(&user, &code, &repo).await.unwrap();
            assert_eq!(story.owner_id, user);
        }
    }

    #[tokio::test]
    async fn test_get_story_rejects_non_members() {
        let repo = MemoryLobbyRepository::new();
        let code = started_lobby(&repo, 3).await;

        let err = get_story(&UserId::from("ghost"), &code, &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UserNotInLobby { .. }));
    }

    #[tokio::test]
    async fn test_story_at_part_past_the_last_story_has_no_story() {
        let repo = MemoryLobbyRepository::new();
        let code = started_lobby(&repo, 3).await;

        let view = story_at_part(&UserId::from("u1"), &code, 3, &repo)
            .await
            .unwrap();
        assert!(view.story.is_none());
        assert_eq!(view.stories_count, 3);
    }

    #[tokio::test]
    async fn test_next_part_is_host_only() {
        let repo = MemoryLobbyRepository::new();
        let code = started_lobby(&repo, 3).await;

        let err = next_part(&UserId::from("u1"), &code, 0, &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UserNotHost { .. }));

        let view = next_part(&UserId::from("u0"), &code, 0, &repo)
            .await
            .unwrap();
        assert_eq!(view.part, 1);
        assert!(view.story.is_some());
    }
}
