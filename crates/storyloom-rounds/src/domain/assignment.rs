//! Binding the rotation plan to persisted stories.
//!
//! The rotation matrix itself is recomputed from the lobby code on demand;
//! the only persisted anchor is each story's original contributor. A user's
//! rotation row is the row whose round-1 slot is the story they own, so
//! assignments stay stable when members leave and survive restarts.

use storyloom_core::error::DomainError;
use storyloom_core::ids::{LobbyCode, UserId};
use storyloom_core::story::Story;
use storyloom_rotation::RotationPlan;

/// The rotation row of `user_id`, derived from story ownership.
#[must_use]
pub fn rotation_row(plan: &RotationPlan, stories: &[Story], user_id: &UserId) -> Option<usize> {
    let owned = stories.iter().find(|s| &s.owner_id == user_id)?;
    plan.row_opening_with(usize::try_from(owned.index).ok()?)
}

/// The story `user_id` writes into during 1-based `round`.
///
/// # Errors
///
/// Returns `DomainError::UserNotInLobby` when the user owns no story in this
/// game, or `DomainError::StoryNotFound` when the rotation points at a slot
/// with no persisted story (a corrupt game).
pub fn assigned_story<'a>(
    code: &LobbyCode,
    stories: &'a [Story],
    user_id: &UserId,
    round: i32,
) -> Result<&'a Story, DomainError> {
    let plan = RotationPlan::new(code, stories.len());
    let row = rotation_row(&plan, stories, user_id).ok_or_else(|| DomainError::UserNotInLobby {
        user: user_id.clone(),
        lobby: code.clone(),
    })?;
    let index = plan
        .story_index(row, round)
        .ok_or_else(|| DomainError::StoryNotFound {
            lobby: code.clone(),
            index: round,
        })?;
    let index = i32::try_from(index).map_err(|_| DomainError::StoryNotFound {
        lobby: code.clone(),
        index: round,
    })?;
    stories
        .iter()
        .find(|s| s.index == index)
        .ok_or(DomainError::StoryNotFound {
            lobby: code.clone(),
            index,
        })
}

/// The author expected to fill `story_index` during `round`: the owner of
/// the story opening the row that visits `story_index` that round. Used by
/// the reconciler, so it works even when that player has left the lobby.
#[must_use]
pub fn expected_author(
    plan: &RotationPlan,
    stories: &[Story],
    story_index: i32,
    round: i32,
) -> Option<UserId> {
    let target = usize::try_from(story_index).ok()?;
    let row = (0..plan.stories_count()).find(|&row| plan.story_index(row, round) == Some(target))?;
    let opening = i32::try_from(plan.story_index(row, 1)?).ok()?;
    stories
        .iter()
        .find(|s| s.index == opening)
        .map(|s| s.owner_id.clone())
}

#[cfg(test)]
mod tests {
    use storyloom_core::story::Story;

    use super::*;

    fn game(code: &LobbyCode, n: usize) -> Vec<Story> {
        // One story per player, owners placed the way start_game places
        // them: player at rotation row p owns the story at that row's
        // round-1 slot.
        let plan = RotationPlan::new(code, n);
        (0..n)
            .map(|row| {
                let index = plan.story_index(row, 1).unwrap();
                Story::new(
                    code.clone(),
                    i32::try_from(index).unwrap(),
                    UserId::from(format!("u{row}")),
                    format!("story-{index}"),
                )
            })
            .collect()
    }

    #[test]
    fn test_round_one_assigns_every_user_their_own_story() {
        let code = LobbyCode::from("ABCDE");
        let stories = game(&code, 4);

        for row in 0..4 {
            let user = UserId::from(format!("u{row}"));
            let story = assigned_story(&code, &stories, &user, 1).unwrap();
            assert_eq!(story.owner_id, user);
        }
    }

    #[test]
    fn test_no_two_users_share_a_story_in_any_round() {
        let code = LobbyCode::from("FGHIJ");
        let stories = game(&code, 5);

        for round in 1..=5 {
            let mut seen = Vec::new();
            for row in 0..5 {
                let user = UserId::from(format!("u{row}"));
                let story = assigned_story(&code, &stories, &user, round).unwrap();
                assert!(!seen.contains(&story.index), "round {round} collision");
                seen.push(story.index);
            }
        }
    }

    #[test]
    fn test_unknown_user_is_not_in_lobby() {
        let code = LobbyCode::from("ABCDE");
        let stories = game(&code, 3);

        let err = assigned_story(&code, &stories, &UserId::from("ghost"), 1).unwrap_err();
        assert!(matches!(err, DomainError::UserNotInLobby { .. }));
    }

    #[test]
    fn test_expected_author_matches_assignment() {
        let code = LobbyCode::from("KLMNO");
        let stories = game(&code, 4);
        let plan = RotationPlan::new(&code, 4);

        for round in 1..=4 {
            for story in &stories {
                let author = expected_author(&plan, &stories, story.index, round).unwrap();
                let assigned = assigned_story(&code, &stories, &author, round).unwrap();
                assert_eq!(assigned.index, story.index);
            }
        }
    }
}
