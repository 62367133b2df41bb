//! Submission reconciliation.
//!
//! Runs as part of `advance`, before the round counter changes: every story
//! slot left unfilled this round receives an `empty` placeholder element, so
//! no round ever leaves a gap in a story's element sequence. Works per
//! story, not per member, so slots vacated by departed players are filled
//! too.

use storyloom_core::error::DomainError;
use storyloom_core::repository::LobbyTransaction;
use storyloom_core::story::{Story, StoryElement};
use storyloom_rotation::RotationPlan;

use crate::domain::assignment;

/// Back-fills placeholders for every story missing an element in `round`.
/// Returns how many placeholders were written.
///
/// # Errors
///
/// Returns `DomainError::Store` if persisting a placeholder fails; the
/// surrounding transaction then rolls back the whole advance.
pub async fn backfill_missing(
    tx: &mut (dyn LobbyTransaction + '_),
    stories: &[Story],
    round: i32,
) -> Result<usize, DomainError> {
    if stories.is_empty() {
        return Ok(0);
    }
    let code = &stories[0].lobby_code;
    let plan = RotationPlan::new(code, stories.len());
    let mut backfilled = 0;

    for story in stories {
        if story.elements.iter().any(|e| e.round == round) {
            continue;
        }
        let Some(author) = assignment::expected_author(&plan, stories, story.index, round) else {
            // No row visits this slot in this round; nothing to fill.
            continue;
        };
        let placeholder = StoryElement::placeholder(story.id, author.clone(), round);
        tx.replace_elements(story.id, &author, &[placeholder]).await?;
        backfilled += 1;
    }

    if backfilled > 0 {
        tracing::debug!(lobby = %code, round, backfilled, "back-filled missing submissions");
    }
    Ok(backfilled)
}
