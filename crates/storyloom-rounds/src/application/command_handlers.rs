//! Command handlers for the round coordination context.
//!
//! Each handler runs one mutating transition: open a transaction, lock the
//! lobby row, validate and apply the domain rules, persist, commit. The row
//! lock serializes concurrent transitions on the same lobby; any failure
//! before commit rolls the whole transition back.

use storyloom_core::clock::Clock;
use storyloom_core::error::DomainError;
use storyloom_core::ids::LobbyCode;
use storyloom_core::lobby::{Lobby, ROUND_NOT_STARTED};
use storyloom_core::repository::{LobbyRepository, LobbyTransaction};
use storyloom_core::settings::ElementCaps;
use storyloom_core::story::{ElementKind, Story, StoryElement};
use storyloom_core::user::User;
use storyloom_rotation::{RotationPlan, shuffled_members};

use crate::application::reconciler;
use crate::domain::assignment;
use crate::domain::commands::{
    AdvanceRound, CreateLobby, EndGame, JoinLobby, LeaveLobby, SettingChange, StartGame,
    SubmitElements, SubmitSettings, UnsubmitElements, UpdateSetting,
};
use crate::domain::transitions;

/// Give up allocating a fresh lobby code after this many collisions.
const MAX_CODE_ATTEMPTS: usize = 16;

/// Result of a submission: the updated lobby, and whether it was the last
/// one missing so the round advanced in the same transaction.
#[derive(Debug)]
pub struct SubmitOutcome {
    /// Lobby state after the transition.
    pub lobby: Lobby,
    /// Whether the round advanced as part of this submission.
    pub advanced: bool,
}

/// Result of a leave: `None` lobby means the last member left and the lobby
/// was deleted.
#[derive(Debug)]
pub struct LeaveOutcome {
    /// Lobby state after the transition, if the lobby still exists.
    pub lobby: Option<Lobby>,
    /// Whether the departure completed the round and advanced it.
    pub advanced: bool,
}

async fn lock_or_not_found(
    tx: &mut (dyn LobbyTransaction + '_),
    code: &LobbyCode,
) -> Result<Lobby, DomainError> {
    tx.lock_lobby(code)
        .await?
        .ok_or_else(|| DomainError::LobbyNotFound(code.clone()))
}

/// Handles `CreateLobby`: registers the user and a fresh lobby with them as
/// host and only member.
///
/// # Errors
///
/// Returns `DomainError::Store` on persistence failure.
pub async fn handle_create_lobby(
    command: &CreateLobby,
    clock: &dyn Clock,
    repo: &dyn LobbyRepository,
) -> Result<Lobby, DomainError> {
    let now = clock.now();
    let mut tx = repo.begin().await?;

    let mut code = LobbyCode::generate(&mut rand::rng());
    let mut attempts = 1;
    while tx.lock_lobby(&code).await?.is_some() {
        if attempts >= MAX_CODE_ATTEMPTS {
            return Err(DomainError::InvalidRequest(
                "could not allocate an unused lobby code".to_owned(),
            ));
        }
        attempts += 1;
        code = LobbyCode::generate(&mut rand::rng());
    }

    let mut host = User::new(command.user_id.clone(), command.nickname.clone(), now);
    host.lobby_code = Some(code.clone());
    let lobby = Lobby::new(code, host.clone());

    tx.insert_lobby(&lobby).await?;
    tx.upsert_user(&host).await?;
    tx.commit().await?;

    tracing::info!(lobby = %lobby.code, host = %host.id, "lobby created");
    Ok(lobby)
}

/// Handles `JoinLobby`. Joining a lobby one is already in refreshes the
/// nickname and succeeds, so a reconnecting client can replay its join.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `GameAlreadyStarted`, or
/// `LobbyMaxPlayersReached`.
pub async fn handle_join_lobby(
    command: &JoinLobby,
    clock: &dyn Clock,
    repo: &dyn LobbyRepository,
) -> Result<Lobby, DomainError> {
    let now = clock.now();
    let mut tx = repo.begin().await?;
    let mut lobby = lock_or_not_found(tx.as_mut(), &command.lobby_code).await?;

    if let Some(member) = lobby.member_mut(&command.user_id) {
        member.nickname = command.nickname.clone();
        member.last_active_at = now;
        let member = member.clone();
        tx.upsert_user(&member).await?;
        tx.commit().await?;
        return Ok(lobby);
    }

    if lobby.round != ROUND_NOT_STARTED {
        return Err(DomainError::GameAlreadyStarted(lobby.code.clone()));
    }
    if lobby.is_full() {
        return Err(DomainError::LobbyMaxPlayersReached(lobby.code.clone()));
    }

    let mut user = User::new(command.user_id.clone(), command.nickname.clone(), now);
    user.lobby_code = Some(lobby.code.clone());
    tx.upsert_user(&user).await?;
    lobby.users.push(user);
    tx.commit().await?;

    tracing::info!(lobby = %lobby.code, user = %command.user_id, "user joined");
    Ok(lobby)
}

/// Handles `LeaveLobby`: detaches the user, reassigns the host if needed,
/// deletes the lobby when the last member leaves, and advances the round if
/// the departure made the remaining members unanimous.
///
/// # Errors
///
/// Returns `LobbyNotFound` or `UserNotInLobby`.
pub async fn handle_leave_lobby(
    command: &LeaveLobby,
    clock: &dyn Clock,
    repo: &dyn LobbyRepository,
) -> Result<LeaveOutcome, DomainError> {
    let mut tx = repo.begin().await?;
    let mut lobby = lock_or_not_found(tx.as_mut(), &command.lobby_code).await?;

    let member = lobby
        .member(&command.user_id)
        .ok_or_else(|| DomainError::UserNotInLobby {
            user: command.user_id.clone(),
            lobby: lobby.code.clone(),
        })?;
    let was_ready = member.ready;
    let mut departing = member.clone();
    departing.lobby_code = None;
    departing.ready = false;

    lobby.users.retain(|u| u.id != command.user_id);
    if was_ready && lobby.in_progress() {
        lobby.users_submitted -= 1;
    }
    tx.upsert_user(&departing).await?;

    if lobby.users.is_empty() {
        tx.delete_stories(&lobby.code).await?;
        tx.delete_lobby(&lobby.code).await?;
        tx.commit().await?;
        tracing::info!(lobby = %lobby.code, "last member left, lobby deleted");
        return Ok(LeaveOutcome {
            lobby: None,
            advanced: false,
        });
    }

    if lobby.host_id == command.user_id {
        lobby.host_id = lobby.users[0].id.clone();
        tracing::info!(lobby = %lobby.code, host = %lobby.host_id, "host reassigned");
    }

    let mut advanced = false;
    if lobby.in_progress() && lobby.all_submitted() {
        advance_locked(tx.as_mut(), &mut lobby, clock).await?;
        advanced = true;
    }

    tx.update_lobby(&lobby).await?;
    tx.commit().await?;

    tracing::info!(lobby = %lobby.code, user = %command.user_id, "user left");
    Ok(LeaveOutcome {
        lobby: Some(lobby),
        advanced,
    })
}

/// Handles `StartGame`: creates one story per member (rotation-ordered,
/// owned by its opening writer) and moves the lobby into round 1.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `UserNotHost`, `GameAlreadyStarted`, or
/// `InvalidRequest` when the lobby is too small to play.
pub async fn handle_start_game(
    command: &StartGame,
    clock: &dyn Clock,
    repo: &dyn LobbyRepository,
) -> Result<Lobby, DomainError> {
    let now = clock.now();
    let mut tx = repo.begin().await?;
    let mut lobby = lock_or_not_found(tx.as_mut(), &command.lobby_code).await?;

    transitions::ensure_host(&lobby, &command.user_id)?;
    if lobby.round != ROUND_NOT_STARTED {
        return Err(DomainError::GameAlreadyStarted(lobby.code.clone()));
    }
    if lobby.users.len() < usize::from(storyloom_core::settings::MIN_PLAYERS) {
        return Err(DomainError::InvalidRequest(
            "a game needs at least two players".to_owned(),
        ));
    }

    let order = shuffled_members(&lobby.code, &lobby.member_ids());
    let plan = RotationPlan::new(&lobby.code, order.len());
    for (row, user_id) in order.iter().enumerate() {
        // Every row is in range and opens a story, by construction.
        let index = plan
            .story_index(row, 1)
            .and_then(|i| i32::try_from(i).ok())
            .expect("rotation row opens a story");
        let nickname = lobby
            .member(user_id)
            .map_or_else(|| user_id.to_string(), |u| u.nickname.clone());
        let story = Story::new(
            lobby.code.clone(),
            index,
            user_id.clone(),
            format!("{nickname}'s story"),
        );
        tx.insert_story(&story).await?;
    }

    transitions::begin_round(&mut lobby, 1, now);
    tx.update_lobby(&lobby).await?;
    tx.commit().await?;

    tracing::info!(lobby = %lobby.code, players = lobby.users.len(), "game started");
    Ok(lobby)
}

fn validate_batch(
    drafts: &[crate::domain::commands::ElementDraft],
    caps: &ElementCaps,
) -> Result<(), DomainError> {
    if drafts.is_empty() {
        return Err(DomainError::InvalidRequest(
            "a submission needs at least one element".to_owned(),
        ));
    }
    if drafts.iter().any(|d| d.kind == ElementKind::Empty) {
        return Err(DomainError::InvalidRequest(
            "empty placeholders are written by the server".to_owned(),
        ));
    }
    for kind in [
        ElementKind::Text,
        ElementKind::Image,
        ElementKind::Audio,
        ElementKind::Drawing,
    ] {
        if let Some(cap) = caps.for_kind(kind) {
            let count = drafts.iter().filter(|d| d.kind == kind).count();
            if count > usize::from(cap) {
                return Err(DomainError::InvalidRequest(format!(
                    "too many {} elements (cap is {cap})",
                    kind.as_str()
                )));
            }
        }
    }
    Ok(())
}

/// Handles `SubmitElements`: writes the caller's batch into their assigned
/// story for the current round and marks them ready. When the caller is the
/// last one missing, the round advances inside the same transaction.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `GameNotStarted`, `UserNotInLobby`,
/// `UserAlreadySubmitted`, or `InvalidRequest` (cap violations).
pub async fn handle_submit_elements(
    command: &SubmitElements,
    clock: &dyn Clock,
    repo: &dyn LobbyRepository,
) -> Result<SubmitOutcome, DomainError> {
    let mut tx = repo.begin().await?;
    let mut lobby = lock_or_not_found(tx.as_mut(), &command.lobby_code).await?;

    validate_batch(&command.elements, &lobby.settings.caps)?;
    transitions::mark_submitted(&mut lobby, &command.user_id)?;

    let round = lobby.round;
    let stories = tx.fetch_stories(&lobby.code).await?;
    let story_id = assignment::assigned_story(&lobby.code, &stories, &command.user_id, round)?.id;

    let mut elements = Vec::with_capacity(command.elements.len());
    let mut index = 0_i32;
    for draft in &command.elements {
        elements.push(StoryElement {
            story_id,
            author_id: command.user_id.clone(),
            index,
            round,
            kind: draft.kind,
            payload: draft.payload.clone(),
        });
        index += 1;
    }
    tx.replace_elements(story_id, &command.user_id, &elements)
        .await?;

    let member = lobby
        .member(&command.user_id)
        .cloned()
        .ok_or_else(|| DomainError::UserNotInLobby {
            user: command.user_id.clone(),
            lobby: lobby.code.clone(),
        })?;
    tx.upsert_user(&member).await?;

    let mut advanced = false;
    if lobby.all_submitted() {
        advance_locked(tx.as_mut(), &mut lobby, clock).await?;
        advanced = true;
    }

    tx.update_lobby(&lobby).await?;
    tx.commit().await?;

    tracing::debug!(
        lobby = %lobby.code,
        user = %command.user_id,
        submitted = lobby.users_submitted,
        advanced,
        "submission recorded"
    );
    Ok(SubmitOutcome { lobby, advanced })
}

/// Handles `UnsubmitElements`: retracts the caller's submission so they can
/// revise before the round ends. Their elements are truncated.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `GameNotStarted`, `UserNotInLobby`, or
/// `UserNotSubmitted`.
pub async fn handle_unsubmit_elements(
    command: &UnsubmitElements,
    repo: &dyn LobbyRepository,
) -> Result<Lobby, DomainError> {
    let mut tx = repo.begin().await?;
    let mut lobby = lock_or_not_found(tx.as_mut(), &command.lobby_code).await?;

    transitions::mark_unsubmitted(&mut lobby, &command.user_id)?;

    let stories = tx.fetch_stories(&lobby.code).await?;
    let story_id =
        assignment::assigned_story(&lobby.code, &stories, &command.user_id, lobby.round)?.id;
    tx.replace_elements(story_id, &command.user_id, &[]).await?;

    let member = lobby
        .member(&command.user_id)
        .cloned()
        .ok_or_else(|| DomainError::UserNotInLobby {
            user: command.user_id.clone(),
            lobby: lobby.code.clone(),
        })?;
    tx.upsert_user(&member).await?;
    tx.update_lobby(&lobby).await?;
    tx.commit().await?;

    Ok(lobby)
}

/// Handles `AdvanceRound`, the timeout path. Returns `Ok(None)` without
/// touching anything when the lobby is gone or has already moved past
/// `expected_round`, so racing timers and submissions advance a round
/// exactly once.
///
/// # Errors
///
/// Returns `DomainError::Store` on persistence failure.
pub async fn handle_advance_round(
    command: &AdvanceRound,
    clock: &dyn Clock,
    repo: &dyn LobbyRepository,
) -> Result<Option<Lobby>, DomainError> {
    let mut tx = repo.begin().await?;
    let Some(mut lobby) = tx.lock_lobby(&command.lobby_code).await? else {
        tx.rollback().await?;
        return Ok(None);
    };
    if lobby.round != command.expected_round {
        tracing::debug!(
            lobby = %lobby.code,
            round = lobby.round,
            expected = command.expected_round,
            "stale advance attempt ignored"
        );
        tx.rollback().await?;
        return Ok(None);
    }

    advance_locked(tx.as_mut(), &mut lobby, clock).await?;
    tx.update_lobby(&lobby).await?;
    tx.commit().await?;

    Ok(Some(lobby))
}

/// Handles `EndGame` (host only): deletes every story and element of the
/// lobby and returns it to the not-started state.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `UserNotHost`, or `GameNotStarted`.
pub async fn handle_end_game(
    command: &EndGame,
    repo: &dyn LobbyRepository,
) -> Result<Lobby, DomainError> {
    let mut tx = repo.begin().await?;
    let mut lobby = lock_or_not_found(tx.as_mut(), &command.lobby_code).await?;

    transitions::ensure_host(&lobby, &command.user_id)?;
    if lobby.round == ROUND_NOT_STARTED {
        return Err(DomainError::GameNotStarted(lobby.code.clone()));
    }

    tx.delete_stories(&lobby.code).await?;
    tx.clear_ready(&lobby.code).await?;
    transitions::reset_to_lobby(&mut lobby);
    tx.update_lobby(&lobby).await?;
    tx.commit().await?;

    tracing::info!(lobby = %lobby.code, "game ended by host");
    Ok(lobby)
}

fn apply_settings(
    lobby: &mut Lobby,
    settings: storyloom_core::settings::LobbySettings,
) -> Result<(), DomainError> {
    settings.validate()?;
    if lobby.in_progress() {
        return Err(DomainError::InvalidRequest(
            "settings are locked while a game is in progress".to_owned(),
        ));
    }
    if usize::from(settings.max_players) < lobby.users.len() {
        return Err(DomainError::InvalidRequest(
            "max_players cannot be lower than the current member count".to_owned(),
        ));
    }
    lobby.settings = settings;
    Ok(())
}

/// Handles `SubmitSettings` (host only): replaces the whole settings block.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `UserNotHost`, or `InvalidRequest`.
pub async fn handle_submit_settings(
    command: &SubmitSettings,
    repo: &dyn LobbyRepository,
) -> Result<Lobby, DomainError> {
    let mut tx = repo.begin().await?;
    let mut lobby = lock_or_not_found(tx.as_mut(), &command.lobby_code).await?;

    transitions::ensure_host(&lobby, &command.user_id)?;
    apply_settings(&mut lobby, command.settings.clone())?;
    tx.update_lobby(&lobby).await?;
    tx.commit().await?;

    Ok(lobby)
}

/// Handles `UpdateSetting` (host only): applies a single-field change.
///
/// # Errors
///
/// Returns `LobbyNotFound`, `UserNotHost`, or `InvalidRequest`.
pub async fn handle_update_setting(
    command: &UpdateSetting,
    repo: &dyn LobbyRepository,
) -> Result<Lobby, DomainError> {
    let mut tx = repo.begin().await?;
    let mut lobby = lock_or_not_found(tx.as_mut(), &command.lobby_code).await?;

    transitions::ensure_host(&lobby, &command.user_id)?;
    let mut settings = lobby.settings.clone();
    match &command.change {
        SettingChange::MaxPlayers(value) => settings.max_players = *value,
        SettingChange::RoundSeconds(value) => settings.round_seconds = *value,
        SettingChange::TimerMode(mode) => settings.timer_mode = *mode,
        SettingChange::ElementCap { kind, value } => match kind {
            ElementKind::Text => settings.caps.text = *value,
            ElementKind::Image => settings.caps.image = *value,
            ElementKind::Audio => settings.caps.audio = *value,
            ElementKind::Drawing => settings.caps.drawing = *value,
            ElementKind::Empty | ElementKind::Place => {
                return Err(DomainError::InvalidRequest(format!(
                    "{} elements carry no cap",
                    kind.as_str()
                )));
            }
        },
    }
    apply_settings(&mut lobby, settings)?;
    tx.update_lobby(&lobby).await?;
    tx.commit().await?;

    Ok(lobby)
}

/// The shared advance step: reconcile missing submissions, reset readiness,
/// then either move to the next round or finish the game. Runs inside the
/// caller's transaction, before its `update_lobby`/`commit`.
pub(crate) async fn advance_locked(
    tx: &mut (dyn LobbyTransaction + '_),
    lobby: &mut Lobby,
    clock: &dyn Clock,
) -> Result<(), DomainError> {
    let round = lobby.round;
    let stories = tx.fetch_stories(&lobby.code).await?;
    reconciler::backfill_missing(tx, &stories, round).await?;

    tx.clear_ready(&lobby.code).await?;
    for user in &mut lobby.users {
        user.ready = false;
    }

    let rounds_total = i32::try_from(stories.len()).unwrap_or(i32::MAX);
    if round >= rounds_total {
        transitions::finish_game(lobby);
        tracing::info!(lobby = %lobby.code, "game finished");
    } else {
        transitions::begin_round(lobby, round + 1, clock.now());
        tracing::info!(lobby = %lobby.code, round = lobby.round, "round advanced");
    }
    Ok(())
}
