//! Round state machine rules.
//!
//! Pure validate-then-mutate functions over the lobby aggregate. Handlers
//! call these while holding the lobby row lock; nothing here touches the
//! store.

use chrono::{DateTime, Duration, Utc};

use storyloom_core::error::DomainError;
use storyloom_core::ids::UserId;
use storyloom_core::lobby::{Lobby, ROUND_FINISHED, ROUND_NOT_STARTED};

/// Head start, in seconds, given to clients so the updated state arrives
/// before the timer visibly starts counting.
pub const CLIENT_GRACE_SECONDS: i64 = 2;

/// The client grace as a duration.
#[must_use]
pub fn client_grace() -> Duration {
    Duration::seconds(CLIENT_GRACE_SECONDS)
}

/// Fails unless the user is a member of the lobby.
///
/// # Errors
///
/// Returns `DomainError::UserNotInLobby` otherwise.
pub fn ensure_member(lobby: &Lobby, user_id: &UserId) -> Result<(), DomainError> {
    if lobby.member(user_id).is_some() {
        Ok(())
    } else {
        Err(DomainError::UserNotInLobby {
            user: user_id.clone(),
            lobby: lobby.code.clone(),
        })
    }
}

/// Fails unless the user is the lobby host.
///
/// # Errors
///
/// Returns `DomainError::UserNotHost` otherwise.
pub fn ensure_host(lobby: &Lobby, user_id: &UserId) -> Result<(), DomainError> {
    if lobby.is_host(user_id) {
        Ok(())
    } else {
        Err(DomainError::UserNotHost {
            user: user_id.clone(),
            lobby: lobby.code.clone(),
        })
    }
}

/// Moves the lobby into the given round: resets the submission tally and
/// computes the round window from the settings (no deadline when the timer
/// is off).
pub fn begin_round(lobby: &mut Lobby, round: i32, now: DateTime<Utc>) {
    let started_at = now + client_grace();
    lobby.round = round;
    lobby.users_submitted = 0;
    lobby.round_started_at = Some(started_at);
    lobby.round_ends_at = lobby
        .settings
        .round_duration()
        .map(|duration| started_at + duration);
}

/// Marks the lobby finished and clears the round window.
pub fn finish_game(lobby: &mut Lobby) {
    lobby.round = ROUND_FINISHED;
    lobby.users_submitted = 0;
    lobby.round_started_at = None;
    lobby.round_ends_at = None;
}

/// Returns the lobby to the not-started state (host ended the game).
pub fn reset_to_lobby(lobby: &mut Lobby) {
    lobby.round = ROUND_NOT_STARTED;
    lobby.users_submitted = 0;
    lobby.round_started_at = None;
    lobby.round_ends_at = None;
    for user in &mut lobby.users {
        user.ready = false;
    }
}

/// Records a submission for the user: sets `ready` and bumps the tally.
/// Idempotence against duplicate submissions rests on the `ready` check
/// running under the lobby row lock.
///
/// # Errors
///
/// Returns `GameNotStarted`, `UserNotInLobby`, or `UserAlreadySubmitted`.
pub fn mark_submitted(lobby: &mut Lobby, user_id: &UserId) -> Result<(), DomainError> {
    if !lobby.in_progress() {
        return Err(DomainError::GameNotStarted(lobby.code.clone()));
    }
    let code = lobby.code.clone();
    let member = lobby
        .member_mut(user_id)
        .ok_or_else(|| DomainError::UserNotInLobby {
            user: user_id.clone(),
            lobby: code,
        })?;
    if member.ready {
        return Err(DomainError::UserAlreadySubmitted(user_id.clone()));
    }
    member.ready = true;
    lobby.users_submitted += 1;
    Ok(())
}

/// Retracts the user's submission: clears `ready` and decrements the tally.
///
/// # Errors
///
/// Returns `GameNotStarted`, `UserNotInLobby`, or `UserNotSubmitted`.
pub fn mark_unsubmitted(lobby: &mut Lobby, user_id: &UserId) -> Result<(), DomainError> {
    if !lobby.in_progress() {
        return Err(DomainError::GameNotStarted(lobby.code.clone()));
    }
    let code = lobby.code.clone();
    let member = lobby
        .member_mut(user_id)
        .ok_or_else(|| DomainError::UserNotInLobby {
            user: user_id.clone(),
            lobby: code,
        })?;
    if !member.ready {
        return Err(DomainError::UserNotSubmitted(user_id.clone()));
    }
    member.ready = false;
    lobby.users_submitted -= 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use storyloom_core::ids::LobbyCode;
    use storyloom_core::settings::TimerMode;
    use storyloom_core::user::User;

    use super::*;

    fn lobby_of(n: usize) -> Lobby {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let host = User::new(UserId::from("u0"), "player-0".into(), now);
        let mut lobby = Lobby::new(LobbyCode::from("ABCDE"), host);
        for i in 1..n {
            let mut user = User::new(UserId::from(format!("u{i}")), format!("player-{i}"), now);
            user.lobby_code = Some(lobby.code.clone());
            lobby.users.push(user);
        }
        lobby
    }

    #[test]
    fn test_begin_round_applies_client_grace_and_duration() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut lobby = lobby_of(3);

        begin_round(&mut lobby, 1, now);

        assert_eq!(lobby.round, 1);
        assert_eq!(lobby.users_submitted, 0);
        assert_eq!(lobby.round_started_at, Some(now + client_grace()));
        assert_eq!(
            lobby.round_ends_at,
            Some(now + client_grace() + chrono::Duration::seconds(180))
        );
    }

    #[test]
    fn test_begin_round_with_timer_off_has_no_deadline() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut lobby = lobby_of(3);
        lobby.settings.timer_mode = TimerMode::Off;

        begin_round(&mut lobby, 1, now);

        assert_eq!(lobby.round_ends_at, None);
    }

    #[test]
    fn test_duplicate_submission_is_rejected() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut lobby = lobby_of(3);
        begin_round(&mut lobby, 1, now);

        mark_submitted(&mut lobby, &UserId::from("u1")).unwrap();
        let err = mark_submitted(&mut lobby, &UserId::from("u1")).unwrap_err();

        assert!(matches!(err, DomainError::UserAlreadySubmitted(_)));
        assert_eq!(lobby.users_submitted, 1);
    }

    #[test]
    fn test_submission_requires_game_in_progress() {
        let mut lobby = lobby_of(3);
        let err = mark_submitted(&mut lobby, &UserId::from("u1")).unwrap_err();
        assert!(matches!(err, DomainError::GameNotStarted(_)));
    }

    #[test]
    fn test_unsubmit_requires_prior_submission() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut lobby = lobby_of(3);
        begin_round(&mut lobby, 1, now);

        let err = mark_unsubmitted(&mut lobby, &UserId::from("u1")).unwrap_err();
        assert!(matches!(err, DomainError::UserNotSubmitted(_)));

        mark_submitted(&mut lobby, &UserId::from("u1")).unwrap();
        mark_unsubmitted(&mut lobby, &UserId::from("u1")).unwrap();
        assert_eq!(lobby.users_submitted, 0);
    }

    #[test]
    fn test_finish_game_clears_round_window() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut lobby = lobby_of(3);
        begin_round(&mut lobby, 3, now);

        finish_game(&mut lobby);

        assert_eq!(lobby.round, ROUND_FINISHED);
        assert_eq!(lobby.round_started_at, None);
        assert_eq!(lobby.round_ends_at, None);
    }

    #[test]
    fn test_reset_to_lobby_clears_ready_flags() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut lobby = lobby_of(2);
        begin_round(&mut lobby, 1, now);
        mark_submitted(&mut lobby, &UserId::from("u1")).unwrap();

        reset_to_lobby(&mut lobby);

        assert_eq!(lobby.round, ROUND_NOT_STARTED);
        assert!(lobby.users.iter().all(|u| !u.ready));
    }
}
