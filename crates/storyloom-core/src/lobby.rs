//! The lobby aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LobbyCode, UserId};
use crate::settings::LobbySettings;
use crate::user::User;

/// `round` value for a lobby whose game has not started.
pub const ROUND_NOT_STARTED: i32 = 0;
/// `round` value for a lobby whose game has finished.
pub const ROUND_FINISHED: i32 = -1;

/// A named group of players sharing one game session.
///
/// Invariants: `users_submitted` is always in `[0, users.len()]`; `round` is
/// always `-1`, `0`, or `1..=users.len()` (as of game start).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobby {
    /// Short unique lobby code.
    pub code: LobbyCode,
    /// The member allowed to start/end the game and change settings.
    pub host_id: UserId,
    /// 0 = not started, -1 = finished, positive = current round number.
    pub round: i32,
    /// How many members have submitted in the current round.
    pub users_submitted: i32,
    /// When the current round started (with client grace applied).
    pub round_started_at: Option<DateTime<Utc>>,
    /// When the current round ends; `None` when the timer is off.
    pub round_ends_at: Option<DateTime<Utc>>,
    /// Host-configurable settings.
    pub settings: LobbySettings,
    /// Members ordered by join time.
    pub users: Vec<User>,
}

impl Lobby {
    /// Creates a fresh lobby with the given host as its only member.
    #[must_use]
    pub fn new(code: LobbyCode, host: User) -> Self {
        Self {
            code,
            host_id: host.id.clone(),
            round: ROUND_NOT_STARTED,
            users_submitted: 0,
            round_started_at: None,
            round_ends_at: None,
            settings: LobbySettings::default(),
            users: vec![host],
        }
    }

    /// Whether a game is currently in progress.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.round > 0
    }

    /// Whether the game has finished its final round.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.round == ROUND_FINISHED
    }

    /// Looks up a member by id.
    #[must_use]
    pub fn member(&self, user_id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == user_id)
    }

    /// Mutable member lookup.
    pub fn member_mut(&mut self, user_id: &UserId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| &u.id == user_id)
    }

    /// Whether the given user is the lobby host.
    #[must_use]
    pub fn is_host(&self, user_id: &UserId) -> bool {
        &self.host_id == user_id
    }

    /// Whether the lobby is at its configured player cap.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.users.len() >= usize::from(self.settings.max_players)
    }

    /// Whether every current member has submitted this round.
    #[must_use]
    pub fn all_submitted(&self) -> bool {
        usize::try_from(self.users_submitted).unwrap_or(0) >= self.users.len()
    }

    /// Member ids in join order; this order feeds the rotation scheduler.
    #[must_use]
    pub fn member_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|u| u.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn lobby_with_members(n: usize) -> Lobby {
        let now = Utc::now();
        let host = User::new(UserId::from("u0"), "player-0".into(), now);
        let mut lobby = Lobby::new(LobbyCode::from("ABCDE"), host);
        for i in 1..n {
            lobby.users.push(User::new(
                UserId::from(format!("u{i}")),
                format!("player-{i}"),
                now,
            ));
        }
        lobby
    }

    #[test]
    fn test_new_lobby_is_not_started() {
        let lobby = lobby_with_members(1);
        assert_eq!(lobby.round, ROUND_NOT_STARTED);
        assert!(!lobby.in_progress());
        assert!(!lobby.finished());
    }

    #[test]
    fn test_host_is_first_member() {
        let lobby = lobby_with_members(3);
        assert!(lobby.is_host(&UserId::from("u0")));
        assert!(!lobby.is_host(&UserId::from("u1")));
    }

    #[test]
    fn test_all_submitted_tracks_member_count() {
        let mut lobby = lobby_with_members(3);
        lobby.users_submitted = 2;
        assert!(!lobby.all_submitted());
        lobby.users_submitted = 3;
        assert!(lobby.all_submitted());
    }

    #[test]
    fn test_is_full_respects_settings_cap() {
        let mut lobby = lobby_with_members(2);
        lobby.settings.max_players = 2;
        assert!(lobby.is_full());
    }
}
