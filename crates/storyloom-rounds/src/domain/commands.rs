//! Commands accepted by the round coordinator.

use storyloom_core::ids::{LobbyCode, UserId};
use storyloom_core::settings::{LobbySettings, TimerMode};
use storyloom_core::story::ElementKind;

/// A story element as submitted by a client, before it is bound to a story.
#[derive(Debug, Clone)]
pub struct ElementDraft {
    /// Content type tag.
    pub kind: ElementKind,
    /// Opaque content: URL, serialized drawing, or literal text.
    pub payload: String,
}

/// Create a new lobby with the caller as host.
#[derive(Debug, Clone)]
pub struct CreateLobby {
    /// The requesting user.
    pub user_id: UserId,
    /// Display name to register for the user.
    pub nickname: String,
}

/// Join an existing lobby.
#[derive(Debug, Clone)]
pub struct JoinLobby {
    /// The requesting user.
    pub user_id: UserId,
    /// Display name to register for the user.
    pub nickname: String,
    /// The lobby to join.
    pub lobby_code: LobbyCode,
}

/// Leave a lobby (explicit request or expired disconnect grace).
#[derive(Debug, Clone)]
pub struct LeaveLobby {
    /// The departing user.
    pub user_id: UserId,
    /// The lobby to leave.
    pub lobby_code: LobbyCode,
}

/// Start the game (host only).
#[derive(Debug, Clone)]
pub struct StartGame {
    /// The requesting user.
    pub user_id: UserId,
    /// The lobby to start.
    pub lobby_code: LobbyCode,
}

/// Submit the caller's story elements for the current round.
#[derive(Debug, Clone)]
pub struct SubmitElements {
    /// The submitting user.
    pub user_id: UserId,
    /// The lobby concerned.
    pub lobby_code: LobbyCode,
    /// The submitted batch, in display order.
    pub elements: Vec<ElementDraft>,
}

/// Retract the caller's submission so it can be revised.
#[derive(Debug, Clone)]
pub struct UnsubmitElements {
    /// The retracting user.
    pub user_id: UserId,
    /// The lobby concerned.
    pub lobby_code: LobbyCode,
}

/// Advance the round; issued by the round timer, never by clients.
#[derive(Debug, Clone)]
pub struct AdvanceRound {
    /// The lobby concerned.
    pub lobby_code: LobbyCode,
    /// The round the issuer believes is current. The handler is a no-op if
    /// the lobby has moved on, which makes racing advance attempts safe.
    pub expected_round: i32,
}

/// End the game and discard all stories (host only).
#[derive(Debug, Clone)]
pub struct EndGame {
    /// The requesting user.
    pub user_id: UserId,
    /// The lobby concerned.
    pub lobby_code: LobbyCode,
}

/// Replace the whole settings block (host only).
#[derive(Debug, Clone)]
pub struct SubmitSettings {
    /// The requesting user.
    pub user_id: UserId,
    /// The lobby concerned.
    pub lobby_code: LobbyCode,
    /// The new settings.
    pub settings: LobbySettings,
}

/// A single-field settings change (host only).
#[derive(Debug, Clone)]
pub enum SettingChange {
    /// Change the member cap.
    MaxPlayers(u8),
    /// Change the base round duration.
    RoundSeconds(u16),
    /// Change the timer behavior.
    TimerMode(TimerMode),
    /// Change one per-type submission cap.
    ElementCap {
        /// The capped content type.
        kind: ElementKind,
        /// New maximum per submission.
        value: u8,
    },
}

/// Apply a single-field settings change (host only).
#[derive(Debug, Clone)]
pub struct UpdateSetting {
    /// The requesting user.
    pub user_id: UserId,
    /// The lobby concerned.
    pub lobby_code: LobbyCode,
    /// The field to change.
    pub change: SettingChange,
}
