//! Outbound event seam.
//!
//! The round coordinator publishes every state change through this trait so
//! transitions triggered by timers are broadcast exactly like those triggered
//! by player requests. The gateway implements it over its socket registry;
//! tests record the published events.

use async_trait::async_trait;

use crate::ids::{LobbyCode, UserId};
use crate::lobby::Lobby;
use crate::settings::LobbySettings;

/// A state change worth announcing to a lobby's members.
#[derive(Debug, Clone)]
pub enum LobbyEvent {
    /// Full lobby refresh (membership changed, game started, host moved).
    LobbyState(Lobby),
    /// The submitted-count changed mid-round.
    SubmittedCount {
        /// The lobby concerned.
        code: LobbyCode,
        /// New number of ready members.
        users_submitted: i32,
    },
    /// The round counter moved (including into the finished state).
    RoundAdvanced(Lobby),
    /// The host ended the game; stories are gone.
    GameEnded(Lobby),
    /// The last member left and the lobby was deleted.
    LobbyDeleted(LobbyCode),
    /// The host changed lobby settings; addressed to the other members.
    SettingsChanged {
        /// The lobby concerned.
        code: LobbyCode,
        /// The new settings.
        settings: LobbySettings,
        /// The member who made the change (already knows the new value).
        actor: UserId,
    },
    /// Results playback moved to another story part.
    PlaybackAdvanced {
        /// The lobby concerned.
        code: LobbyCode,
        /// 0-based story part now being played back.
        part: i32,
    },
}

impl LobbyEvent {
    /// The lobby this event belongs to.
    #[must_use]
    pub fn lobby_code(&self) -> &LobbyCode {
        match self {
            Self::LobbyState(lobby) | Self::RoundAdvanced(lobby) | Self::GameEnded(lobby) => {
                &lobby.code
            }
            Self::SubmittedCount { code, .. }
            | Self::LobbyDeleted(code)
            | Self::SettingsChanged { code, .. }
            | Self::PlaybackAdvanced { code, .. } => code,
        }
    }
}

/// Sink for lobby events.
#[async_trait]
pub trait LobbyNotifier: Send + Sync {
    /// Delivers the event to the lobby's members. Delivery is best-effort;
    /// the coordinator never fails a transition because a socket is gone.
    async fn publish(&self, event: LobbyEvent);
}
