//! Domain error types.

use thiserror::Error;

use crate::ids::{LobbyCode, UserId};

/// Severity class used by transports to decide how loudly to surface a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The referenced entity does not exist; non-fatal for the caller.
    NotFound,
    /// A non-host attempted a host-only action.
    Authorization,
    /// The request contradicts current state (e.g. duplicate submission);
    /// terminal for this attempt, never retried.
    InvariantViolation,
    /// Store/transport failure; the whole request may be retried.
    Infrastructure,
}

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No lobby exists with the given code.
    #[error("lobby not found: {0}")]
    LobbyNotFound(LobbyCode),

    /// No user row exists for the given identifier.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// No story exists at the given rotation slot.
    #[error("story not found in lobby {lobby}: index {index}")]
    StoryNotFound {
        /// The lobby that was searched.
        lobby: LobbyCode,
        /// The rotation slot that was requested.
        index: i32,
    },

    /// The user is not a member of the lobby they addressed.
    #[error("user {user} is not in lobby {lobby}")]
    UserNotInLobby {
        /// The offending user.
        user: UserId,
        /// The addressed lobby.
        lobby: LobbyCode,
    },

    /// A host-only action was attempted by a non-host member.
    #[error("user {user} is not the host of lobby {lobby}")]
    UserNotHost {
        /// The offending user.
        user: UserId,
        /// The addressed lobby.
        lobby: LobbyCode,
    },

    /// The lobby is at its configured player cap.
    #[error("lobby {0} has reached its maximum player count")]
    LobbyMaxPlayersReached(LobbyCode),

    /// The game is already past the `NOT_STARTED` state.
    #[error("game already started in lobby {0}")]
    GameAlreadyStarted(LobbyCode),

    /// The action requires a game in progress.
    #[error("game not started in lobby {0}")]
    GameNotStarted(LobbyCode),

    /// The user already submitted this round.
    #[error("user {0} already submitted this round")]
    UserAlreadySubmitted(UserId),

    /// The user has no submission to retract this round.
    #[error("user {0} has not submitted this round")]
    UserNotSubmitted(UserId),

    /// A submission exceeded the lobby's per-type content caps, or a
    /// settings update was out of bounds.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An infrastructure/persistence error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    /// Classifies the error per the coordinator's taxonomy.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::LobbyNotFound(_) | Self::UserNotFound(_) | Self::StoryNotFound { .. } => {
                ErrorClass::NotFound
            }
            Self::UserNotHost { .. } => ErrorClass::Authorization,
            Self::UserNotInLobby { .. }
            | Self::LobbyMaxPlayersReached(_)
            | Self::GameAlreadyStarted(_)
            | Self::GameNotStarted(_)
            | Self::UserAlreadySubmitted(_)
            | Self::UserNotSubmitted(_)
            | Self::InvalidRequest(_) => ErrorClass::InvariantViolation,
            Self::Store(_) => ErrorClass::Infrastructure,
        }
    }
}

/// Failure surfaced by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, transaction, or query failure in the backing store.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A persisted row could not be mapped back into the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}
