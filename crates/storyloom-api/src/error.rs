//! Storyloom API — error surfacing.

use storyloom_core::error::{DomainError, ErrorClass};
use thiserror::Error;

/// Startup and runtime errors for the gateway binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Machine-readable code naming the failure category on the wire.
#[must_use]
pub fn error_code(err: &DomainError) -> &'static str {
    match err {
        DomainError::LobbyNotFound(_) => "lobby_not_found",
        DomainError::UserNotFound(_) => "user_not_found",
        DomainError::StoryNotFound { .. } => "story_not_found",
        DomainError::UserNotInLobby { .. } => "user_not_in_lobby",
        DomainError::UserNotHost { .. } => "user_not_host",
        DomainError::LobbyMaxPlayersReached(_) => "lobby_max_players_reached",
        DomainError::GameAlreadyStarted(_) => "game_already_started",
        DomainError::GameNotStarted(_) => "game_not_started",
        DomainError::UserAlreadySubmitted(_) => "user_already_submitted",
        DomainError::UserNotSubmitted(_) => "user_not_submitted",
        DomainError::InvalidRequest(_) => "invalid_request",
        DomainError::Store(_) => "store_error",
    }
}

/// Logs a rejected operation at the severity its category calls for:
/// not-found and invariant violations are routine (warn), authorization
/// rejections and store failures are not (error).
pub fn log_rejection(operation: &str, err: &DomainError) {
    match err.class() {
        ErrorClass::NotFound | ErrorClass::InvariantViolation => {
            tracing::warn!(operation, error = %err, "request rejected");
        }
        ErrorClass::Authorization | ErrorClass::Infrastructure => {
            tracing::error!(operation, error = %err, "request rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use storyloom_core::error::StoreError;
    use storyloom_core::ids::{LobbyCode, UserId};

    use super::*;

    #[test]
    fn test_not_found_maps_to_lobby_not_found_code() {
        let err = DomainError::LobbyNotFound(LobbyCode::from("ABCDE"));
        assert_eq!(error_code(&err), "lobby_not_found");
    }

    #[test]
    fn test_authorization_maps_to_user_not_host_code() {
        let err = DomainError::UserNotHost {
            user: UserId::from("u1"),
            lobby: LobbyCode::from("ABCDE"),
        };
        assert_eq!(error_code(&err), "user_not_host");
    }

    #[test]
    fn test_duplicate_submission_maps_to_terminal_code() {
        let err = DomainError::UserAlreadySubmitted(UserId::from("u1"));
        assert_eq!(error_code(&err), "user_already_submitted");
    }

    #[test]
    fn test_store_failure_maps_to_store_error_code() {
        let err = DomainError::from(StoreError::Backend("connection refused".into()));
        assert_eq!(error_code(&err), "store_error");
    }
}
