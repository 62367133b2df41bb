//! Lobby configuration.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::story::ElementKind;

/// Smallest playable lobby.
pub const MIN_PLAYERS: u8 = 2;
/// Hard cap on configurable lobby size.
pub const MAX_PLAYERS_LIMIT: u8 = 12;
/// Bounds for the configurable round duration, in seconds.
pub const ROUND_SECONDS_RANGE: std::ops::RangeInclusive<u16> = 30..=600;

/// Round timer behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    /// No deadline; rounds advance only when every player has submitted.
    Off,
    /// Rounds last the configured duration.
    Normal,
    /// Rounds last half the configured duration.
    Fast,
}

/// Per-type caps on how many elements one submission may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCaps {
    /// Maximum text fragments per submission.
    pub text: u8,
    /// Maximum image links per submission.
    pub image: u8,
    /// Maximum audio clips per submission.
    pub audio: u8,
    /// Maximum drawings per submission.
    pub drawing: u8,
}

impl Default for ElementCaps {
    fn default() -> Self {
        Self {
            text: 3,
            image: 2,
            audio: 1,
            drawing: 1,
        }
    }
}

impl ElementCaps {
    /// Cap for the given element kind. Placeholder kinds are never
    /// client-submitted and carry no cap.
    #[must_use]
    pub fn for_kind(&self, kind: ElementKind) -> Option<u8> {
        match kind {
            ElementKind::Text => Some(self.text),
            ElementKind::Image => Some(self.image),
            ElementKind::Audio => Some(self.audio),
            ElementKind::Drawing => Some(self.drawing),
            ElementKind::Empty | ElementKind::Place => None,
        }
    }
}

/// Host-configurable lobby settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbySettings {
    /// Maximum number of members.
    pub max_players: u8,
    /// Base round duration in seconds.
    pub round_seconds: u16,
    /// Round timer behavior.
    pub timer_mode: TimerMode,
    /// Per-type submission caps.
    pub caps: ElementCaps,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            max_players: 8,
            round_seconds: 180,
            timer_mode: TimerMode::Normal,
            caps: ElementCaps::default(),
        }
    }
}

impl LobbySettings {
    /// Effective round duration, or `None` when the timer is off.
    #[must_use]
    pub fn round_duration(&self) -> Option<chrono::Duration> {
        match self.timer_mode {
            TimerMode::Off => None,
            TimerMode::Normal => Some(chrono::Duration::seconds(i64::from(self.round_seconds))),
            TimerMode::Fast => Some(chrono::Duration::seconds(i64::from(self.round_seconds) / 2)),
        }
    }

    /// Validates the settings against the allowed bounds.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidRequest` when a field is out of range.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_players < MIN_PLAYERS || self.max_players > MAX_PLAYERS_LIMIT {
            return Err(DomainError::InvalidRequest(format!(
                "max_players must be between {MIN_PLAYERS} and {MAX_PLAYERS_LIMIT}"
            )));
        }
        if !ROUND_SECONDS_RANGE.contains(&self.round_seconds) {
            return Err(DomainError::InvalidRequest(format!(
                "round_seconds must be between {} and {}",
                ROUND_SECONDS_RANGE.start(),
                ROUND_SECONDS_RANGE.end()
            )));
        }
        Ok(())
    }
}
