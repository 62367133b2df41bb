//! Player records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LobbyCode, UserId};

/// A connected (or recently connected) player.
///
/// Upserted on every connect/join; the row outlives individual socket
/// connections so a reconnecting client resumes its seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Client-generated identifier, stable across reconnects.
    pub id: UserId,
    /// Display name.
    pub nickname: String,
    /// The lobby this user currently sits in, if any.
    pub lobby_code: Option<LobbyCode>,
    /// Whether the user has submitted in the current round.
    pub ready: bool,
    /// When the user joined their current lobby (orders the member list).
    pub joined_at: DateTime<Utc>,
    /// Last time any request arrived from this user.
    pub last_active_at: DateTime<Utc>,
}

impl User {
    /// Creates a user with no lobby membership.
    #[must_use]
    pub fn new(id: UserId, nickname: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            nickname,
            lobby_code: None,
            ready: false,
            joined_at: now,
            last_active_at: now,
        }
    }
}
