//! Stories and their elements.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{LobbyCode, UserId};

/// Content type of a story element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Literal text written by a player.
    Text,
    /// URL of an uploaded image.
    Image,
    /// URL of an uploaded audio clip.
    Audio,
    /// Serialized drawing payload.
    Drawing,
    /// Placeholder inserted for a player who failed to submit in time.
    Empty,
    /// Named location marker.
    Place,
}

impl ElementKind {
    /// Stable string tag used for persistence and the wire protocol.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Drawing => "drawing",
            Self::Empty => "empty",
            Self::Place => "place",
        }
    }

    /// Parses a persisted tag back into a kind.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "drawing" => Some(Self::Drawing),
            "empty" => Some(Self::Empty),
            "place" => Some(Self::Place),
            _ => None,
        }
    }
}

/// One fragment of a story, authored by one player in one round.
///
/// `(story_id, author_id, index)` is unique. Because the rotation assigns
/// each player to each story at most once per game, an author's elements in
/// a story all belong to a single round; `index` orders them within that
/// contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryElement {
    /// Owning story.
    pub story_id: Uuid,
    /// The player who authored this element.
    pub author_id: UserId,
    /// Position within the author's contribution.
    pub index: i32,
    /// Round in which the element was authored.
    pub round: i32,
    /// Content type tag.
    pub kind: ElementKind,
    /// Opaque content: URL, serialized drawing, or literal text.
    pub payload: String,
}

impl StoryElement {
    /// Builds the placeholder inserted when a player misses a round.
    #[must_use]
    pub fn placeholder(story_id: Uuid, author_id: UserId, round: i32) -> Self {
        Self {
            story_id,
            author_id,
            index: 0,
            round,
            kind: ElementKind::Empty,
            payload: String::new(),
        }
    }
}

/// One evolving narrative, written into by a different player each round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Story identifier.
    pub id: Uuid,
    /// 0-based position in the lobby's rotation.
    pub index: i32,
    /// Owning lobby.
    pub lobby_code: LobbyCode,
    /// The original contributor (the player who opens this story in round 1).
    /// Anchors the user-to-rotation-row mapping across restarts and leaves.
    pub owner_id: UserId,
    /// Display name, derived from the original contributor's nickname.
    pub name: String,
    /// Elements ordered by round, then by index within each contribution.
    pub elements: Vec<StoryElement>,
}

impl Story {
    /// Creates an empty story at the given rotation slot.
    #[must_use]
    pub fn new(lobby_code: LobbyCode, index: i32, owner_id: UserId, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            lobby_code,
            owner_id,
            name,
            elements: Vec::new(),
        }
    }

}
