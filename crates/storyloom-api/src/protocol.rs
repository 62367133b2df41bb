//! The socket wire protocol.
//!
//! One tagged JSON enum in each direction. Frames are small and
//! self-describing; the `type` tag names the operation or event.

use serde::{Deserialize, Serialize};

use storyloom_core::ids::{LobbyCode, UserId};
use storyloom_core::lobby::Lobby;
use storyloom_core::settings::{LobbySettings, TimerMode};
use storyloom_core::story::{ElementKind, Story};
use storyloom_rounds::application::query_handlers::StoryPartView;
use storyloom_rounds::domain::commands::{ElementDraft, SettingChange};

/// One submitted element as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementPayload {
    /// Content type tag.
    pub kind: ElementKind,
    /// Opaque content: URL, serialized drawing, or literal text.
    pub payload: String,
}

impl From<ElementPayload> for ElementDraft {
    fn from(payload: ElementPayload) -> Self {
        Self {
            kind: payload.kind,
            payload: payload.payload,
        }
    }
}

/// A single-field settings change as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum SettingUpdate {
    /// Change the member cap.
    MaxPlayers {
        /// New cap.
        value: u8,
    },
    /// Change the base round duration.
    RoundSeconds {
        /// New duration in seconds.
        value: u16,
    },
    /// Change the timer behavior.
    TimerMode {
        /// New mode.
        value: TimerMode,
    },
    /// Change one per-type submission cap.
    ElementCap {
        /// The capped content type.
        kind: ElementKind,
        /// New maximum per submission.
        value: u8,
    },
}

impl From<SettingUpdate> for SettingChange {
    fn from(update: SettingUpdate) -> Self {
        match update {
            SettingUpdate::MaxPlayers { value } => Self::MaxPlayers(value),
            SettingUpdate::RoundSeconds { value } => Self::RoundSeconds(value),
            SettingUpdate::TimerMode { value } => Self::TimerMode(value),
            SettingUpdate::ElementCap { kind, value } => Self::ElementCap { kind, value },
        }
    }
}

/// Frames the client sends. `Hello` must come first on every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identifies the connection; the id is client-generated and stable
    /// across reconnects.
    Hello {
        /// The connecting user.
        user_id: UserId,
    },
    /// Create a lobby hosted by the caller.
    CreateLobby {
        /// Display name to register.
        nickname: String,
    },
    /// Join an existing lobby.
    JoinLobby {
        /// Display name to register.
        nickname: String,
        /// The lobby to join.
        lobby_code: LobbyCode,
    },
    /// Leave the lobby.
    LeaveLobby {
        /// The lobby to leave.
        lobby_code: LobbyCode,
    },
    /// Start the game (host only).
    StartGame {
        /// The lobby to start.
        lobby_code: LobbyCode,
    },
    /// Submit story elements for the current round.
    SubmitElements {
        /// The lobby concerned.
        lobby_code: LobbyCode,
        /// The submitted batch, in display order.
        elements: Vec<ElementPayload>,
    },
    /// Retract the current submission.
    UnsubmitElements {
        /// The lobby concerned.
        lobby_code: LobbyCode,
    },
    /// Fetch the story assigned to the caller this round.
    GetStory {
        /// The lobby concerned.
        lobby_code: LobbyCode,
    },
    /// Fetch the playback view of one story part.
    StoryAtPart {
        /// The lobby concerned.
        lobby_code: LobbyCode,
        /// 0-based part to fetch.
        part: i32,
    },
    /// Advance results playback (host only).
    NextPart {
        /// The lobby concerned.
        lobby_code: LobbyCode,
        /// The part currently shown.
        part: i32,
    },
    /// End the game and discard all stories (host only).
    EndGame {
        /// The lobby concerned.
        lobby_code: LobbyCode,
    },
    /// Replace the whole settings block (host only).
    SubmitSettings {
        /// The lobby concerned.
        lobby_code: LobbyCode,
        /// The new settings.
        settings: LobbySettings,
    },
    /// Apply a single-field settings change (host only).
    UpdateSetting {
        /// The lobby concerned.
        lobby_code: LobbyCode,
        /// The field to change.
        update: SettingUpdate,
    },
}

/// Frames the server sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the `Hello`.
    Welcome {
        /// The identified user.
        user_id: UserId,
    },
    /// Full lobby refresh.
    LobbyState {
        /// Current lobby state.
        lobby: Lobby,
    },
    /// The submitted-count changed mid-round.
    SubmittedCount {
        /// The lobby concerned.
        lobby_code: LobbyCode,
        /// New number of ready members.
        users_submitted: i32,
    },
    /// The round counter moved.
    RoundAdvanced {
        /// Lobby state after the advance.
        lobby: Lobby,
    },
    /// The host ended the game.
    GameEnded {
        /// Lobby state after the reset.
        lobby: Lobby,
    },
    /// The lobby was deleted.
    LobbyDeleted {
        /// The deleted lobby.
        lobby_code: LobbyCode,
    },
    /// The host changed settings.
    SettingsChanged {
        /// The lobby concerned.
        lobby_code: LobbyCode,
        /// The new settings.
        settings: LobbySettings,
    },
    /// Results playback moved to another part.
    PlaybackAdvanced {
        /// The lobby concerned.
        lobby_code: LobbyCode,
        /// 0-based part now being played back.
        part: i32,
    },
    /// Response to `GetStory`.
    Story {
        /// The assigned story.
        story: Story,
    },
    /// Response to `StoryAtPart`/`NextPart`.
    StoryPart {
        /// 0-based part.
        part: i32,
        /// The story at that part; `None` past the last one.
        story: Option<Story>,
        /// The requester's rotation row.
        user_index: i32,
        /// Total number of stories.
        stories_count: i32,
    },
    /// A rejected operation, named by failure category.
    Error {
        /// Machine-readable category code.
        code: String,
        /// Human-readable description.
        message: String,
    },
}

impl ServerMessage {
    /// Builds the playback response from a query view.
    #[must_use]
    pub fn story_part(view: StoryPartView) -> Self {
        Self::StoryPart {
            part: view.part,
            story: view.story,
            user_index: view.user_index,
            stories_count: view.stories_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frames_use_snake_case_type_tags() {
        let frame: ClientMessage = serde_json::from_value(serde_json::json!({
            "type": "join_lobby",
            "nickname": "ida",
            "lobby_code": "ABCDE",
        }))
        .unwrap();

        assert!(matches!(frame, ClientMessage::JoinLobby { .. }));
    }

    #[test]
    fn test_submit_frame_carries_typed_elements() {
        let frame: ClientMessage = serde_json::from_value(serde_json::json!({
            "type": "submit_elements",
            "lobby_code": "ABCDE",
            "elements": [
                {"kind": "text", "payload": "once upon a time"},
                {"kind": "drawing", "payload": "{\"strokes\":[]}"},
            ],
        }))
        .unwrap();

        let ClientMessage::SubmitElements { elements, .. } = frame else {
            panic!("wrong variant");
        };
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].kind, ElementKind::Text);
        assert_eq!(elements[1].kind, ElementKind::Drawing);
    }

    #[test]
    fn test_error_frame_names_the_category() {
        let frame = ServerMessage::Error {
            code: "user_not_host".to_owned(),
            message: "user u1 is not the host of lobby ABCDE".to_owned(),
        };

        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["type"], "error");
        assert_eq!(wire["code"], "user_not_host");
    }

    #[test]
    fn test_setting_update_frame_is_field_tagged() {
        let frame: SettingUpdate = serde_json::from_value(serde_json::json!({
            "field": "timer_mode",
            "value": "fast",
        }))
        .unwrap();

        assert!(matches!(
            frame,
            SettingUpdate::TimerMode {
                value: TimerMode::Fast
            }
        ));
    }
}
