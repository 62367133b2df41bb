//! Live connection bookkeeping and event fan-out.
//!
//! Each connected user has one addressable sender handle; lobby broadcast
//! iterates the lobby's last-known membership. Membership is synced from the
//! full-lobby events the coordinator publishes, which is what lets a
//! `LobbyDeleted` event still reach the members the lobby had just before it
//! went away.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use storyloom_core::ids::{LobbyCode, UserId};
use storyloom_core::lobby::Lobby;
use storyloom_core::notify::{LobbyEvent, LobbyNotifier};

use crate::protocol::ServerMessage;

/// Registry of live sockets and lobby room membership.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    senders: DashMap<String, UnboundedSender<Message>>,
    rooms: DashMap<String, Vec<UserId>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the send handle for a user's current socket, replacing any
    /// handle from a previous connection.
    pub fn register(&self, user_id: &UserId, sender: UnboundedSender<Message>) {
        self.senders.insert(user_id.as_str().to_owned(), sender);
    }

    /// Forgets the user's send handle (socket closed).
    pub fn unregister(&self, user_id: &UserId) {
        self.senders.remove(user_id.as_str());
    }

    /// Sends one frame to one user. Delivery is best-effort: a missing or
    /// closed socket is skipped silently (the user will resync on
    /// reconnect).
    pub fn send_to(&self, user_id: &UserId, message: &ServerMessage) {
        let Ok(text) = serde_json::to_string(message) else {
            tracing::error!(user = %user_id, "failed to serialize server frame");
            return;
        };
        if let Some(sender) = self.senders.get(user_id.as_str()) {
            let _ = sender.send(Message::Text(text.into()));
        }
    }

    /// Records the lobby's current membership for later broadcasts.
    pub fn sync_room(&self, lobby: &Lobby) {
        self.rooms
            .insert(lobby.code.as_str().to_owned(), lobby.member_ids());
    }

    /// Drops the room and returns its last-known membership.
    #[must_use]
    pub fn drop_room(&self, code: &LobbyCode) -> Vec<UserId> {
        self.rooms
            .remove(code.as_str())
            .map(|(_, members)| members)
            .unwrap_or_default()
    }

    /// Sends one frame to every member of the lobby, optionally skipping
    /// one user (the actor who already knows).
    pub fn broadcast(&self, code: &LobbyCode, message: &ServerMessage, except: Option<&UserId>) {
        let Some(members) = self.rooms.get(code.as_str()).map(|m| m.value().clone()) else {
            return;
        };
        for member in &members {
            if except == Some(member) {
                continue;
            }
            self.send_to(member, message);
        }
    }
}

/// Publishes coordinator events onto the socket registry.
pub struct WsNotifier {
    registry: Arc<ConnectionRegistry>,
}

impl WsNotifier {
    /// Creates a notifier over the given registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl LobbyNotifier for WsNotifier {
    async fn publish(&self, event: LobbyEvent) {
        match event {
            LobbyEvent::LobbyState(lobby) => {
                self.registry.sync_room(&lobby);
                let code = lobby.code.clone();
                self.registry
                    .broadcast(&code, &ServerMessage::LobbyState { lobby }, None);
            }
            LobbyEvent::RoundAdvanced(lobby) => {
                self.registry.sync_room(&lobby);
                let code = lobby.code.clone();
                self.registry
                    .broadcast(&code, &ServerMessage::RoundAdvanced { lobby }, None);
            }
            LobbyEvent::GameEnded(lobby) => {
                self.registry.sync_room(&lobby);
                let code = lobby.code.clone();
                self.registry
                    .broadcast(&code, &ServerMessage::GameEnded { lobby }, None);
            }
            LobbyEvent::SubmittedCount {
                code,
                users_submitted,
            } => {
                self.registry.broadcast(
                    &code,
                    &ServerMessage::SubmittedCount {
                        lobby_code: code.clone(),
                        users_submitted,
                    },
                    None,
                );
            }
            LobbyEvent::LobbyDeleted(code) => {
                let members = self.registry.drop_room(&code);
                let message = ServerMessage::LobbyDeleted {
                    lobby_code: code.clone(),
                };
                for member in &members {
                    self.registry.send_to(member, &message);
                }
            }
            LobbyEvent::SettingsChanged {
                code,
                settings,
                actor,
            } => {
                self.registry.broadcast(
                    &code,
                    &ServerMessage::SettingsChanged {
                        lobby_code: code.clone(),
                        settings,
                    },
                    Some(&actor),
                );
            }
            LobbyEvent::PlaybackAdvanced { code, part } => {
                self.registry.broadcast(
                    &code,
                    &ServerMessage::PlaybackAdvanced {
                        lobby_code: code.clone(),
                        part,
                    },
                    None,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use storyloom_core::user::User;
    use tokio::sync::mpsc;

    use super::*;

    fn lobby_with(users: &[&str]) -> Lobby {
        let now = Utc::now();
        let host = User::new(UserId::from(users[0]), users[0].to_owned(), now);
        let mut lobby = Lobby::new(LobbyCode::from("ABCDE"), host);
        for id in &users[1..] {
            lobby
                .users
                .push(User::new(UserId::from(*id), (*id).to_owned(), now));
        }
        lobby
    }

    fn expect_frame(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
        let Message::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_member() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = WsNotifier::new(Arc::clone(&registry));
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(&UserId::from("a"), tx_a);
        registry.register(&UserId::from("b"), tx_b);

        notifier
            .publish(LobbyEvent::LobbyState(lobby_with(&["a", "b"])))
            .await;

        assert_eq!(expect_frame(&mut rx_a)["type"], "lobby_state");
        assert_eq!(expect_frame(&mut rx_b)["type"], "lobby_state");
    }

    #[tokio::test]
    async fn test_settings_broadcast_skips_the_actor() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = WsNotifier::new(Arc::clone(&registry));
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(&UserId::from("a"), tx_a);
        registry.register(&UserId::from("b"), tx_b);

        let lobby = lobby_with(&["a", "b"]);
        notifier.publish(LobbyEvent::LobbyState(lobby.clone())).await;
        let _ = rx_a.try_recv();
        let _ = rx_b.try_recv();

        notifier
            .publish(LobbyEvent::SettingsChanged {
                code: lobby.code.clone(),
                settings: lobby.settings.clone(),
                actor: UserId::from("a"),
            })
            .await;

        assert!(rx_a.try_recv().is_err(), "actor received its own change");
        assert_eq!(expect_frame(&mut rx_b)["type"], "settings_changed");
    }

    #[tokio::test]
    async fn test_lobby_deletion_notifies_last_known_members() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = WsNotifier::new(Arc::clone(&registry));
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        registry.register(&UserId::from("a"), tx_a);

        let lobby = lobby_with(&["a"]);
        notifier.publish(LobbyEvent::LobbyState(lobby.clone())).await;
        let _ = rx_a.try_recv();

        notifier
            .publish(LobbyEvent::LobbyDeleted(lobby.code.clone()))
            .await;

        assert_eq!(expect_frame(&mut rx_a)["type"], "lobby_deleted");
        // The room is gone; further broadcasts reach nobody.
        notifier
            .publish(LobbyEvent::SubmittedCount {
                code: lobby.code,
                users_submitted: 1,
            })
            .await;
        assert!(rx_a.try_recv().is_err());
    }
}
