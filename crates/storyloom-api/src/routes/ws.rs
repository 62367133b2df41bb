//! The WebSocket endpoint.
//!
//! One socket per player. The first frame must be `hello`; afterwards each
//! frame is dispatched to the coordinator and answered either directly (for
//! queries) or through the lobby broadcast that the resulting state change
//! triggers. A closed socket starts the disconnect grace timer instead of
//! leaving the lobby outright.

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use storyloom_core::error::DomainError;
use storyloom_core::ids::UserId;

use crate::error::{error_code, log_rejection};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

/// Returns the WebSocket router.
pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn frame_name(frame: &ClientMessage) -> &'static str {
    match frame {
        ClientMessage::Hello { .. } => "hello",
        ClientMessage::CreateLobby { .. } => "create_lobby",
        ClientMessage::JoinLobby { .. } => "join_lobby",
        ClientMessage::LeaveLobby { .. } => "leave_lobby",
        ClientMessage::StartGame { .. } => "start_game",
        ClientMessage::SubmitElements { .. } => "submit_elements",
        ClientMessage::UnsubmitElements { .. } => "unsubmit_elements",
        ClientMessage::GetStory { .. } => "get_story",
        ClientMessage::StoryAtPart { .. } => "story_at_part",
        ClientMessage::NextPart { .. } => "next_part",
        ClientMessage::EndGame { .. } => "end_game",
        ClientMessage::SubmitSettings { .. } => "submit_settings",
        ClientMessage::UpdateSetting { .. } => "update_setting",
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // All outbound frames (direct responses and broadcasts) funnel through
    // one channel so the sink has a single writer.
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let Some(user_id) = await_hello(&mut stream, &tx).await else {
        send_task.abort();
        return;
    };

    state.registry.register(&user_id, tx.clone());
    state.coordinator.handle_reconnect(&user_id).await;
    send_frame(
        &tx,
        &ServerMessage::Welcome {
            user_id: user_id.clone(),
        },
    );
    tracing::info!(user = %user_id, "socket connected");

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(frame) => {
                    state.coordinator.touch(&user_id).await;
                    let operation = frame_name(&frame);
                    match dispatch(&state, &user_id, frame).await {
                        Ok(Some(response)) => send_frame(&tx, &response),
                        Ok(None) => {}
                        Err(err) => {
                            log_rejection(operation, &err);
                            send_frame(
                                &tx,
                                &ServerMessage::Error {
                                    code: error_code(&err).to_owned(),
                                    message: err.to_string(),
                                },
                            );
                        }
                    }
                }
                Err(err) => {
                    send_frame(
                        &tx,
                        &ServerMessage::Error {
                            code: "invalid_request".to_owned(),
                            message: format!("malformed frame: {err}"),
                        },
                    );
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.registry.unregister(&user_id);
    state.coordinator.handle_disconnect(&user_id);
    tracing::info!(user = %user_id, "socket disconnected");
    send_task.abort();
}

/// Reads frames until the identifying `hello` arrives. Any other first
/// frame closes the connection.
async fn await_hello(
    stream: &mut SplitStream<WebSocket>,
    tx: &mpsc::UnboundedSender<Message>,
) -> Option<UserId> {
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                if let Ok(ClientMessage::Hello { user_id }) = serde_json::from_str(&text) {
                    return Some(user_id);
                }
                send_frame(
                    tx,
                    &ServerMessage::Error {
                        code: "invalid_request".to_owned(),
                        message: "the first frame must be hello".to_owned(),
                    },
                );
                return None;
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

fn send_frame(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    let Ok(text) = serde_json::to_string(message) else {
        tracing::error!("failed to serialize server frame");
        return;
    };
    let _ = tx.send(Message::Text(text.into()));
}

/// Routes one frame to the coordinator. Queries return a direct response;
/// mutations answer through the broadcast their state change triggers
/// (settings changes answer directly too, since their broadcast skips the
/// actor).
async fn dispatch(
    state: &AppState,
    user_id: &UserId,
    frame: ClientMessage,
) -> Result<Option<ServerMessage>, DomainError> {
    let coordinator = &state.coordinator;
    match frame {
        ClientMessage::Hello { .. } => Ok(Some(ServerMessage::Welcome {
            user_id: user_id.clone(),
        })),
        ClientMessage::CreateLobby { nickname } => {
            coordinator.create_lobby(user_id.clone(), nickname).await?;
            Ok(None)
        }
        ClientMessage::JoinLobby {
            nickname,
            lobby_code,
        } => {
            coordinator
                .join_lobby(user_id.clone(), nickname, lobby_code)
                .await?;
            Ok(None)
        }
        ClientMessage::LeaveLobby { lobby_code } => {
            coordinator.leave_lobby(user_id.clone(), lobby_code).await?;
            Ok(None)
        }
        ClientMessage::StartGame { lobby_code } => {
            coordinator.start_game(user_id.clone(), lobby_code).await?;
            Ok(None)
        }
        ClientMessage::SubmitElements {
            lobby_code,
            elements,
        } => {
            let drafts = elements.into_iter().map(Into::into).collect();
            coordinator
                .submit_elements(user_id.clone(), lobby_code, drafts)
                .await?;
            Ok(None)
        }
        ClientMessage::UnsubmitElements { lobby_code } => {
            coordinator
                .unsubmit_elements(user_id.clone(), lobby_code)
                .await?;
            Ok(None)
        }
        ClientMessage::GetStory { lobby_code } => {
            let story = coordinator.get_story(user_id.clone(), lobby_code).await?;
            Ok(Some(ServerMessage::Story { story }))
        }
        ClientMessage::StoryAtPart { lobby_code, part } => {
            let view = coordinator
                .story_at_part(user_id.clone(), lobby_code, part)
                .await?;
            Ok(Some(ServerMessage::story_part(view)))
        }
        ClientMessage::NextPart { lobby_code, part } => {
            let view = coordinator
                .next_part(user_id.clone(), lobby_code, part)
                .await?;
            Ok(Some(ServerMessage::story_part(view)))
        }
        ClientMessage::EndGame { lobby_code } => {
            coordinator.end_game(user_id.clone(), lobby_code).await?;
            Ok(None)
        }
        ClientMessage::SubmitSettings {
            lobby_code,
            settings,
        } => {
            let lobby = coordinator
                .submit_settings(user_id.clone(), lobby_code, settings)
                .await?;
            Ok(Some(ServerMessage::LobbyState { lobby }))
        }
        ClientMessage::UpdateSetting { lobby_code, update } => {
            let lobby = coordinator
                .update_setting(user_id.clone(), lobby_code, update.into())
                .await?;
            Ok(Some(ServerMessage::LobbyState { lobby }))
        }
    }
}
