//! The coordinator facade.
//!
//! Owns the repository, clock, notifier, and timer registries, and exposes
//! one method per boundary operation. Handlers do the transactional work;
//! the coordinator publishes the resulting events and keeps the round and
//! disconnect-grace timers in sync with committed state, so a transition
//! triggered by a timer broadcasts exactly like one triggered by a player.

use std::sync::{Arc, Weak};
use std::time::Duration;

use storyloom_core::clock::Clock;
use storyloom_core::error::DomainError;
use storyloom_core::ids::{LobbyCode, UserId};
use storyloom_core::lobby::Lobby;
use storyloom_core::notify::{LobbyEvent, LobbyNotifier};
use storyloom_core::repository::LobbyRepository;
use storyloom_core::settings::LobbySettings;
use storyloom_core::story::Story;

use crate::application::command_handlers::{
    self, LeaveOutcome, SubmitOutcome, handle_advance_round,
};
use crate::application::query_handlers::{self, StoryPartView};
use crate::domain::commands::{
    AdvanceRound, CreateLobby, ElementDraft, EndGame, JoinLobby, LeaveLobby, SettingChange,
    StartGame, SubmitElements, SubmitSettings, UnsubmitElements, UpdateSetting,
};

/// Tunables for presence handling.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// How long a disconnected user may stay seated before being treated as
    /// having left.
    pub disconnect_grace: Duration,
    /// Inactivity threshold after which the startup sweep evicts a user.
    pub idle_after: chrono::Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            disconnect_grace: Duration::from_secs(10),
            idle_after: chrono::Duration::minutes(5),
        }
    }
}

/// Shared coordinator service; construct with [`Coordinator::new`].
pub struct Coordinator {
    pub(crate) repo: Arc<dyn LobbyRepository>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Arc<dyn LobbyNotifier>,
    pub(crate) config: CoordinatorConfig,
    pub(crate) round_timers: crate::timers::TimerRegistry,
    grace_timers: crate::timers::TimerRegistry,
    weak: Weak<Coordinator>,
}

impl Coordinator {
    /// Builds the coordinator. The returned `Arc` is the only handle; timer
    /// callbacks hold weak references so a dropped coordinator silently
    /// disarms its timers.
    #[must_use]
    pub fn new(
        repo: Arc<dyn LobbyRepository>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn LobbyNotifier>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            repo,
            clock,
            notifier,
            config,
            round_timers: crate::timers::TimerRegistry::new(),
            grace_timers: crate::timers::TimerRegistry::new(),
            weak: weak.clone(),
        })
    }

    /// Creates a lobby hosted by `user_id`.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_create_lobby`].
    pub async fn create_lobby(
        &self,
        user_id: UserId,
        nickname: String,
    ) -> Result<Lobby, DomainError> {
        let lobby = command_handlers::handle_create_lobby(
            &CreateLobby { user_id, nickname },
            self.clock.as_ref(),
            self.repo.as_ref(),
        )
        .await?;
        self.notifier
            .publish(LobbyEvent::LobbyState(lobby.clone()))
            .await;
        Ok(lobby)
    }

    /// Adds `user_id` to the lobby.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_join_lobby`].
    pub async fn join_lobby(
        &self,
        user_id: UserId,
        nickname: String,
        lobby_code: LobbyCode,
    ) -> Result<Lobby, DomainError> {
        let lobby = command_handlers::handle_join_lobby(
            &JoinLobby {
                user_id,
                nickname,
                lobby_code,
            },
            self.clock.as_ref(),
            self.repo.as_ref(),
        )
        .await?;
        self.notifier
            .publish(LobbyEvent::LobbyState(lobby.clone()))
            .await;
        Ok(lobby)
    }

    /// Removes `user_id` from the lobby. Returns `None` when the lobby was
    /// deleted because its last member left.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_leave_lobby`].
    pub async fn leave_lobby(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
    ) -> Result<Option<Lobby>, DomainError> {
        let LeaveOutcome { lobby, advanced } = command_handlers::handle_leave_lobby(
            &LeaveLobby {
                user_id,
                lobby_code: lobby_code.clone(),
            },
            self.clock.as_ref(),
            self.repo.as_ref(),
        )
        .await?;

        match &lobby {
            None => {
                self.round_timers.cancel(lobby_code.as_str());
                self.notifier
                    .publish(LobbyEvent::LobbyDeleted(lobby_code))
                    .await;
            }
            Some(lobby) => {
                self.notifier
                    .publish(LobbyEvent::LobbyState(lobby.clone()))
                    .await;
                if advanced {
                    self.notifier
                        .publish(LobbyEvent::RoundAdvanced(lobby.clone()))
                        .await;
                    self.arm_round_timer(lobby);
                }
            }
        }
        Ok(lobby)
    }

    /// Starts the game (host only) and arms the round-1 timer.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_start_game`].
    pub async fn start_game(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
    ) -> Result<Lobby, DomainError> {
        let lobby = command_handlers::handle_start_game(
            &StartGame {
                user_id,
                lobby_code,
            },
            self.clock.as_ref(),
            self.repo.as_ref(),
        )
        .await?;
        self.notifier
            .publish(LobbyEvent::RoundAdvanced(lobby.clone()))
            .await;
        self.arm_round_timer(&lobby);
        Ok(lobby)
    }

    /// Records a submission; broadcasts the new tally, or the advanced
    /// round when the submission completed it.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_submit_elements`].
    pub async fn submit_elements(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
        elements: Vec<ElementDraft>,
    ) -> Result<Lobby, DomainError> {
        let SubmitOutcome { lobby, advanced } = command_handlers::handle_submit_elements(
            &SubmitElements {
                user_id,
                lobby_code,
                elements,
            },
            self.clock.as_ref(),
            self.repo.as_ref(),
        )
        .await?;

        if advanced {
            self.notifier
                .publish(LobbyEvent::RoundAdvanced(lobby.clone()))
                .await;
            self.arm_round_timer(&lobby);
        } else {
            self.notifier
                .publish(LobbyEvent::SubmittedCount {
                    code: lobby.code.clone(),
                    users_submitted: lobby.users_submitted,
                })
                .await;
        }
        Ok(lobby)
    }

    /// Retracts the caller's submission and broadcasts the new tally.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_unsubmit_elements`].
    pub async fn unsubmit_elements(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
    ) -> Result<Lobby, DomainError> {
        let lobby = command_handlers::handle_unsubmit_elements(
            &UnsubmitElements {
                user_id,
                lobby_code,
            },
            self.repo.as_ref(),
        )
        .await?;
        self.notifier
            .publish(LobbyEvent::SubmittedCount {
                code: lobby.code.clone(),
                users_submitted: lobby.users_submitted,
            })
            .await;
        Ok(lobby)
    }

    /// Ends the game (host only), discarding all stories.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_end_game`].
    pub async fn end_game(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
    ) -> Result<Lobby, DomainError> {
        let lobby = command_handlers::handle_end_game(
            &EndGame {
                user_id,
                lobby_code,
            },
            self.repo.as_ref(),
        )
        .await?;
        self.round_timers.cancel(lobby.code.as_str());
        self.notifier
            .publish(LobbyEvent::GameEnded(lobby.clone()))
            .await;
        Ok(lobby)
    }

    /// Replaces the settings block (host only).
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_submit_settings`].
    pub async fn submit_settings(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
        settings: LobbySettings,
    ) -> Result<Lobby, DomainError> {
        let lobby = command_handlers::handle_submit_settings(
            &SubmitSettings {
                user_id: user_id.clone(),
                lobby_code,
                settings,
            },
            self.repo.as_ref(),
        )
        .await?;
        self.notifier
            .publish(LobbyEvent::SettingsChanged {
                code: lobby.code.clone(),
                settings: lobby.settings.clone(),
                actor: user_id,
            })
            .await;
        Ok(lobby)
    }

    /// Applies a single-field settings change (host only).
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_update_setting`].
    pub async fn update_setting(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
        change: SettingChange,
    ) -> Result<Lobby, DomainError> {
        let lobby = command_handlers::handle_update_setting(
            &UpdateSetting {
                user_id: user_id.clone(),
                lobby_code,
                change,
            },
            self.repo.as_ref(),
        )
        .await?;
        self.notifier
            .publish(LobbyEvent::SettingsChanged {
                code: lobby.code.clone(),
                settings: lobby.settings.clone(),
                actor: user_id,
            })
            .await;
        Ok(lobby)
    }

    /// The story `user_id` writes into during the current round.
    ///
    /// # Errors
    ///
    /// See [`query_handlers::get_story`].
    pub async fn get_story(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
    ) -> Result<Story, DomainError> {
        query_handlers::get_story(&user_id, &lobby_code, self.repo.as_ref()).await
    }

    /// Results playback view for the given story part.
    ///
    /// # Errors
    ///
    /// See [`query_handlers::story_at_part`].
    pub async fn story_at_part(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
        part: i32,
    ) -> Result<StoryPartView, DomainError> {
        query_handlers::story_at_part(&user_id, &lobby_code, part, self.repo.as_ref()).await
    }

    /// Moves results playback to the next part (host only) and broadcasts
    /// the new position.
    ///
    /// # Errors
    ///
    /// See [`query_handlers::next_part`].
    pub async fn next_part(
        &self,
        user_id: UserId,
        lobby_code: LobbyCode,
        current_part: i32,
    ) -> Result<StoryPartView, DomainError> {
        let view =
            query_handlers::next_part(&user_id, &lobby_code, current_part, self.repo.as_ref())
                .await?;
        self.notifier
            .publish(LobbyEvent::PlaybackAdvanced {
                code: lobby_code,
                part: view.part,
            })
            .await;
        Ok(view)
    }

    /// Records activity for the user; failures are logged, not surfaced,
    /// since activity tracking must never fail a request.
    pub async fn touch(&self, user_id: &UserId) {
        if let Err(err) = self.repo.touch_user(user_id, self.clock.now()).await {
            tracing::warn!(user = %user_id, error = %err, "failed to record activity");
        }
    }

    /// Starts the disconnect grace timer for the user. If it expires before
    /// [`handle_reconnect`](Self::handle_reconnect) cancels it, the user is
    /// treated as having requested to leave their lobby.
    pub fn handle_disconnect(&self, user_id: &UserId) {
        let weak = self.weak.clone();
        let user = user_id.clone();
        let grace = self.config.disconnect_grace;
        tracing::debug!(user = %user_id, "disconnect grace timer armed");
        self.grace_timers.arm(user_id.as_str(), async move {
            tokio::time::sleep(grace).await;
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            coordinator.evict_disconnected(&user).await;
        });
    }

    /// Cancels a pending disconnect eviction and records activity.
    pub async fn handle_reconnect(&self, user_id: &UserId) {
        self.grace_timers.cancel(user_id.as_str());
        self.touch(user_id).await;
    }

    async fn evict_disconnected(&self, user_id: &UserId) {
        let lobby_code = match self.repo.fetch_user(user_id).await {
            Ok(Some(user)) => user.lobby_code,
            Ok(None) => None,
            Err(err) => {
                tracing::error!(user = %user_id, error = %err, "eviction lookup failed");
                return;
            }
        };
        let Some(code) = lobby_code else { return };

        tracing::info!(user = %user_id, lobby = %code, "disconnect grace expired, leaving lobby");
        if let Err(err) = self.leave_lobby(user_id.clone(), code).await {
            tracing::warn!(user = %user_id, error = %err, "grace-period eviction failed");
        }
    }

    /// (Re-)arms the round deadline timer from committed lobby state:
    /// cancels when the lobby is out of a timed round, otherwise schedules
    /// an advance for `round_ends_at`. An already-elapsed deadline fires
    /// immediately.
    pub(crate) fn arm_round_timer(&self, lobby: &Lobby) {
        let key = lobby.code.as_str();
        if !lobby.in_progress() {
            self.round_timers.cancel(key);
            return;
        }
        let Some(ends_at) = lobby.round_ends_at else {
            self.round_timers.cancel(key);
            return;
        };

        let delay = (ends_at - self.clock.now()).to_std().unwrap_or_default();
        let weak = self.weak.clone();
        let code = lobby.code.clone();
        let expected_round = lobby.round;
        self.round_timers.arm(key, async move {
            tokio::time::sleep(delay).await;
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            coordinator.fire_round_deadline(code, expected_round).await;
        });
    }

    async fn fire_round_deadline(&self, lobby_code: LobbyCode, expected_round: i32) {
        let command = AdvanceRound {
            lobby_code: lobby_code.clone(),
            expected_round,
        };
        match handle_advance_round(&command, self.clock.as_ref(), self.repo.as_ref()).await {
            Ok(Some(lobby)) => {
                self.notifier
                    .publish(LobbyEvent::RoundAdvanced(lobby.clone()))
                    .await;
                self.arm_round_timer(&lobby);
            }
            Ok(None) => {}
            Err(err) => {
                // The transaction rolled back; the next deadline or
                // submission will retry the advance.
                tracing::error!(lobby = %lobby_code, error = %err, "timed round advance failed");
            }
        }
    }
}
