//! Startup recovery.
//!
//! In-memory timers die with the process, but the round window survives in
//! the store. On startup the supervisor evicts users who went idle while no
//! game was running, then re-arms the deadline timer of every mid-game
//! lobby from its persisted `round_ends_at`. An already-elapsed deadline
//! advances the round immediately instead of stranding it forever.

use storyloom_core::error::DomainError;
use storyloom_core::ids::UserId;
use storyloom_core::notify::LobbyEvent;

use crate::application::command_handlers::handle_advance_round;
use crate::coordinator::Coordinator;
use crate::domain::commands::AdvanceRound;

impl Coordinator {
    /// Runs the full recovery pass: idle-user sweep, then timer re-arming.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Store` when the store is unreachable; partial
    /// progress (users already evicted, timers already armed) is kept.
    pub async fn recover(&self) -> Result<(), DomainError> {
        self.sweep_idle_users().await?;
        self.rearm_in_flight_rounds().await?;
        Ok(())
    }

    /// Evicts users with no recent activity from lobbies they are not
    /// actively playing in, and deletes their rows. A user seated in a
    /// mid-game lobby keeps their seat so the reconciler, not the sweep,
    /// handles their absence.
    async fn sweep_idle_users(&self) -> Result<(), DomainError> {
        let cutoff = self.clock.now() - self.config.idle_after;
        let idle = self.repo.idle_users(cutoff).await?;
        let mut evicted = 0_usize;

        for user in idle {
            if let Some(code) = &user.lobby_code {
                let lobby = self.repo.fetch_lobby(code).await?;
                if lobby.as_ref().is_some_and(storyloom_core::lobby::Lobby::in_progress) {
                    continue;
                }
                if lobby.is_some() {
                    if let Err(err) = self.leave_lobby(user.id.clone(), code.clone()).await {
                        tracing::warn!(user = %user.id, lobby = %code, error = %err, "idle eviction failed");
                        continue;
                    }
                }
            }
            self.delete_user_row(&user.id).await?;
            evicted += 1;
        }

        if evicted > 0 {
            tracing::info!(evicted, "idle users swept");
        }
        Ok(())
    }

    async fn delete_user_row(&self, user_id: &UserId) -> Result<(), DomainError> {
        let mut tx = self.repo.begin().await?;
        tx.delete_user(user_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Re-arms the round timer of every lobby with a round in progress.
    async fn rearm_in_flight_rounds(&self) -> Result<(), DomainError> {
        let lobbies = self.repo.lobbies_in_round().await?;
        let now = self.clock.now();

        for lobby in lobbies {
            match lobby.round_ends_at {
                Some(ends_at) if ends_at <= now => {
                    tracing::info!(
                        lobby = %lobby.code,
                        round = lobby.round,
                        "round deadline elapsed during downtime, advancing"
                    );
                    let command = AdvanceRound {
                        lobby_code: lobby.code.clone(),
                        expected_round: lobby.round,
                    };
                    if let Some(updated) =
                        handle_advance_round(&command, self.clock.as_ref(), self.repo.as_ref())
                            .await?
                    {
                        self.notifier
                            .publish(LobbyEvent::RoundAdvanced(updated.clone()))
                            .await;
                        self.arm_round_timer(&updated);
                    }
                }
                Some(_) => {
                    tracing::info!(lobby = %lobby.code, round = lobby.round, "round timer re-armed");
                    self.arm_round_timer(&lobby);
                }
                // Timer mode is off; the round advances on submissions alone.
                None => {}
            }
        }
        Ok(())
    }
}
