//! Shared helpers for coordinator integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use storyloom_core::ids::UserId;
use storyloom_core::lobby::Lobby;
use storyloom_core::notify::LobbyNotifier;
use storyloom_core::repository::LobbyRepository;
use storyloom_core::story::ElementKind;
use storyloom_rounds::coordinator::{Coordinator, CoordinatorConfig};
use storyloom_rounds::domain::commands::ElementDraft;
use storyloom_test_support::{FixedClock, MemoryLobbyRepository, RecordingNotifier};

/// Fixed timestamp used across all integration tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// One coordinator wired to deterministic fakes, plus handles to the fakes.
pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub repo: Arc<MemoryLobbyRepository>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Builds a coordinator over a fresh in-memory repository, with the clock
/// fixed at [`fixed_now`].
pub fn build_coordinator() -> Harness {
    build_coordinator_at(fixed_now(), Arc::new(MemoryLobbyRepository::new()))
}

/// Builds a coordinator over an existing repository with the clock fixed at
/// `now`, modelling a restarted process sharing the surviving store.
pub fn build_coordinator_at(now: DateTime<Utc>, repo: Arc<MemoryLobbyRepository>) -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = Coordinator::new(
        repo.clone() as Arc<dyn LobbyRepository>,
        Arc::new(FixedClock(now)),
        notifier.clone() as Arc<dyn LobbyNotifier>,
        CoordinatorConfig::default(),
    );
    Harness {
        coordinator,
        repo,
        notifier,
    }
}

/// Creates a lobby with members `u0..u{n-1}` (u0 hosting) and returns it.
pub async fn lobby_with_players(harness: &Harness, n: usize) -> Lobby {
    let mut lobby = harness
        .coordinator
        .create_lobby(UserId::from("u0"), "player-0".to_owned())
        .await
        .unwrap();
    for i in 1..n {
        lobby = harness
            .coordinator
            .join_lobby(
                UserId::from(format!("u{i}")),
                format!("player-{i}"),
                lobby.code.clone(),
            )
            .await
            .unwrap();
    }
    lobby
}

/// A one-line text submission.
pub fn draft(text: &str) -> Vec<ElementDraft> {
    vec![ElementDraft {
        kind: ElementKind::Text,
        payload: text.to_owned(),
    }]
}
