//! Restart recovery and presence supervision tests.

mod common;

use std::time::Duration;

use storyloom_core::ids::UserId;
use storyloom_core::repository::LobbyRepository;
use storyloom_core::story::ElementKind;

use common::{build_coordinator, build_coordinator_at, draft, fixed_now, lobby_with_players};

#[tokio::test]
async fn test_recovery_advances_overdue_round_immediately() {
    // First process: a 3-player game stalls in round 2.
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 3).await;
    let code = lobby.code.clone();
    harness
        .coordinator
        .start_game(UserId::from("u0"), code.clone())
        .await
        .unwrap();
    for i in 0..3 {
        harness
            .coordinator
            .submit_elements(UserId::from(format!("u{i}")), code.clone(), draft("one"))
            .await
            .unwrap();
    }
    let stalled = harness.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(stalled.round, 2);

    // Restart long after the round-2 deadline passed.
    let restarted = build_coordinator_at(fixed_now() + chrono::Duration::minutes(4), harness.repo);
    restarted.coordinator.recover().await.unwrap();

    let lobby = restarted.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(lobby.round, 3, "overdue round was not advanced on recovery");

    // Nobody submitted in round 2, so every story got a placeholder.
    let stories = restarted.repo.fetch_stories(&code).await.unwrap();
    for story in &stories {
        assert_eq!(
            story
                .elements
                .iter()
                .filter(|e| e.round == 2 && e.kind == ElementKind::Empty)
                .count(),
            1
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_recovery_rearms_live_deadline_instead_of_advancing() {
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 2).await;
    let code = lobby.code.clone();
    harness
        .coordinator
        .start_game(UserId::from("u0"), code.clone())
        .await
        .unwrap();

    // Restart 10 seconds in: the round-1 deadline is still ~172s away.
    let restarted = build_coordinator_at(fixed_now() + chrono::Duration::seconds(10), harness.repo);
    restarted.coordinator.recover().await.unwrap();

    let lobby = restarted.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(lobby.round, 1, "live round advanced too early");

    // The re-armed timer fires once the window elapses.
    tokio::time::sleep(Duration::from_secs(200)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    let lobby = restarted.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(lobby.round, 2);
}

#[tokio::test]
async fn test_idle_sweep_evicts_waiting_users_but_not_active_players() {
    let harness = build_coordinator();

    // Lobby A: one idle user waiting in an unstarted lobby.
    let waiting = lobby_with_players(&harness, 1).await;

    // Lobby B: a started game whose players are just as idle.
    let playing = harness
        .coordinator
        .create_lobby(UserId::from("p0"), "playing-0".to_owned())
        .await
        .unwrap();
    harness
        .coordinator
        .join_lobby(UserId::from("p1"), "playing-1".to_owned(), playing.code.clone())
        .await
        .unwrap();
    harness
        .coordinator
        .start_game(UserId::from("p0"), playing.code.clone())
        .await
        .unwrap();

    // Restart past the idle threshold (everyone is now 10 minutes stale).
    let restarted =
        build_coordinator_at(fixed_now() + chrono::Duration::minutes(10), harness.repo);
    restarted.coordinator.recover().await.unwrap();

    // The waiting lobby emptied out and was deleted, its user row removed.
    assert!(
        restarted
            .repo
            .fetch_lobby(&waiting.code)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        restarted
            .repo
            .fetch_user(&UserId::from("u0"))
            .await
            .unwrap()
            .is_none()
    );

    // The mid-game players kept their seats.
    let playing = restarted
        .repo
        .fetch_lobby(&playing.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(playing.users.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_grace_expiry_counts_as_leaving() {
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 3).await;
    let code = lobby.code.clone();

    harness.coordinator.handle_disconnect(&UserId::from("u2"));
    tokio::time::sleep(Duration::from_secs(11)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    let lobby = harness.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(lobby.users.len(), 2);
    assert!(lobby.users.iter().all(|u| u.id != UserId::from("u2")));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_cancels_eviction() {
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 3).await;
    let code = lobby.code.clone();

    harness.coordinator.handle_disconnect(&UserId::from("u2"));
    tokio::time::sleep(Duration::from_secs(5)).await;
    harness
        .coordinator
        .handle_reconnect(&UserId::from("u2"))
        .await;
    tokio::time::sleep(Duration::from_secs(20)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    let lobby = harness.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(lobby.users.len(), 3);
}
