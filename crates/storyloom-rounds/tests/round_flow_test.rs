//! End-to-end round lifecycle tests against the in-memory repository.

mod common;

use storyloom_core::ids::UserId;
use storyloom_core::lobby::{ROUND_FINISHED, ROUND_NOT_STARTED};
use storyloom_core::notify::LobbyEvent;
use storyloom_core::repository::LobbyRepository;
use storyloom_core::story::ElementKind;

use common::{build_coordinator, draft, lobby_with_players};

#[tokio::test]
async fn test_three_player_game_runs_to_completion() {
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 3).await;
    let code = lobby.code.clone();

    // Start: one story per player, indices 0..3, round 1 with a timer window.
    let started = harness
        .coordinator
        .start_game(UserId::from("u0"), code.clone())
        .await
        .unwrap();
    assert_eq!(started.round, 1);
    assert!(started.round_started_at.is_some());
    assert!(started.round_ends_at.is_some());

    let stories = harness.repo.fetch_stories(&code).await.unwrap();
    assert_eq!(stories.len(), 3);
    let mut indices: Vec<i32> = stories.iter().map(|s| s.index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);

    // Round 1: everyone writes into their own story.
    let mut round1_assignments = Vec::new();
    for i in 0..3 {
        let user = UserId::from(format!("u{i}"));
        let story = harness
            .coordinator
            .get_story(user.clone(), code.clone())
            .await
            .unwrap();
        assert_eq!(story.owner_id, user);
        round1_assignments.push((user, story.index));
    }

    for i in 0..3 {
        harness
            .coordinator
            .submit_elements(
                UserId::from(format!("u{i}")),
                code.clone(),
                draft("once upon a time"),
            )
            .await
            .unwrap();
    }

    // All three submitted: round 2, tally reset, assignments rotated.
    let lobby = harness.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(lobby.round, 2);
    assert_eq!(lobby.users_submitted, 0);
    for (user, round1_index) in &round1_assignments {
        let story = harness
            .coordinator
            .get_story(user.clone(), code.clone())
            .await
            .unwrap();
        assert_ne!(story.index, *round1_index, "{user} kept their story");
    }

    // Rounds 2 and 3 complete the game.
    for _ in 0..2 {
        for i in 0..3 {
            harness
                .coordinator
                .submit_elements(
                    UserId::from(format!("u{i}")),
                    code.clone(),
                    draft("and then"),
                )
                .await
                .unwrap();
        }
    }

    let finished = harness.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(finished.round, ROUND_FINISHED);
    assert_eq!(finished.round_started_at, None);
    assert_eq!(finished.round_ends_at, None);

    // Every story carries one element per round per contributor.
    let stories = harness.repo.fetch_stories(&code).await.unwrap();
    for story in &stories {
        assert_eq!(story.elements.len(), 3);
        let mut rounds: Vec<i32> = story.elements.iter().map(|e| e.round).collect();
        rounds.sort_unstable();
        assert_eq!(rounds, vec![1, 2, 3]);
    }
}

#[tokio::test]
async fn test_concurrent_submissions_lose_no_update() {
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 3).await;
    let code = lobby.code.clone();
    harness
        .coordinator
        .start_game(UserId::from("u0"), code.clone())
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        harness
            .coordinator
            .submit_elements(UserId::from("u1"), code.clone(), draft("from one side")),
        harness
            .coordinator
            .submit_elements(UserId::from("u2"), code.clone(), draft("from the other")),
    );
    first.unwrap();
    second.unwrap();

    let lobby = harness.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(lobby.users_submitted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_round_deadline_backfills_and_advances() {
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 3).await;
    let code = lobby.code.clone();
    harness
        .coordinator
        .start_game(UserId::from("u0"), code.clone())
        .await
        .unwrap();

    harness
        .coordinator
        .submit_elements(UserId::from("u1"), code.clone(), draft("the punctual one"))
        .await
        .unwrap();

    // Default window: 2s client grace + 180s round. Run the clock past it.
    tokio::time::sleep(std::time::Duration::from_secs(200)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    let lobby = harness.repo.fetch_lobby(&code).await.unwrap().unwrap();
    assert_eq!(lobby.round, 2);
    assert_eq!(lobby.users_submitted, 0);

    // Exactly two placeholders, one per missing player, on distinct stories.
    let stories = harness.repo.fetch_stories(&code).await.unwrap();
    let placeholders: Vec<_> = stories
        .iter()
        .flat_map(|s| &s.elements)
        .filter(|e| e.kind == ElementKind::Empty && e.round == 1)
        .collect();
    assert_eq!(placeholders.len(), 2);
    for story in &stories {
        assert_eq!(story.elements.iter().filter(|e| e.round == 1).count(), 1);
    }

    let advanced = harness
        .notifier
        .published()
        .into_iter()
        .filter(|e| matches!(e, LobbyEvent::RoundAdvanced(l) if l.round == 2))
        .count();
    assert_eq!(advanced, 1);
}

#[tokio::test]
async fn test_end_game_mid_round_discards_stories_and_resets() {
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 3).await;
    let code = lobby.code.clone();
    harness
        .coordinator
        .start_game(UserId::from("u0"), code.clone())
        .await
        .unwrap();

    // Into round 2, then the host pulls the plug.
    for i in 0..3 {
        harness
            .coordinator
            .submit_elements(UserId::from(format!("u{i}")), code.clone(), draft("begin"))
            .await
            .unwrap();
    }
    let ended = harness
        .coordinator
        .end_game(UserId::from("u0"), code.clone())
        .await
        .unwrap();

    assert_eq!(ended.round, ROUND_NOT_STARTED);
    assert_eq!(ended.round_started_at, None);
    assert_eq!(ended.round_ends_at, None);
    assert!(harness.repo.fetch_stories(&code).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_departure_of_last_missing_player_advances_round() {
    let harness = build_coordinator();
    let lobby = lobby_with_players(&harness, 3).await;
    let code = lobby.code.clone();
    harness
        .coordinator
        .start_game(UserId::from("u0"), code.clone())
        .await
        .unwrap();

    harness
        .coordinator
        .submit_elements(UserId::from("u0"), code.clone(), draft("here"))
        .await
        .unwrap();
    harness
        .coordinator
        .submit_elements(UserId::from("u1"), code.clone(), draft("here too"))
        .await
        .unwrap();

    let remaining = harness
        .coordinator
        .leave_lobby(UserId::from("u2"), code.clone())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(remaining.users.len(), 2);
    assert_eq!(remaining.round, 2);
    // The vacated slot was back-filled for round 1.
    let stories = harness.repo.fetch_stories(&code).await.unwrap();
    for story in &stories {
        assert_eq!(story.elements.iter().filter(|e| e.round == 1).count(), 1);
    }
}
