//! Storyloom Rotation — deterministic story assignment.
//!
//! Computes which story each player writes into each round. The assignment
//! is a balanced Latin square: every row is a permutation of the story
//! indices, and over the full rotation every player's story is adjacent to
//! every other story with even frequency, eliminating the first/last-story
//! bias of a naive cyclic shift.
//!
//! Everything here is a pure function of the lobby code and the player
//! roster, so the same `(lobby, round, user)` triple re-derives the same
//! story index after a process restart; no assignment state is persisted
//! beyond story ownership.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};

use storyloom_core::ids::{LobbyCode, UserId};

/// Derives a shuffle seed from the lobby code, with a domain-separation tag
/// so the row shuffle and the roster shuffle draw from independent streams.
fn seed(code: &LobbyCode, tag: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(code.as_str().as_bytes());
    hasher.update(tag);
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// Builds the `n x n` balanced Latin square, one row per participant.
///
/// Standard counterbalanced construction: the base offset sequence counts up
/// from 0 on the first two and the odd positions and down from `n - 1` on
/// the remaining even positions, so successive-cell distances cycle through
/// every offset exactly once. The participant id is `i` for even `n` and
/// `2 * i` for odd `n`; odd-length rows with an odd participant id are
/// reversed.
#[must_use]
pub fn balanced_rows(n: usize) -> Vec<Vec<usize>> {
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let participant = if n % 2 == 0 { i } else { i * 2 };
        let mut row = Vec::with_capacity(n);
        let (mut up, mut down) = (0, 0);
        for k in 0..n {
            let val = if k < 2 || k % 2 != 0 {
                let v = up;
                up += 1;
                v
            } else {
                down += 1;
                n - down
            };
            row.push((val + participant) % n);
        }
        if n % 2 != 0 && participant % 2 != 0 {
            row.reverse();
        }
        rows.push(row);
    }
    rows
}

/// Shuffles the game-start roster into rotation order, seeded by the lobby
/// code. Position `p` in the result is the player whose story opens at the
/// square's row `p`.
#[must_use]
pub fn shuffled_members(code: &LobbyCode, member_ids: &[UserId]) -> Vec<UserId> {
    let mut order: Vec<UserId> = member_ids.to_vec();
    let mut rng = StdRng::seed_from_u64(seed(code, b"roster"));
    order.shuffle(&mut rng);
    order
}

/// The story assignment matrix for one lobby.
#[derive(Debug, Clone)]
pub struct RotationPlan {
    rows: Vec<Vec<usize>>,
}

impl RotationPlan {
    /// Builds the plan for a lobby of `stories_count` players: the balanced
    /// square with its rows shuffled deterministically by the lobby code, so
    /// different lobbies of the same size get different but reproducible
    /// assignments.
    #[must_use]
    pub fn new(code: &LobbyCode, stories_count: usize) -> Self {
        let mut rows = balanced_rows(stories_count);
        let mut rng = StdRng::seed_from_u64(seed(code, b"rows"));
        rows.shuffle(&mut rng);
        Self { rows }
    }

    /// Number of stories (= players at game start).
    #[must_use]
    pub fn stories_count(&self) -> usize {
        self.rows.len()
    }

    /// The story index the player at rotation row `row` writes into during
    /// 1-based `round`. `None` when the row or round is out of range.
    #[must_use]
    pub fn story_index(&self, row: usize, round: i32) -> Option<usize> {
        let round = usize::try_from(round).ok()?;
        if round == 0 || round > self.rows.len() {
            return None;
        }
        self.rows.get(row)?.get(round - 1).copied()
    }

    /// The rotation row whose round-1 assignment is `story_index`, i.e. the
    /// row of that story's original contributor. Column 0 of the square is a
    /// permutation, so the answer is unique.
    #[must_use]
    pub fn row_opening_with(&self, story_index: usize) -> Option<usize> {
        self.rows.iter().position(|row| row[0] == story_index)
    }
}
