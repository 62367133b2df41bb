//! Identifier newtypes.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of characters in a lobby code.
pub const LOBBY_CODE_LEN: usize = 5;

/// Short unique code identifying a lobby.
///
/// Also the seed source for the rotation scheduler, so the same lobby always
/// re-derives the same story assignments after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyCode(String);

impl LobbyCode {
    /// Generates a fresh random code of uppercase letters.
    #[must_use]
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let code: String = (0..LOBBY_CODE_LEN)
            .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
            .collect();
        Self(code)
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LobbyCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl From<&str> for LobbyCode {
    fn from(code: &str) -> Self {
        Self(code.to_owned())
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-generated opaque user identifier.
///
/// Persists across reconnects; the coordinator trusts it as-is (identity
/// verification is out of scope).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_generated_code_is_five_uppercase_letters() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = LobbyCode::generate(&mut rng);

        assert_eq!(code.as_str().len(), LOBBY_CODE_LEN);
        assert!(code.as_str().chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generated_codes_vary() {
        let mut rng = StdRng::seed_from_u64(7);
        let first = LobbyCode::generate(&mut rng);
        let second = LobbyCode::generate(&mut rng);

        assert_ne!(first, second);
    }
}
