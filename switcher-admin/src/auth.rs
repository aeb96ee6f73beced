//! Admin API key.

use std::fmt;
use uuid::Uuid;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "switcher-load-key";

/// The secret admin requests must present.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Generate a random key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use a key supplied by configuration.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key in clear, for printing once at startup.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check a presented key. Comparison time does not depend on where the
    /// first mismatching byte is.
    pub fn verify(&self, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };
        let expected = self.0.as_bytes();
        let candidate = candidate.trim().as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
