//! Session token - opaque correlation identifier
//!
//! Carried by clients on every exchange after the first, binding the
//! exchange to a specific session. Tokens are drawn from an identifier
//! space wide enough that accidental collision with a live session is not
//! a practical concern.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session correlation token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Create a token from an existing string value
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Decode a token from raw option bytes
    ///
    /// Returns `None` for empty or non-UTF-8 values; such options are
    /// treated as absent, never as an error.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        std::str::from_utf8(bytes).ok().map(|s| Self(s.to_string()))
    }

    /// Get the token as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the token as bytes, as carried on the wire
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Source of session tokens
///
/// Injected into the bridge server so tests can substitute a
/// deterministic generator.
pub trait SessionIdGenerator: Send + Sync {
    /// Produce the next token
    fn generate(&self) -> SessionToken;
}

/// Default token source
///
/// UUID v7: a time-ordered component combined with a wide random value,
/// so tokens are unique across restarts without coordination.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl SessionIdGenerator for RandomIdGenerator {
    fn generate(&self) -> SessionToken {
        SessionToken::new(uuid::Uuid::now_v7().to_string())
    }
}
