//! Identifier types for TickerDeck entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Provider-level token identifier (e.g. `bitcoin`, `usd-coin`).
/// Normalized to lower case on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct TokenId(String);

impl TokenId {
    /// Create a new token ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_lowercase())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate the token ID format.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 64
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TokenId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Chain slug a token lives on (`ethereum`, `solana`, `base`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct ChainId(String);

impl ChainId {
    /// Create a new chain ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_lowercase())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChainId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque identifier of a dashboard user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new user ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate the user ID format.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '@'))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Client-supplied key used to deduplicate trade executions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Create a new idempotency key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate the key format.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for a simulated trade.
/// Uses UUID v7 for time-ordered identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(Uuid);

impl TradeId {
    /// Create a new trade ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_trade_id_creation() {
        let id1 = TradeId::new();
        let id2 = TradeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_token_id_normalization() {
        let id = TokenId::new("  Bitcoin ");
        assert_eq!(id.as_str(), "bitcoin");
        assert!(id.is_valid());
        assert!(TokenId::new("usd-coin").is_valid());
        assert!(!TokenId::new("").is_valid());
        assert!(!TokenId::new("wrapped_btc").is_valid());
    }

    #[test]
    fn test_token_id_deserialize_normalizes() {
        let id: TokenId = serde_json::from_str("\" Bitcoin\"").unwrap();
        assert_eq!(id, TokenId::new("bitcoin"));
        let chain: ChainId = serde_json::from_str("\"Ethereum\"").unwrap();
        assert_eq!(chain.as_str(), "ethereum");
    }

    #[test]
    fn test_idempotency_key_validation() {
        assert!(IdempotencyKey::new("order:2024-01-01.abc_1").is_valid());
        assert!(!IdempotencyKey::new("").is_valid());
        assert!(!IdempotencyKey::new("has space").is_valid());
        assert!(!IdempotencyKey::new("x".repeat(129)).is_valid());
    }

    #[test]
    fn test_user_id_validation() {
        assert!(UserId::new("user@example.com").is_valid());
        assert!(!UserId::new("a/b").is_valid());
    }

    proptest! {
        #[test]
        fn token_ids_built_from_slugs_are_valid(slug in "[a-z0-9][a-z0-9-]{0,62}") {
            prop_assert!(TokenId::new(slug).is_valid());
        }

        #[test]
        fn idempotency_keys_reject_slashes(prefix in "[a-z]{1,10}", suffix in "[a-z]{1,10}") {
            let key = IdempotencyKey::new(format!("{prefix}/{suffix}"));
            prop_assert!(!key.is_valid());
        }
    }
}
