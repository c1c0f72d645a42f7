use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

/// Opaque per-connection identifier used as the sole routing key.
///
/// Identities are random v4 UUIDs. Uniqueness is probabilistic; callers that
/// store identities (the session registry) reject duplicates instead of
/// re-rolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Uuid);

impl Identity {
    pub fn generate() -> Self {
        Identity(Uuid::new_v4())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

#[derive(Debug, Error)]
#[error("invalid identity '{input}': {source}")]
pub struct IdentityParseError {
    input: String,
    #[source]
    source: uuid::Error,
}

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Identity)
            .map_err(|source| IdentityParseError {
                input: s.to_owned(),
                source,
            })
    }
}

/// Order-independent key joining two identities into one conversation.
///
/// Both identities are rendered to text and concatenated smaller-first, so
/// `PairKey::new(a, b) == PairKey::new(b, a)` without the caller sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(a: Identity, b: Identity) -> Self {
        let (a, b) = (a.to_string(), b.to_string());
        if a <= b {
            PairKey(a + &b)
        } else {
            PairKey(b + &a)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn generated_identities_differ() {
        let a = Identity::generate();
        let b = Identity::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test_timeout::timeout]
    fn display_round_trips_through_parse() {
        let id = Identity::generate();
        let parsed: Identity = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test_timeout::timeout]
    fn parse_tolerates_surrounding_whitespace() {
        let parsed: Identity = " 00000000-0000-0000-0000-000000000000\n".parse().unwrap();
        assert_eq!(parsed, Identity(Uuid::nil()));
    }

    #[test_timeout::timeout]
    fn parse_rejects_garbage() {
        let err = "not-a-uuid".parse::<Identity>().unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test_timeout::timeout]
    fn pair_key_is_commutative() {
        let a = Identity::generate();
        let b = Identity::generate();
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert_ne!(PairKey::new(a, b), PairKey::new(a, a));
    }

    #[test_timeout::timeout]
    fn pair_key_puts_smaller_identity_first() {
        let low: Identity = "00000000-0000-0000-0000-000000000001".parse().unwrap();
        let high: Identity = "ffffffff-0000-0000-0000-000000000000".parse().unwrap();
        let key = PairKey::new(high, low);
        assert!(key.as_str().starts_with("00000000-"));
        assert!(key.as_str().ends_with("ffffffff-0000-0000-0000-000000000000"));
    }
}
