//! Rate key generation.

use super::limit::Algorithm;

/// Namespace used when no prefix is configured.
pub const DEFAULT_KEY_PREFIX: &str = "hivegate";

/// A key that uniquely identifies the entity being limited.
///
/// Rendered as `prefix:algorithm-tag:caller-key`. The caller key is always
/// the last segment, so two distinct caller keys under the same prefix and
/// algorithm never render to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    /// Namespace shared by every key of one gate
    pub prefix: String,
    /// Algorithm the key's state belongs to
    pub algorithm: Algorithm,
    /// Caller-supplied identity (client IP, API token, ...)
    pub caller: String,
}

impl RateKey {
    pub fn new(prefix: &str, algorithm: Algorithm, caller: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            algorithm,
            caller: caller.to_string(),
        }
    }

    /// The store key for this entity.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}:{}", self.prefix, self.algorithm.tag(), self.caller)
    }

    /// The store key of one fixed-window bucket.
    pub fn bucket_key(&self, window: u64) -> String {
        format!("{}_{}", self.to_string_key(), window)
    }
}

impl std::fmt::Display for RateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
