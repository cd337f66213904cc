//! Session-key derivation.
//!
//! The orchestrator hands the store an opaque key derived from caller
//! identity. Derivation is a configurable policy:
//!
//! - `user_hash` — `"{user}:{hash(user) % modulus}"`. The bucket suffix
//!   reproduces the numeric session id of the original deployment, and
//!   the key decomposes into the `{user_id}:{session_id}` components the
//!   Redis key layout uses.
//! - `passthrough` — the caller identity verbatim.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use mr_domain::config::{KeyPolicy, StorageConfig};

/// Derives session keys from caller identity according to the
/// configured policy.
#[derive(Debug, Clone)]
pub struct SessionKeyPolicy {
    policy: KeyPolicy,
    modulus: u64,
}

impl SessionKeyPolicy {
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            policy: storage.key_policy,
            modulus: storage.key_modulus.max(1),
        }
    }

    pub fn new(policy: KeyPolicy, modulus: u64) -> Self {
        Self {
            policy,
            modulus: modulus.max(1),
        }
    }

    /// Compute the stable session key for a caller identity.
    pub fn derive(&self, user_id: &str) -> String {
        match self.policy {
            KeyPolicy::UserHash => {
                let mut hasher = DefaultHasher::new();
                user_id.hash(&mut hasher);
                let bucket = hasher.finish() % self.modulus;
                format!("{user_id}:{bucket}")
            }
            KeyPolicy::Passthrough => user_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_hash_is_stable() {
        let policy = SessionKeyPolicy::new(KeyPolicy::UserHash, 10_000);
        assert_eq!(policy.derive("alice"), policy.derive("alice"));
    }

    #[test]
    fn user_hash_bucket_is_bounded() {
        let policy = SessionKeyPolicy::new(KeyPolicy::UserHash, 100);
        let key = policy.derive("alice");
        let (user, bucket) = key.rsplit_once(':').unwrap();
        assert_eq!(user, "alice");
        assert!(bucket.parse::<u64>().unwrap() < 100);
    }

    #[test]
    fn distinct_users_get_distinct_keys() {
        let policy = SessionKeyPolicy::new(KeyPolicy::UserHash, 10_000);
        assert_ne!(policy.derive("alice"), policy.derive("bob"));
    }

    #[test]
    fn passthrough_uses_identity_verbatim() {
        let policy = SessionKeyPolicy::new(KeyPolicy::Passthrough, 10_000);
        assert_eq!(policy.derive("alice"), "alice");
    }
}
