use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Required when `backend = "redis"`, e.g. `redis://127.0.0.1:6379`.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Sessions idle longer than this are evicted (or expire natively
    /// in Redis).
    #[serde(default = "d_ttl")]
    pub session_ttl_secs: u64,
    /// Sweep cadence for the in-memory backend.
    #[serde(default = "d_sweep")]
    pub sweep_interval_secs: u64,
    /// How session keys are derived from caller identity.
    #[serde(default)]
    pub key_policy: KeyPolicy,
    /// Bucket count for the `user_hash` policy.
    #[serde(default = "d_modulus")]
    pub key_modulus: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            redis_url: None,
            session_ttl_secs: d_ttl(),
            sweep_interval_secs: d_sweep(),
            key_policy: KeyPolicy::default(),
            key_modulus: d_modulus(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Redis => "redis",
        }
    }
}

/// Session-key derivation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// `hash(user) % key_modulus` bucketing. Distinct users may share a
    /// bucket; the modulus bounds the number of live sessions per user
    /// namespace.
    #[default]
    UserHash,
    /// Use the caller identity verbatim — one session per user.
    Passthrough,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_ttl() -> u64 {
    3_600
}
fn d_sweep() -> u64 {
    60
}
fn d_modulus() -> u64 {
    10_000
}
