use serde::{Deserialize, Serialize};

use super::ContextOverrides;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upstream providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One upstream provider endpoint (`[[providers]]` in config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name; also the namespace prefix clients may use
    /// (`name/model`).
    pub name: String,
    #[serde(default)]
    pub kind: ProviderKind,
    pub base_url: String,
    /// May be a literal or a `${ENV_VAR}` placeholder (expanded at load).
    /// Never logged.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "d_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    /// Model allow-list for structural `name/model` resolution. Empty
    /// means any model is accepted.
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Openai,
    Azure,
    Custom,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model mappings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A public display name mapped to an upstream provider/model pair
/// (`[[models]]` in config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMapping {
    /// The namespaced identifier clients send, e.g. `official/gpt-4`.
    pub name: String,
    /// References a [`ProviderConfig::name`].
    pub provider: String,
    /// The identifier the upstream provider expects, e.g. `gpt-4-0613`.
    pub model: String,
    /// Per-model context budget override.
    #[serde(default)]
    pub context: Option<ContextOverrides>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_timeout() -> u64 {
    30
}
