use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context reduction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolved context budget and reduction behavior. The `[context]` table
/// holds the global defaults; a `[models.context]` table overrides them
/// for a single mapping (see [`ContextOverrides`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "d_max_turns")]
    pub max_turns: usize,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u64,
    #[serde(default)]
    pub reduction_mode: ReductionMode,
    /// Display name (or `provider/model`) used for summarization calls.
    /// Required when `reduction_mode = "summarization"`.
    #[serde(default)]
    pub summarization_model: Option<String>,
    #[serde(default = "d_true")]
    pub preserve_system_messages: bool,
    #[serde(default = "d_true")]
    pub memory_zone_enabled: bool,
    /// Prompt template for summarization. `{max_tokens}` is substituted
    /// with the configured token budget.
    #[serde(default = "d_summary_prompt")]
    pub summary_prompt: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: d_max_turns(),
            max_tokens: d_max_tokens(),
            reduction_mode: ReductionMode::Truncation,
            summarization_model: None,
            preserve_system_messages: d_true(),
            memory_zone_enabled: d_true(),
            summary_prompt: d_summary_prompt(),
        }
    }
}

/// Per-model override of the global [`ContextConfig`]. Any field left
/// unset inherits the global value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextOverrides {
    #[serde(default)]
    pub max_turns: Option<usize>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub reduction_mode: Option<ReductionMode>,
    #[serde(default)]
    pub summarization_model: Option<String>,
    #[serde(default)]
    pub preserve_system_messages: Option<bool>,
    #[serde(default)]
    pub memory_zone_enabled: Option<bool>,
}

impl ContextOverrides {
    /// Merge these overrides on top of the global defaults.
    pub fn resolve(&self, global: &ContextConfig) -> ContextConfig {
        ContextConfig {
            max_turns: self.max_turns.unwrap_or(global.max_turns),
            max_tokens: self.max_tokens.unwrap_or(global.max_tokens),
            reduction_mode: self.reduction_mode.unwrap_or(global.reduction_mode),
            summarization_model: self
                .summarization_model
                .clone()
                .or_else(|| global.summarization_model.clone()),
            preserve_system_messages: self
                .preserve_system_messages
                .unwrap_or(global.preserve_system_messages),
            memory_zone_enabled: self
                .memory_zone_enabled
                .unwrap_or(global.memory_zone_enabled),
            summary_prompt: global.summary_prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReductionMode {
    #[default]
    Truncation,
    SlidingWindow,
    Summarization,
}

impl ReductionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReductionMode::Truncation => "truncation",
            ReductionMode::SlidingWindow => "sliding_window",
            ReductionMode::Summarization => "summarization",
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_max_turns() -> usize {
    20
}
fn d_max_tokens() -> u64 {
    4_000
}
fn d_true() -> bool {
    true
}
fn d_summary_prompt() -> String {
    "You are a conversation summarizer. Summarize the following \
     conversation concisely, preserving key information, user intent, \
     and important context. Keep the summary under {max_tokens} tokens."
        .into()
}
