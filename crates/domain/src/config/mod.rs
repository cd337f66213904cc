mod context;
mod providers;
mod server;
mod storage;

pub use context::*;
pub use providers::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The resolved configuration. Loaded once at startup, validated
/// fail-fast, then shared immutably by reference.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Global context-reduction defaults; per-model `[models.context]`
    /// tables override individual fields.
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub models: Vec<ModelMapping>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment placeholder expansion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Expand `${VAR}` placeholders in a raw configuration source.
///
/// Runs before parsing so secrets can appear anywhere in the file. An
/// unresolved variable is a fatal error naming the variable, never a
/// silently-empty value.
pub fn expand_placeholders(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail.find('}').ok_or_else(|| {
            let snippet: String = rest[start..].chars().take(24).collect();
            Error::Config(format!(
                "unterminated ${{...}} placeholder near \"{snippet}\""
            ))
        })?;
        let var = &tail[..end];
        let value = std::env::var(var).map_err(|_| {
            Error::Config(format!("environment variable {var} is not set"))
        })?;
        out.push_str(&value);
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Any [`ConfigSeverity::Error`] issue must prevent the process from
    /// serving traffic.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let err = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Error,
            field: field.to_string(),
            message,
        };
        let warn = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Warning,
            field: field.to_string(),
            message,
        };

        if self.server.port == 0 {
            issues.push(err("server.port", "port must be greater than 0".into()));
        }
        if self.server.host.is_empty() {
            issues.push(err("server.host", "host must not be empty".into()));
        }

        // Storage backend.
        if self.storage.backend == StorageBackend::Redis {
            match self.storage.redis_url.as_deref() {
                None | Some("") => issues.push(err(
                    "storage.redis_url",
                    "redis_url is required when backend = \"redis\"".into(),
                )),
                Some(url) if !url.starts_with("redis://") && !url.starts_with("rediss://") => {
                    issues.push(err(
                        "storage.redis_url",
                        format!("redis_url must start with redis:// (got \"{url}\")"),
                    ))
                }
                Some(_) => {}
            }
        }
        if self.storage.session_ttl_secs == 0 {
            issues.push(err(
                "storage.session_ttl_secs",
                "session TTL must be greater than 0".into(),
            ));
        }
        if self.storage.key_policy == KeyPolicy::UserHash && self.storage.key_modulus == 0 {
            issues.push(err(
                "storage.key_modulus",
                "key_modulus must be greater than 0".into(),
            ));
        }

        if self.providers.is_empty() {
            issues.push(warn("providers", "no upstream providers configured".into()));
        }

        // Providers: unique names, sane URLs.
        let mut seen_providers: HashSet<&str> = HashSet::new();
        for (i, p) in self.providers.iter().enumerate() {
            if p.name.is_empty() {
                issues.push(err(
                    &format!("providers[{i}].name"),
                    "provider name must not be empty".into(),
                ));
            } else if !seen_providers.insert(p.name.as_str()) {
                issues.push(err(
                    &format!("providers[{i}].name"),
                    format!("duplicate provider name \"{}\"", p.name),
                ));
            }
            if !p.base_url.starts_with("http://") && !p.base_url.starts_with("https://") {
                issues.push(err(
                    &format!("providers[{i}].base_url"),
                    format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        p.base_url
                    ),
                ));
            }
            if p.api_key.is_empty() {
                issues.push(warn(
                    &format!("providers[{i}].api_key"),
                    format!("provider \"{}\" has no API key", p.name),
                ));
            }
            if p.timeout_secs == 0 {
                issues.push(err(
                    &format!("providers[{i}].timeout_secs"),
                    "timeout must be greater than 0".into(),
                ));
            }
        }

        // Mappings: unique display names, provider references resolve.
        let provider_names: HashSet<&str> =
            self.providers.iter().map(|p| p.name.as_str()).collect();
        let mut seen_models: HashSet<&str> = HashSet::new();
        for (i, m) in self.models.iter().enumerate() {
            if m.name.is_empty() {
                issues.push(err(
                    &format!("models[{i}].name"),
                    "display name must not be empty".into(),
                ));
            } else if !seen_models.insert(m.name.as_str()) {
                issues.push(err(
                    &format!("models[{i}].name"),
                    format!("duplicate display name \"{}\"", m.name),
                ));
            }
            if !provider_names.contains(m.provider.as_str()) {
                issues.push(err(
                    &format!("models[{i}].provider"),
                    format!("unknown provider \"{}\"", m.provider),
                ));
            }
        }
        if self.models.is_empty() {
            issues.push(warn("models", "no model mappings configured".into()));
        }

        // Summarization configs must name a resolvable model.
        self.check_summarization(&self.context, "context", &mut issues);
        for (i, m) in self.models.iter().enumerate() {
            if let Some(ref overrides) = m.context {
                let effective = overrides.resolve(&self.context);
                self.check_summarization(
                    &effective,
                    &format!("models[{i}].context"),
                    &mut issues,
                );
            }
        }

        issues
    }

    fn check_summarization(
        &self,
        ctx: &ContextConfig,
        field: &str,
        issues: &mut Vec<ConfigIssue>,
    ) {
        if ctx.reduction_mode != ReductionMode::Summarization {
            return;
        }
        match ctx.summarization_model.as_deref() {
            None | Some("") => issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: format!("{field}.summarization_model"),
                message: "summarization_model is required when \
                          reduction_mode = \"summarization\""
                    .into(),
            }),
            Some(model) if !self.resolves_model(model) => issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: format!("{field}.summarization_model"),
                message: format!(
                    "\"{model}\" does not resolve to a mapping or a \
                     known provider/model pair"
                ),
            }),
            Some(_) => {}
        }
    }

    /// Whether a display name resolves: a mapping-table hit, or a
    /// `provider/model` form whose provider exists.
    pub fn resolves_model(&self, name: &str) -> bool {
        if self.models.iter().any(|m| m.name == name) {
            return true;
        }
        match name.split_once('/') {
            Some((provider, model)) if !model.is_empty() => {
                self.providers.iter().any(|p| p.name == provider)
            }
            _ => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
