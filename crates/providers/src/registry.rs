//! Provider registry.
//!
//! Constructs one [`ProviderHandle`] per configured upstream at startup.
//! Each handle owns a pooled `reqwest::Client`, so connections to one
//! provider are reused across requests and never shared across
//! providers with different credentials.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mr_domain::config::{Config, ProviderConfig, ProviderKind};
use mr_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderHandle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A ready-to-use upstream endpoint: base URL, credentials, timeout, and
/// a dedicated connection pool.
pub struct ProviderHandle {
    pub name: String,
    pub kind: ProviderKind,
    pub timeout: Duration,
    base_url: String,
    api_key: String,
    models: Vec<String>,
    client: reqwest::Client,
}

impl ProviderHandle {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        // No client-level timeout: it would cut long-lived SSE bodies
        // short. The router bounds the request phase instead.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(format!("building client for {}: {e}", cfg.name)))?;

        Ok(Self {
            name: cfg.name.clone(),
            kind: cfg.kind,
            timeout: Duration::from_secs(cfg.timeout_secs),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            models: cfg.models.clone(),
            client,
        })
    }

    /// Whether the allow-list admits a model reached via `name/model`
    /// namespace parsing. An empty list admits everything.
    pub fn allows_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }

    /// Azure carries the deployment name in the URL and must not repeat
    /// it in the body.
    pub fn model_in_body(&self) -> bool {
        self.kind != ProviderKind::Azure
    }

    fn chat_url(&self, model: &str) -> String {
        match self.kind {
            ProviderKind::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version=2024-10-21",
                self.base_url, model
            ),
            ProviderKind::Openai | ProviderKind::Custom => {
                format!("{}/chat/completions", self.base_url)
            }
        }
    }

    /// Build the authenticated POST for a chat-completions call.
    /// Standard providers use `Authorization: Bearer`; Azure uses the
    /// `api-key` header.
    pub(crate) fn chat_post(&self, model: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(self.chat_url(model))
            .header("Content-Type", "application/json");
        match self.kind {
            ProviderKind::Azure => builder.header("api-key", &self.api_key),
            ProviderKind::Openai | ProviderKind::Custom => {
                builder.header("Authorization", format!("Bearer {}", self.api_key))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All configured providers, keyed by name.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderHandle>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers = HashMap::new();
        for cfg in &config.providers {
            let handle = Arc::new(ProviderHandle::from_config(cfg)?);
            providers.insert(cfg.name.clone(), handle);
            tracing::debug!(provider = %cfg.name, kind = ?cfg.kind, "provider ready");
        }
        Ok(Self { providers })
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProviderHandle>> {
        self.providers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(kind: ProviderKind) -> ProviderHandle {
        ProviderHandle::from_config(&ProviderConfig {
            name: "up".into(),
            kind,
            base_url: "https://api.example.com/v1/".into(),
            api_key: "sk-test".into(),
            timeout_secs: 30,
            max_retries: 0,
            models: vec![],
        })
        .unwrap()
    }

    #[test]
    fn chat_url_strips_trailing_slash() {
        let h = handle(ProviderKind::Openai);
        assert_eq!(
            h.chat_url("gpt-4"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn azure_url_embeds_deployment() {
        let h = handle(ProviderKind::Azure);
        assert_eq!(
            h.chat_url("gpt-4"),
            "https://api.example.com/v1/openai/deployments/gpt-4/chat/completions?api-version=2024-10-21"
        );
        assert!(!h.model_in_body());
    }

    #[test]
    fn empty_allow_list_admits_everything() {
        let h = handle(ProviderKind::Openai);
        assert!(h.allows_model("anything"));
    }

    #[test]
    fn allow_list_is_enforced() {
        let mut cfg = ProviderConfig {
            name: "up".into(),
            kind: ProviderKind::Openai,
            base_url: "https://api.example.com".into(),
            api_key: String::new(),
            timeout_secs: 30,
            max_retries: 0,
            models: vec!["gpt-4".into()],
        };
        cfg.models.push("gpt-3.5-turbo".into());
        let h = ProviderHandle::from_config(&cfg).unwrap();
        assert!(h.allows_model("gpt-4"));
        assert!(!h.allows_model("gpt-5"));
    }
}
