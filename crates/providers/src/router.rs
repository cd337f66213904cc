//! Namespaced model resolution and upstream dispatch.
//!
//! Resolution order: the mapping table wins; otherwise a display name
//! containing `/` is split once on the FIRST slash into
//! `(provider, model)` — the suffix may itself contain `/`. Anything
//! else is `model_not_found`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use mr_domain::chat::Message;
use mr_domain::config::{Config, ContextConfig, ModelMapping};
use mr_domain::error::{Error, Result};
use mr_domain::stream::{BoxStream, ChunkEvent};

use crate::registry::{ProviderHandle, ProviderRegistry};
use crate::util::{from_reqwest, short_diagnostic};
use crate::wire::{build_chat_body, ChatCompletion, RequestParams};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The outcome of resolving a display name.
pub struct Resolution {
    pub provider: Arc<ProviderHandle>,
    /// The identifier the upstream expects.
    pub model: String,
    /// The context budget in effect for this model (per-model override
    /// merged over the global defaults).
    pub context: ContextConfig,
    /// The display name the caller used.
    pub display: String,
}

/// One entry of `GET /v1/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ModelRouter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolves display names and performs buffered or streaming calls to
/// the owning provider.
pub struct ModelRouter {
    registry: ProviderRegistry,
    mappings: HashMap<String, ModelMapping>,
    /// Display names in config order, for stable `/v1/models` output.
    listing: Vec<String>,
    defaults: ContextConfig,
    started_at: i64,
}

impl ModelRouter {
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = ProviderRegistry::from_config(config)?;
        let mut mappings = HashMap::new();
        let mut listing = Vec::new();
        for m in &config.models {
            listing.push(m.name.clone());
            mappings.insert(m.name.clone(), m.clone());
        }
        Ok(Self {
            registry,
            mappings,
            listing,
            defaults: config.context.clone(),
            started_at: chrono::Utc::now().timestamp(),
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // ── Resolution ─────────────────────────────────────────────────

    /// Resolve a display name to `(provider, actual model, context)`.
    pub fn resolve(&self, display: &str) -> Result<Resolution> {
        if let Some(mapping) = self.mappings.get(display) {
            let provider = self.registry.get(&mapping.provider).ok_or_else(|| {
                Error::Config(format!(
                    "mapping \"{display}\" references unknown provider \"{}\"",
                    mapping.provider
                ))
            })?;
            let context = mapping
                .context
                .as_ref()
                .map(|o| o.resolve(&self.defaults))
                .unwrap_or_else(|| self.defaults.clone());
            return Ok(Resolution {
                provider,
                model: mapping.model.clone(),
                context,
                display: display.to_string(),
            });
        }

        // Structural form: split once on the first slash only.
        if let Some((prefix, suffix)) = display.split_once('/') {
            if let Some(provider) = self.registry.get(prefix) {
                if suffix.is_empty() || !provider.allows_model(suffix) {
                    return Err(Error::ModelNotFound(display.to_string()));
                }
                return Ok(Resolution {
                    provider,
                    model: suffix.to_string(),
                    context: self.defaults.clone(),
                    display: display.to_string(),
                });
            }
        }

        Err(Error::ModelNotFound(display.to_string()))
    }

    /// Enumerate configured mappings for `GET /v1/models`.
    pub fn list_models(&self) -> Vec<ModelInfo> {
        self.listing
            .iter()
            .filter_map(|name| self.mappings.get(name))
            .map(|m| ModelInfo {
                id: m.name.clone(),
                object: "model",
                created: self.started_at,
                owned_by: m.provider.clone(),
            })
            .collect()
    }

    // ── Dispatch ───────────────────────────────────────────────────

    /// Buffered chat-completion call. Returns the upstream body verbatim.
    pub async fn dispatch(
        &self,
        resolution: &Resolution,
        messages: &[Message],
        params: &RequestParams,
    ) -> Result<ChatCompletion> {
        let provider = &resolution.provider;
        let body = build_chat_body(
            &resolution.model,
            provider.model_in_body(),
            messages,
            params,
            false,
        );

        tracing::debug!(
            provider = %provider.name,
            model = %resolution.model,
            "buffered dispatch"
        );

        let response = self.send(provider, &resolution.model, body).await?;
        let status = response.status();
        let text = tokio::time::timeout(provider.timeout, response.text())
            .await
            .map_err(|_| timeout_error(provider))?
            .map_err(|e| from_reqwest(&provider.name, e))?;

        if status.as_u16() >= 400 {
            return Err(Error::Provider {
                provider: provider.name.clone(),
                status: Some(status.as_u16()),
                message: short_diagnostic(&text),
            });
        }

        let raw = serde_json::from_str(&text).map_err(|e| Error::Provider {
            provider: provider.name.clone(),
            status: None,
            message: format!("invalid_response: {e}"),
        })?;
        Ok(ChatCompletion::new(raw))
    }

    /// Streaming chat-completion call. Produces a lazy, finite sequence
    /// of chunk events terminated by `Done`.
    pub async fn stream_dispatch(
        &self,
        resolution: &Resolution,
        messages: &[Message],
        params: &RequestParams,
    ) -> Result<BoxStream<'static, Result<ChunkEvent>>> {
        let provider = &resolution.provider;
        let body = build_chat_body(
            &resolution.model,
            provider.model_in_body(),
            messages,
            params,
            true,
        );

        tracing::debug!(
            provider = %provider.name,
            model = %resolution.model,
            "streaming dispatch"
        );

        let response = self.send(provider, &resolution.model, body).await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: provider.name.clone(),
                status: Some(status.as_u16()),
                message: short_diagnostic(&text),
            });
        }

        Ok(crate::sse::chunk_stream(response, provider.name.clone()))
    }

    /// POST the body with the provider's timeout bounding the request
    /// phase (connect + headers). Streaming bodies are read without a
    /// deadline; cancellation comes from the caller dropping the stream.
    async fn send(
        &self,
        provider: &Arc<ProviderHandle>,
        model: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response> {
        tokio::time::timeout(
            provider.timeout,
            provider.chat_post(model).json(&body).send(),
        )
        .await
        .map_err(|_| timeout_error(provider))?
        .map_err(|e| from_reqwest(&provider.name, e))
    }
}

fn timeout_error(provider: &ProviderHandle) -> Error {
    Error::Timeout(format!(
        "provider {} timed out after {}s",
        provider.name,
        provider.timeout.as_secs()
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarization seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The narrow surface the context engine needs for summarization calls.
/// Kept as a trait so reduction strategies are testable without HTTP.
#[async_trait::async_trait]
pub trait SummaryClient: Send + Sync {
    /// Run a buffered completion against `model` and return the text of
    /// the first choice.
    async fn complete_text(
        &self,
        model: &str,
        messages: Vec<Message>,
        max_tokens: Option<u32>,
    ) -> Result<String>;
}

#[async_trait::async_trait]
impl SummaryClient for ModelRouter {
    async fn complete_text(
        &self,
        model: &str,
        messages: Vec<Message>,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let resolution = self.resolve(model)?;
        let params = RequestParams {
            temperature: Some(0.1),
            max_tokens,
            ..Default::default()
        };
        let completion = self.dispatch(&resolution, &messages, &params).await?;
        completion
            .content()
            .map(str::to_string)
            .ok_or_else(|| Error::Provider {
                provider: resolution.provider.name.clone(),
                status: None,
                message: "empty completion content".into(),
            })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use mr_domain::config::ReductionMode;

    fn router() -> ModelRouter {
        let config: Config = toml::from_str(
            r#"
            [context]
            max_turns = 10

            [[providers]]
            name = "openai"
            base_url = "https://api.openai.com/v1"
            api_key = "sk-a"

            [[providers]]
            name = "restricted"
            base_url = "https://restricted.example.com"
            api_key = "sk-b"
            models = ["allowed-model"]

            [[models]]
            name = "official/gpt-4"
            provider = "openai"
            model = "gpt-4-0613"

            [[models]]
            name = "fast"
            provider = "openai"
            model = "gpt-3.5-turbo"
            context = { max_turns = 4, reduction_mode = "sliding_window" }
            "#,
        )
        .unwrap();
        ModelRouter::from_config(&config).unwrap()
    }

    #[test]
    fn mapping_lookup_wins() {
        let r = router().resolve("official/gpt-4").unwrap();
        assert_eq!(r.provider.name, "openai");
        assert_eq!(r.model, "gpt-4-0613");
        assert_eq!(r.context.max_turns, 10);
    }

    #[test]
    fn mapping_overrides_structural_parse() {
        // "official" is not a provider, but the mapping matches first —
        // and would win even if it were.
        let r = router().resolve("official/gpt-4").unwrap();
        assert_eq!(r.display, "official/gpt-4");
    }

    #[test]
    fn structural_split_uses_first_slash_only() {
        let r = router().resolve("openai/org/custom-model").unwrap();
        assert_eq!(r.provider.name, "openai");
        assert_eq!(r.model, "org/custom-model");
    }

    #[test]
    fn unknown_provider_prefix_fails() {
        assert!(matches!(
            router().resolve("ghost/x"),
            Err(Error::ModelNotFound(_))
        ));
    }

    #[test]
    fn bare_name_without_mapping_fails() {
        assert!(matches!(
            router().resolve("gpt-4"),
            Err(Error::ModelNotFound(_))
        ));
    }

    #[test]
    fn allow_list_blocks_unlisted_models() {
        assert!(router().resolve("restricted/allowed-model").is_ok());
        assert!(matches!(
            router().resolve("restricted/forbidden-model"),
            Err(Error::ModelNotFound(_))
        ));
    }

    #[test]
    fn per_model_context_override_applies() {
        let r = router().resolve("fast").unwrap();
        assert_eq!(r.context.max_turns, 4);
        assert_eq!(r.context.reduction_mode, ReductionMode::SlidingWindow);
    }

    #[test]
    fn list_models_enumerates_mappings_in_order() {
        let models = router().list_models();
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["official/gpt-4", "fast"]);
        assert!(models.iter().all(|m| m.owned_by == "openai"));
        assert!(models.iter().all(|m| m.object == "model"));
    }
}
