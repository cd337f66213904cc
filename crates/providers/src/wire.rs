//! OpenAI chat-completions wire format.
//!
//! Inbound requests are deserialized into typed structs; upstream
//! response bodies stay as raw `serde_json::Value` so unknown fields —
//! especially reasoning-model delta channels — survive the round trip
//! bit-for-bit.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mr_domain::chat::{Message, Role};
use mr_domain::error::{Error, Result};
use mr_domain::stream::{StreamChunk, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An OpenAI-compatible `POST /v1/chat/completions` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    /// OpenAI's caller-identity hint; feeds session-key derivation.
    #[serde(default)]
    pub user: Option<String>,
}

impl ChatCompletionRequest {
    /// Semantic validation beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.model.is_empty() {
            return Err(Error::InvalidRequest("model must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(Error::InvalidRequest(
                "messages must contain at least one entry".into(),
            ));
        }
        for (i, m) in self.messages.iter().enumerate() {
            m.role()
                .map_err(|e| Error::InvalidRequest(format!("messages[{i}]: {e}")))?;
        }
        Ok(())
    }

    /// The sampling parameters forwarded upstream unchanged.
    pub fn params(&self) -> RequestParams {
        RequestParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }

    /// Convert the wire messages into domain messages. Fails on unknown
    /// roles.
    pub fn to_messages(&self) -> Result<Vec<Message>> {
        self.messages.iter().map(WireMessage::to_message).collect()
    }
}

/// One `{role, content, name?}` entry from the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl WireMessage {
    pub fn role(&self) -> Result<Role> {
        match self.role.as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(Error::InvalidRequest(format!("unknown role \"{other}\""))),
        }
    }

    pub fn to_message(&self) -> Result<Message> {
        Ok(Message {
            role: self.role()?,
            content: self.content.clone(),
            name: self.name.clone(),
            timestamp: None,
        })
    }
}

/// Pass-through sampling parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound body
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the upstream request body with the rewritten model name.
///
/// `include_model` is false for Azure, which carries the deployment name
/// in the URL instead.
pub fn build_chat_body(
    actual_model: &str,
    include_model: bool,
    messages: &[Message],
    params: &RequestParams,
    stream: bool,
) -> Value {
    let wire_messages: Vec<Value> = messages
        .iter()
        .map(|m| {
            let mut obj = serde_json::json!({
                "role": m.role.as_str(),
                "content": m.content,
            });
            if let Some(ref name) = m.name {
                obj["name"] = Value::String(name.clone());
            }
            obj
        })
        .collect();

    let mut body = serde_json::json!({
        "messages": wire_messages,
        "stream": stream,
    });
    if include_model {
        body["model"] = Value::String(actual_model.to_string());
    }
    if let Some(t) = params.temperature {
        body["temperature"] = serde_json::json!(t);
    }
    if let Some(m) = params.max_tokens {
        body["max_tokens"] = serde_json::json!(m);
    }
    if let Some(p) = params.top_p {
        body["top_p"] = serde_json::json!(p);
    }
    if let Some(f) = params.frequency_penalty {
        body["frequency_penalty"] = serde_json::json!(f);
    }
    if let Some(p) = params.presence_penalty {
        body["presence_penalty"] = serde_json::json!(p);
    }
    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Buffered response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A buffered chat-completion response.
///
/// The raw upstream body is returned to the caller unchanged apart from
/// the `model` field, which the orchestrator rewrites back to the
/// display name.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    raw: Value,
}

impl ChatCompletion {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// `choices[0].message.content`, when present.
    pub fn content(&self) -> Option<&str> {
        self.raw
            .get("choices")?
            .as_array()?
            .first()?
            .get("message")?
            .get("content")?
            .as_str()
    }

    pub fn usage(&self) -> Option<Usage> {
        parse_usage(self.raw.get("usage")?)
    }

    pub fn set_model(&mut self, model: &str) {
        if let Value::Object(ref mut map) = self.raw {
            map.insert("model".into(), Value::String(model.to_string()));
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming chunk extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extract the accumulation-relevant fields from an upstream chunk.
///
/// The payload text is kept verbatim; unknown delta fields (and even key
/// order) are re-emitted untouched when the chunk is forwarded
/// downstream. Fails on malformed JSON.
pub fn parse_chunk(raw: &str) -> std::result::Result<StreamChunk, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;

    let choice = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());
    let delta = choice.and_then(|c| c.get("delta"));

    let content = delta
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    // Reasoning channels: DeepSeek-R1 style `reasoning_content`, o1-style
    // `thinking`.
    let reasoning = delta
        .and_then(|d| {
            d.get("reasoning_content")
                .or_else(|| d.get("thinking"))
        })
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|v| v.as_str())
        .map(String::from);

    let usage = value.get("usage").and_then(parse_usage);

    Ok(StreamChunk {
        raw: raw.to_string(),
        content,
        reasoning,
        finish_reason,
        usage,
    })
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_deserializes_with_defaults() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"official/gpt-4","messages":[{"role":"user","content":"Hi"}]}"#,
        )
        .unwrap();
        assert!(!req.stream);
        assert!(req.temperature.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn request_rejects_unknown_role() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"m","messages":[{"role":"tool","content":"x"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            req.validate(),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn request_rejects_empty_messages() {
        let req: ChatCompletionRequest =
            serde_json::from_str(r#"{"model":"m","messages":[]}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn body_rewrites_model_and_passes_params() {
        let messages = vec![Message::user("Hi")];
        let params = RequestParams {
            temperature: Some(0.7),
            max_tokens: Some(128),
            ..Default::default()
        };
        let body = build_chat_body("gpt-4-0613", true, &messages, &params, false);

        assert_eq!(body["model"], "gpt-4-0613");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["stream"], false);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn azure_body_omits_model() {
        let body = build_chat_body(
            "gpt-4",
            false,
            &[Message::user("Hi")],
            &RequestParams::default(),
            true,
        );
        assert!(body.get("model").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn completion_accessors() {
        let mut completion = ChatCompletion::new(serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4-0613",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
        }));
        assert_eq!(completion.content(), Some("Hello"));
        assert_eq!(completion.usage().unwrap().total_tokens, 2);

        completion.set_model("official/gpt-4");
        assert_eq!(completion.as_value()["model"], "official/gpt-4");
        // Everything else stays untouched.
        assert_eq!(completion.as_value()["id"], "chatcmpl-1");
    }

    #[test]
    fn chunk_extracts_content_delta() {
        let chunk =
            parse_chunk(r#"{"choices":[{"index":0,"delta":{"content":"42"}}]}"#).unwrap();
        assert_eq!(chunk.content.as_deref(), Some("42"));
        assert!(chunk.reasoning.is_none());
    }

    #[test]
    fn chunk_extracts_reasoning_channels() {
        let r1 = parse_chunk(r#"{"choices":[{"delta":{"reasoning_content":"Let me think"}}]}"#)
            .unwrap();
        assert_eq!(r1.reasoning.as_deref(), Some("Let me think"));

        let o1 = parse_chunk(r#"{"choices":[{"delta":{"thinking":"hmm"}}]}"#).unwrap();
        assert_eq!(o1.reasoning.as_deref(), Some("hmm"));
    }

    #[test]
    fn chunk_preserves_unknown_delta_fields_verbatim() {
        // Unknown vendor fields and key order survive because the raw
        // payload text is what gets re-emitted.
        let raw =
            r#"{"choices":[{"delta":{"zeta":1,"content":"x","vendor_annotations":{"salience":0.9}}}]}"#;
        let chunk = parse_chunk(raw).unwrap();
        assert_eq!(chunk.raw, raw);
        assert_eq!(chunk.content.as_deref(), Some("x"));
    }

    #[test]
    fn chunk_usage_and_finish_reason() {
        let chunk = parse_chunk(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12}}"#,
        )
        .unwrap();
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
        assert_eq!(chunk.usage.unwrap().completion_tokens, 7);
    }

    #[test]
    fn malformed_chunk_is_an_error() {
        assert!(parse_chunk("{not json").is_err());
    }
}
