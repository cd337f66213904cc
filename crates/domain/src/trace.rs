use serde::Serialize;

/// Structured trace events emitted across all ModelRelay crates.
///
/// Every event carries a correlation id and the session key it belongs
/// to. API keys are never part of an event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    ApiCall {
        correlation_id: String,
        session_key: String,
        model: String,
        stream: bool,
        message_count: usize,
    },
    ApiCompletion {
        correlation_id: String,
        session_key: String,
        model: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
        /// True when the counts are `chars/4` estimates rather than
        /// provider-reported usage.
        estimated: bool,
        duration_ms: u64,
    },
    ContextReduction {
        correlation_id: String,
        session_key: String,
        strategy: String,
        /// True when summarization failed and truncation ran instead.
        fallback: bool,
        before_tokens: u64,
        after_tokens: u64,
    },
    ProviderError {
        correlation_id: String,
        session_key: String,
        provider: String,
        status: Option<u16>,
        message: String,
    },
    ReasoningDetected {
        correlation_id: String,
        session_key: String,
        model: String,
        reasoning_length: usize,
    },
    SessionExpired {
        correlation_id: String,
        session_key: String,
        idle_secs: i64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "mr_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_snake_case() {
        let ev = TraceEvent::ContextReduction {
            correlation_id: "c1".into(),
            session_key: "alice:42".into(),
            strategy: "truncation".into(),
            fallback: false,
            before_tokens: 900,
            after_tokens: 400,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "context_reduction");
        assert_eq!(v["session_key"], "alice:42");
    }
}
