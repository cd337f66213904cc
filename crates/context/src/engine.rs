//! Reduction trigger and strategy dispatch.

use mr_domain::chat::ConversationHistory;
use mr_domain::config::{ContextConfig, ReductionMode};
use mr_providers::SummaryClient;

use crate::strategies;
use crate::summarize;

/// True when the history exceeds either budget: more turns than
/// `max_turns`, or more estimated tokens than `max_tokens`.
pub fn should_reduce(history: &ConversationHistory, config: &ContextConfig) -> bool {
    history.turn_count() > config.max_turns || history.estimated_tokens() > config.max_tokens
}

/// The result of one reduction pass.
pub struct ReductionOutcome {
    pub history: ConversationHistory,
    /// The summary text, when summarization ran and succeeded. The
    /// orchestrator appends it to the session's memory zone.
    pub summary: Option<String>,
    /// Strategy that actually ran (`"truncation"` after a fallback).
    pub strategy: &'static str,
    /// True when summarization failed and truncation ran instead.
    pub fallback: bool,
}

/// Apply the configured reduction strategy.
///
/// Never fails: a summarization error degrades to truncation over the
/// same input with a warning, per the recovery policy.
pub async fn apply_strategy(
    history: &ConversationHistory,
    config: &ContextConfig,
    client: &dyn SummaryClient,
) -> ReductionOutcome {
    let messages = history.messages();

    match config.reduction_mode {
        ReductionMode::Truncation => ReductionOutcome {
            history: ConversationHistory::from_messages(strategies::truncate(messages, config)),
            summary: None,
            strategy: "truncation",
            fallback: false,
        },
        ReductionMode::SlidingWindow => ReductionOutcome {
            history: ConversationHistory::from_messages(strategies::sliding_window(
                messages, config,
            )),
            summary: None,
            strategy: "sliding_window",
            fallback: false,
        },
        ReductionMode::Summarization => match summarize::summarize(messages, config, client).await
        {
            Ok((reduced, summary)) => ReductionOutcome {
                history: ConversationHistory::from_messages(reduced),
                summary: Some(summary),
                strategy: "summarization",
                fallback: false,
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "summarization failed; falling back to truncation"
                );
                ReductionOutcome {
                    history: ConversationHistory::from_messages(strategies::truncate(
                        messages, config,
                    )),
                    summary: None,
                    strategy: "truncation",
                    fallback: true,
                }
            }
        },
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use mr_domain::chat::{Message, Role};
    use mr_domain::error::{Error, Result};

    struct FixedSummarizer(&'static str);

    #[async_trait::async_trait]
    impl SummaryClient for FixedSummarizer {
        async fn complete_text(
            &self,
            _model: &str,
            _messages: Vec<Message>,
            _max_tokens: Option<u32>,
        ) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingSummarizer;

    #[async_trait::async_trait]
    impl SummaryClient for FailingSummarizer {
        async fn complete_text(
            &self,
            _model: &str,
            _messages: Vec<Message>,
            _max_tokens: Option<u32>,
        ) -> Result<String> {
            Err(Error::Provider {
                provider: "mock".into(),
                status: Some(500),
                message: "upstream exploded".into(),
            })
        }
    }

    fn history(turns: usize) -> ConversationHistory {
        let mut h = ConversationHistory::new();
        for i in 0..turns {
            h.push(Message::user(format!("question number {i}")));
            h.push(Message::assistant(format!("a rather long answer {i}")));
        }
        h
    }

    fn summarization_config(max_turns: usize) -> ContextConfig {
        ContextConfig {
            max_turns,
            max_tokens: 1_000_000,
            reduction_mode: ReductionMode::Summarization,
            summarization_model: Some("official/gpt-3.5".into()),
            ..Default::default()
        }
    }

    #[test]
    fn should_reduce_on_turn_budget() {
        let config = ContextConfig {
            max_turns: 10,
            max_tokens: u64::MAX,
            ..Default::default()
        };
        assert!(!should_reduce(&history(10), &config));
        assert!(should_reduce(&history(11), &config));
    }

    #[test]
    fn should_reduce_on_token_budget() {
        let config = ContextConfig {
            max_turns: usize::MAX,
            max_tokens: 10,
            ..Default::default()
        };
        let mut h = ConversationHistory::new();
        h.push(Message::user("x".repeat(39))); // 10 tokens
        assert!(!should_reduce(&h, &config));
        h.push(Message::user("y")); // 11 tokens total
        assert!(should_reduce(&h, &config));
    }

    #[test]
    fn system_messages_do_not_count_as_turns() {
        let config = ContextConfig {
            max_turns: 1,
            max_tokens: u64::MAX,
            ..Default::default()
        };
        let mut h = ConversationHistory::new();
        h.push(Message::system("a"));
        h.push(Message::system("b"));
        h.push(Message::user("only turn"));
        assert!(!should_reduce(&h, &config));
    }

    #[tokio::test]
    async fn summarization_produces_marked_summary_at_head() {
        let h = history(8);
        let config = summarization_config(2);
        let outcome = apply_strategy(&h, &config, &FixedSummarizer("they talked")).await;

        assert_eq!(outcome.strategy, "summarization");
        assert!(!outcome.fallback);
        assert_eq!(outcome.summary.as_deref(), Some("they talked"));

        let messages = outcome.history.messages();
        assert!(messages[0].is_summary());
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "they talked");
        // 2 kept turns follow the summary.
        assert_eq!(messages.len(), 5);
        assert!(outcome.history.estimated_tokens() < h.estimated_tokens());
    }

    #[tokio::test]
    async fn summarization_failure_falls_back_to_truncation() {
        let h = history(8);
        let config = summarization_config(2);
        let outcome = apply_strategy(&h, &config, &FailingSummarizer).await;

        assert_eq!(outcome.strategy, "truncation");
        assert!(outcome.fallback);
        assert!(outcome.summary.is_none());
        // Truncation over the same input: last 2 turns survive.
        assert_eq!(outcome.history.turn_count(), 2);
    }

    #[tokio::test]
    async fn empty_summary_falls_back() {
        let h = history(8);
        let config = summarization_config(2);
        let outcome = apply_strategy(&h, &config, &FixedSummarizer("   ")).await;

        assert!(outcome.fallback);
        assert!(outcome.summary.is_none());
    }

    #[tokio::test]
    async fn prior_summary_survives_second_reduction() {
        let config = summarization_config(2);
        let first = apply_strategy(&history(8), &config, &FixedSummarizer("round one")).await;

        // Grow the reduced history past the budget again.
        let mut h = first.history.clone();
        for i in 0..6 {
            h.push(Message::user(format!("later question {i}")));
            h.push(Message::assistant(format!("later answer {i}")));
        }
        let second = apply_strategy(&h, &config, &FixedSummarizer("round two")).await;

        let messages = second.history.messages();
        // Both summaries sit at the head, oldest first; the first one was
        // preserved rather than re-summarized.
        assert_eq!(messages[0].content, "round one");
        assert_eq!(messages[1].content, "round two");
        assert!(messages[0].is_summary() && messages[1].is_summary());
    }

    #[tokio::test]
    async fn truncation_mode_never_calls_client() {
        let config = ContextConfig {
            max_turns: 3,
            max_tokens: u64::MAX,
            reduction_mode: ReductionMode::Truncation,
            ..Default::default()
        };
        // FailingSummarizer would error the test if it were consulted.
        let outcome = apply_strategy(&history(10), &config, &FailingSummarizer).await;
        assert_eq!(outcome.strategy, "truncation");
        assert!(!outcome.fallback);
        assert_eq!(outcome.history.turn_count(), 3);
    }
}
