//! LLM-driven summarization strategy.
//!
//! Old turns are serialized into a prompt and collapsed into a single
//! synthetic system message placed at the head of the reduced history.
//! The caller (engine) owns the truncation fallback; everything here
//! surfaces failures as errors.

use mr_domain::chat::{Message, Role};
use mr_domain::config::ContextConfig;
use mr_domain::error::{Error, Result};
use mr_providers::SummaryClient;

use crate::strategies::split_for_summary;

/// Run the summarization strategy over `messages`.
///
/// Returns the reduced history and the summary text. Errors when there
/// is nothing old enough to summarize, when the summarization model is
/// missing, when the upstream call fails, or when it returns an empty
/// summary — all of which the engine converts into a truncation
/// fallback.
pub(crate) async fn summarize(
    messages: &[Message],
    config: &ContextConfig,
    client: &dyn SummaryClient,
) -> Result<(Vec<Message>, String)> {
    let model = config
        .summarization_model
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| Error::Config("summarization_model is not configured".into()))?;

    let (head, old, kept) = split_for_summary(messages, config);
    if old.is_empty() {
        return Err(Error::Other("no messages old enough to summarize".into()));
    }

    let prompt = build_prompt(&old, config);
    let max_tokens = u32::try_from(config.max_tokens).unwrap_or(u32::MAX);
    let summary = client
        .complete_text(model, vec![Message::user(prompt)], Some(max_tokens))
        .await?;

    let summary = summary.trim().to_string();
    if summary.is_empty() {
        return Err(Error::Other("summarization returned an empty result".into()));
    }

    let mut reduced = head;
    reduced.push(Message::summary(&summary));
    reduced.extend(kept);
    Ok((reduced, summary))
}

fn build_prompt(old: &[Message], config: &ContextConfig) -> String {
    let mut prompt = config
        .summary_prompt
        .replace("{max_tokens}", &config.max_tokens.to_string());
    prompt.push_str("\n\n");
    for m in old {
        let label = match m.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(&m.content);
        prompt.push('\n');
    }
    prompt.push_str("\nSummary:");
    prompt
}
