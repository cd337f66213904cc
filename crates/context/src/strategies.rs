//! Deterministic reduction strategies: truncation and sliding window.

use mr_domain::chat::Message;
use mr_domain::config::ContextConfig;

/// Split messages into the preserved head and the reducible body.
///
/// Preserved: system messages (when `preserve_system_messages` is set)
/// and summary markers from earlier reductions, in their original
/// relative order. Everything else is fair game for reduction.
pub(crate) fn partition_preserved(
    messages: &[Message],
    config: &ContextConfig,
) -> (Vec<Message>, Vec<Message>) {
    let mut head = Vec::new();
    let mut body = Vec::new();
    for m in messages {
        let preserved = m.is_summary()
            || (config.preserve_system_messages && m.role == mr_domain::chat::Role::System);
        if preserved {
            head.push(m.clone());
        } else {
            body.push(m.clone());
        }
    }
    (head, body)
}

/// Index into `body` where the kept tail begins: the suffix holding at
/// most `max_turns` turns (a turn starts at each user message). Ties
/// resolve toward keeping the newer message.
pub(crate) fn turn_boundary(body: &[Message], max_turns: usize) -> usize {
    if max_turns == 0 {
        return body.len();
    }
    let mut turns = 0;
    for (i, m) in body.iter().enumerate().rev() {
        if m.role == mr_domain::chat::Role::User {
            turns += 1;
            if turns >= max_turns {
                return i;
            }
        }
    }
    0
}

/// Keep the most recent messages so the result holds at most
/// `max_turns` turns. Oldest non-preserved messages go first. Produces
/// no summary; fully deterministic.
pub(crate) fn truncate(messages: &[Message], config: &ContextConfig) -> Vec<Message> {
    let (mut head, body) = partition_preserved(messages, config);
    let boundary = turn_boundary(&body, config.max_turns);
    head.extend_from_slice(&body[boundary..]);
    head
}

/// Keep the newest messages whose running token estimate stays within
/// `max_tokens`, then prepend the preserved head. Produces no summary.
pub(crate) fn sliding_window(messages: &[Message], config: &ContextConfig) -> Vec<Message> {
    let (mut head, body) = partition_preserved(messages, config);

    let mut kept = Vec::new();
    let mut total: u64 = 0;
    for m in body.iter().rev() {
        let tokens = m.estimated_tokens();
        if total + tokens > config.max_tokens {
            break;
        }
        total += tokens;
        kept.push(m.clone());
    }
    kept.reverse();

    head.extend(kept);
    head
}

/// Partition for summarization: `(head, old, kept)` where `kept` is the
/// tail fitting `max_turns` turns and `old` is everything before it.
pub(crate) fn split_for_summary(
    messages: &[Message],
    config: &ContextConfig,
) -> (Vec<Message>, Vec<Message>, Vec<Message>) {
    let (head, body) = partition_preserved(messages, config);
    let boundary = turn_boundary(&body, config.max_turns);
    let old = body[..boundary].to_vec();
    let kept = body[boundary..].to_vec();
    (head, old, kept)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use mr_domain::chat::Role;

    fn turns(n: usize) -> Vec<Message> {
        let mut out = Vec::new();
        for i in 0..n {
            out.push(Message::user(format!("question {i}")));
            out.push(Message::assistant(format!("answer {i}")));
        }
        out
    }

    fn config(max_turns: usize, max_tokens: u64) -> ContextConfig {
        ContextConfig {
            max_turns,
            max_tokens,
            ..Default::default()
        }
    }

    #[test]
    fn truncate_keeps_newest_turns() {
        let messages = turns(12);
        let result = truncate(&messages, &config(10, u64::MAX));

        let users: Vec<_> = result
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users.len(), 10);
        assert_eq!(users[0], "question 2");
        assert_eq!(users[9], "question 11");
    }

    #[test]
    fn truncate_result_is_contiguous_suffix() {
        let messages = turns(8);
        let result = truncate(&messages, &config(3, u64::MAX));
        // 3 turns = the last 6 messages, in input order.
        assert_eq!(result, messages[messages.len() - 6..].to_vec());
    }

    #[test]
    fn truncate_under_budget_is_identity() {
        let messages = turns(4);
        assert_eq!(truncate(&messages, &config(10, u64::MAX)), messages);
    }

    #[test]
    fn truncate_preserves_system_head() {
        let mut messages = vec![Message::system("you are terse")];
        messages.extend(turns(6));
        messages.insert(5, Message::system("mid-conversation instruction"));

        let result = truncate(&messages, &config(2, u64::MAX));

        assert_eq!(result[0].content, "you are terse");
        assert_eq!(result[1].content, "mid-conversation instruction");
        assert!(result[2..].iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn truncate_keeps_trailing_user_message() {
        // A new user turn with no assistant reply yet must survive.
        let mut messages = turns(11);
        messages.push(Message::user("the new question"));

        let result = truncate(&messages, &config(10, u64::MAX));
        assert_eq!(result.last().unwrap().content, "the new question");
        let users = result.iter().filter(|m| m.role == Role::User).count();
        assert_eq!(users, 10);
    }

    #[test]
    fn sliding_window_respects_token_budget() {
        // Each message is 40 chars = 10 tokens.
        let messages: Vec<_> = (0..10)
            .map(|i| Message::user(format!("{i:0>40}")))
            .collect();

        let result = sliding_window(&messages, &config(100, 35));
        // 3 messages fit (30 tokens); a 4th would exceed 35.
        assert_eq!(result.len(), 3);
        assert_eq!(result.last().unwrap().content, format!("{:0>40}", 9));
    }

    #[test]
    fn sliding_window_prepends_preserved_system() {
        let mut messages = vec![Message::system(&"s".repeat(400))]; // 100 tokens, exempt
        messages.extend((0..5).map(|i| Message::user(format!("{i:0>40}"))));

        let result = sliding_window(&messages, &config(100, 20));
        assert_eq!(result[0].role, Role::System);
        // Budget covers two 10-token messages besides the head.
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn sliding_window_empty_budget_keeps_only_head() {
        let mut messages = vec![Message::system("keep me")];
        messages.extend(turns(2));
        let result = sliding_window(&messages, &config(100, 0));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content, "keep me");
    }

    #[test]
    fn split_for_summary_partitions_old_and_kept() {
        let messages = turns(7);
        let (head, old, kept) = split_for_summary(&messages, &config(2, u64::MAX));

        assert!(head.is_empty());
        assert_eq!(old.len(), 10); // 5 turns summarized
        assert_eq!(kept.len(), 4); // last 2 turns kept
        assert_eq!(kept[0].content, "question 5");
    }

    #[test]
    fn summary_markers_are_never_reduced() {
        let mut messages = vec![Message::summary("previous summary")];
        messages.extend(turns(6));

        let cfg = ContextConfig {
            preserve_system_messages: false,
            ..config(2, u64::MAX)
        };
        let result = truncate(&messages, &cfg);
        assert!(result[0].is_summary());
    }
}
