//! Context budget management for the running conversation.
//!
//! Token counts are a coarse character-based estimate; the goal is staying
//! under a model's window, not hitting it exactly.
use crate::session::{Message, Role};

/// Characters per token used for estimation.
pub const CHARS_PER_TOKEN: usize = 4;

/// Fraction of the context window at which trimming starts.
pub const TRIM_THRESHOLD: f64 = 0.8;

/// Non-system messages kept after a trim.
pub const KEEP_RECENT_MESSAGES: usize = 4;

/// Window assumed for models not in the table.
pub const DEFAULT_CONTEXT_LIMIT: usize = 16_000;

// Known context windows, matched exactly first and then by longest prefix.
const MODEL_CONTEXT_LIMITS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.1-mini", 1_047_576),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("o1", 200_000),
    ("o3", 200_000),
    ("o4-mini", 200_000),
    ("claude-3-5-sonnet", 200_000),
    ("claude-3-5-haiku", 200_000),
    ("claude-3-7-sonnet", 200_000),
    ("claude-sonnet-4", 200_000),
    ("claude-opus-4", 200_000),
    ("claude-3-opus", 200_000),
    ("claude-3-haiku", 200_000),
];

/// Look up a model's context window: exact name, then longest known
/// prefix, then [`DEFAULT_CONTEXT_LIMIT`].
pub fn context_limit(model: &str) -> usize {
    if let Some((_, limit)) = MODEL_CONTEXT_LIMITS.iter().find(|(name, _)| *name == model) {
        return *limit;
    }
    MODEL_CONTEXT_LIMITS
        .iter()
        .filter(|(name, _)| model.starts_with(name))
        .max_by_key(|(name, _)| name.len())
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}

pub fn estimate_text_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

pub fn estimate_tokens(conversation: &[Message]) -> usize {
    let chars: usize = conversation
        .iter()
        .map(|message| message.content.chars().count())
        .sum();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Trim the conversation to `[system] + last K` when the estimate exceeds
/// the threshold of the model's window. Returns whether anything was removed.
pub fn trim(conversation: &mut Vec<Message>, model: &str) -> bool {
    let limit = context_limit(model);
    let estimate = estimate_tokens(conversation);
    if (estimate as f64) <= limit as f64 * TRIM_THRESHOLD {
        return false;
    }
    let (system, rest) = split_system(conversation);
    if rest.len() <= KEEP_RECENT_MESSAGES {
        return false;
    }
    let mut trimmed = Vec::with_capacity(KEEP_RECENT_MESSAGES + 1);
    trimmed.extend(system);
    trimmed.extend_from_slice(&rest[rest.len() - KEEP_RECENT_MESSAGES..]);
    let before = conversation.len();
    *conversation = trimmed;
    tracing::debug!(
        model,
        estimate,
        limit,
        removed = before - conversation.len(),
        "trimmed conversation"
    );
    true
}

/// Reduce to the system message and the latest user turn. Used once after a
/// context-length rejection from the service.
pub fn prune_aggressive(conversation: &mut Vec<Message>) {
    let (system, rest) = split_system(conversation);
    let last_user = rest
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
        .cloned();
    let mut pruned = Vec::with_capacity(2);
    pruned.extend(system);
    pruned.extend(last_user);
    *conversation = pruned;
}

fn split_system(conversation: &[Message]) -> (Option<Message>, &[Message]) {
    match conversation.first() {
        Some(first) if first.role == Role::System => (Some(first.clone()), &conversation[1..]),
        _ => (None, conversation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_conversation(messages: usize, chars_each: usize) -> Vec<Message> {
        let mut conversation = vec![Message::system("system prompt")];
        for i in 0..messages {
            let body = "x".repeat(chars_each);
            if i % 2 == 0 {
                conversation.push(Message::user(format!("u{i} {body}")));
            } else {
                conversation.push(Message::assistant(format!("a{i} {body}")));
            }
        }
        conversation
    }

    #[test]
    fn limits_resolve_exact_then_longest_prefix_then_default() {
        assert_eq!(context_limit("gpt-4"), 8_192);
        assert_eq!(context_limit("gpt-4o-mini-2024-07-18"), 128_000);
        assert_eq!(context_limit("gpt-4-0613"), 8_192);
        assert_eq!(context_limit("gpt-4.1-2025-04-14"), 1_047_576);
        assert_eq!(context_limit("claude-sonnet-4-20250514"), 200_000);
        assert_eq!(context_limit("mystery-model"), DEFAULT_CONTEXT_LIMIT);
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(&[Message::user("abcde")]), 2);
        assert_eq!(estimate_tokens(&[]), 0);
        assert_eq!(estimate_text_tokens("abcd"), 1);
    }

    #[test]
    fn small_conversation_is_untouched() {
        let mut conversation = long_conversation(6, 10);
        let before = conversation.clone();
        assert!(!trim(&mut conversation, "gpt-4o"));
        assert_eq!(conversation, before);
    }

    #[test]
    fn large_conversation_keeps_system_and_recent() {
        // 10 messages of ~4000 chars ≈ 10k tokens > 80% of gpt-4's 8192.
        let mut conversation = long_conversation(10, 4_000);
        let last = conversation.last().cloned();
        assert!(trim(&mut conversation, "gpt-4"));
        assert_eq!(conversation.len(), KEEP_RECENT_MESSAGES + 1);
        assert_eq!(conversation[0].role, Role::System);
        assert_eq!(conversation.last().cloned(), last);
    }

    #[test]
    fn trim_is_idempotent() {
        let mut conversation = long_conversation(10, 4_000);
        trim(&mut conversation, "gpt-4");
        let once = conversation.clone();
        trim(&mut conversation, "gpt-4");
        assert_eq!(conversation, once);
    }

    #[test]
    fn system_message_survives_any_trim_sequence() {
        let mut conversation = vec![Message::system("sys")];
        for round in 0..30 {
            conversation.push(Message::user("y".repeat(3_000 + round * 100)));
            conversation.push(Message::assistant("z".repeat(2_000)));
            trim(&mut conversation, "gpt-4");
            assert_eq!(conversation[0].role, Role::System);
            assert_eq!(conversation[0].content, "sys");
        }
    }

    #[test]
    fn aggressive_prune_keeps_latest_user_turn() {
        let mut conversation = long_conversation(5, 10);
        conversation.push(Message::user("latest"));
        conversation.push(Message::assistant("partial"));
        prune_aggressive(&mut conversation);
        assert_eq!(
            conversation,
            vec![Message::system("system prompt"), Message::user("latest")]
        );
    }
}
