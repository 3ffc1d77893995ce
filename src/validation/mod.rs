//! Validation Service — checks whether the Active Context fits the
//! model's effective token budget and, when it doesn't, proposes concrete
//! remediation.
//!
//! `effectiveLimit = ollamaLimit - safetyMargin` is computed by the caller
//! (the Context Manager); this module only ever sees the already-adjusted
//! limit.

use serde::{Deserialize, Serialize};

/// A message-shaped input to [`validate`]. The Validation Service doesn't
/// need the full message body, only its role and already-counted tokens.
#[derive(Debug, Clone, Copy)]
pub struct MessageTokens {
    pub role: Role,
    pub token_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Compress,
    MergeCheckpoints,
    EmergencyRollover,
    RemoveMessages,
}

/// A single piece of remediation advice produced when validation fails.
/// `priority` is 1-indexed with 1 highest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    pub priority: u8,
    pub estimated_tokens_freed: usize,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub tokens: usize,
    pub limit: usize,
    pub overage: Option<usize>,
    pub errors: Option<Vec<String>>,
    pub suggestions: Option<Vec<Suggestion>>,
}

/// `validate(messages, effective_limit)`. See module docs.
pub fn validate(messages: &[MessageTokens], effective_limit: usize) -> ValidationResult {
    let tokens: usize = messages.iter().map(|m| m.token_count).sum();

    if tokens <= effective_limit {
        return ValidationResult {
            valid: true,
            tokens,
            limit: effective_limit,
            overage: None,
            errors: None,
            suggestions: None,
        };
    }

    let overage = tokens - effective_limit;
    let suggestions = build_suggestions(messages, tokens, overage);

    ValidationResult {
        valid: false,
        tokens,
        limit: effective_limit,
        overage: Some(overage),
        errors: Some(vec![format!(
            "context exceeds effective limit by {overage} tokens ({tokens}/{effective_limit})"
        )]),
        suggestions: Some(suggestions),
    }
}

fn build_suggestions(
    messages: &[MessageTokens],
    tokens: usize,
    overage: usize,
) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    let assistant_tokens: usize = messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.token_count)
        .sum();
    let assistant_count = messages.iter().filter(|m| m.role == Role::Assistant).count();

    if assistant_count >= 2 {
        suggestions.push(Suggestion {
            kind: SuggestionType::Compress,
            priority: 1,
            estimated_tokens_freed: assistant_tokens.max(overage),
            description: format!(
                "compress {assistant_count} older assistant messages to free roughly {assistant_tokens} tokens"
            ),
        });
    }

    let removable_tokens: usize = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .take(messages.len().saturating_sub(1))
        .map(|m| m.token_count)
        .sum();
    if removable_tokens > 0 {
        suggestions.push(Suggestion {
            kind: SuggestionType::RemoveMessages,
            priority: 2,
            estimated_tokens_freed: removable_tokens,
            description: "remove the oldest non-system messages from the active window"
                .to_string(),
        });
    }

    suggestions.push(Suggestion {
        kind: SuggestionType::MergeCheckpoints,
        priority: 3,
        estimated_tokens_freed: (overage / 2).max(1),
        description: "merge adjacent checkpoints into a single, denser summary".to_string(),
    });

    if overage as f64 > 0.5 * tokens as f64 {
        suggestions.push(Suggestion {
            kind: SuggestionType::EmergencyRollover,
            priority: 4,
            estimated_tokens_freed: tokens.saturating_sub(tokens / 4),
            description: "roll over to a fresh context, keeping only the system prompt and the \
                          most recent exchange"
                .to_string(),
        });
    }

    suggestions.sort_by_key(|s| s.priority);

    debug_assert!(
        suggestions
            .iter()
            .any(|s| s.estimated_tokens_freed as f64 >= overage as f64 * 0.5),
        "at least one suggestion must free at least half the overage"
    );

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, tokens: usize) -> MessageTokens {
        MessageTokens {
            role,
            token_count: tokens,
        }
    }

    #[test]
    fn under_limit_is_valid_with_no_suggestions() {
        let messages = vec![msg(Role::System, 10), msg(Role::User, 20)];
        let result = validate(&messages, 100);
        assert!(result.valid);
        assert_eq!(result.tokens, 30);
        assert!(result.overage.is_none());
        assert!(result.suggestions.is_none());
    }

    #[test]
    fn exactly_at_limit_is_valid() {
        let messages = vec![msg(Role::User, 100)];
        let result = validate(&messages, 100);
        assert!(result.valid);
    }

    #[test]
    fn over_limit_reports_overage_and_suggestions() {
        let messages = vec![
            msg(Role::System, 50),
            msg(Role::User, 100),
            msg(Role::Assistant, 400),
            msg(Role::User, 100),
            msg(Role::Assistant, 400),
        ];
        let result = validate(&messages, 200);
        assert!(!result.valid);
        assert_eq!(result.tokens, 1050);
        assert_eq!(result.overage, Some(850));
        let suggestions = result.suggestions.expect("suggestions");
        assert!(!suggestions.is_empty());
        assert!(suggestions.windows(2).all(|w| w[0].priority <= w[1].priority));
        assert!(suggestions
            .iter()
            .any(|s| s.estimated_tokens_freed as f64 >= 850.0 * 0.5));
    }

    #[test]
    fn severe_overage_includes_emergency_rollover() {
        let messages = vec![msg(Role::Assistant, 1000), msg(Role::User, 1000)];
        let result = validate(&messages, 100);
        let suggestions = result.suggestions.expect("suggestions");
        assert!(suggestions
            .iter()
            .any(|s| s.kind == SuggestionType::EmergencyRollover));
    }
}
