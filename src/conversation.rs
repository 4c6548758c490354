//! Conversation transcript with a token budget
//!
//! A [`ConversationBuffer`] holds the turns of one chat session in
//! conversational order. Before each request to the chat backend the buffer
//! is trimmed with [`ConversationBuffer::enforce_budget`], which evicts the
//! oldest non-system turns until the estimate fits.
//!
//! Token counts are a character heuristic, not a tokenizer. The estimate can
//! be off from the backend's real count by a fair margin, so `max_tokens`
//! should sit comfortably below the model's context limit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Speaker role of a [`Turn`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona prompt, always first
    System,
    /// Human participant
    User,
    /// Model reply
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a wire role name, unknown names map to `None`
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who said it
    pub role: Role,
    /// What was said
    pub content: String,
}

impl Turn {
    /// Create a turn
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Token estimation parameters and the budget they are checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudget {
    /// Upper bound on the estimated transcript size
    pub max_tokens: usize,
    /// Characters counted as one token
    pub chars_per_token: usize,
    /// Fixed cost of every message (role framing)
    pub per_message_overhead: usize,
    /// Fixed cost of priming the reply
    pub reply_overhead: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            chars_per_token: 4,
            per_message_overhead: 4,
            reply_overhead: 2,
        }
    }
}

impl TokenBudget {
    /// Budget with default estimation parameters and a custom limit
    #[must_use]
    pub fn with_max_tokens(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Self::default()
        }
    }

    /// Approximate tokens for a piece of text
    #[must_use]
    pub fn text_tokens(&self, text: &str) -> usize {
        text.chars().count() / self.chars_per_token.max(1)
    }

    /// Approximate tokens for a single turn, excluding the reply overhead
    #[must_use]
    pub fn turn_tokens(&self, turn: &Turn) -> usize {
        self.per_message_overhead
            + self.text_tokens(turn.role.as_str())
            + self.text_tokens(&turn.content)
    }

    /// Approximate tokens for a sequence of turns sent as one request
    #[must_use]
    pub fn estimate<'a>(&self, turns: impl IntoIterator<Item = &'a Turn>) -> usize {
        turns
            .into_iter()
            .map(|t| self.turn_tokens(t))
            .sum::<usize>()
            + self.reply_overhead
    }
}

/// Ordered chat transcript bounded by a [`TokenBudget`]
#[derive(Debug, Clone, Default)]
pub struct ConversationBuffer {
    turns: Vec<Turn>,
    budget: TokenBudget,
}

impl ConversationBuffer {
    /// Create an empty buffer
    #[must_use]
    pub const fn new(budget: TokenBudget) -> Self {
        Self {
            turns: Vec::new(),
            budget,
        }
    }

    /// Create a buffer that starts with a system prompt
    #[must_use]
    pub fn with_system_prompt(budget: TokenBudget, prompt: impl Into<String>) -> Self {
        let mut buffer = Self::new(budget);
        buffer.append(Turn::system(prompt));
        buffer
    }

    /// The budget this buffer enforces
    #[must_use]
    pub const fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Append a turn at the end of the transcript
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Set the system prompt, replacing an existing one at index 0
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let turn = Turn::system(prompt);
        if self.has_system_turn() {
            self.turns[0] = turn;
        } else {
            self.turns.insert(0, turn);
        }
    }

    /// The system prompt, if one is present
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
    }

    fn has_system_turn(&self) -> bool {
        self.turns.first().is_some_and(|t| t.role == Role::System)
    }

    /// Estimated token count of the whole transcript plus the reply priming
    #[must_use]
    pub fn estimate_tokens(&self) -> usize {
        self.budget.estimate(&self.turns)
    }

    /// Whether the estimate is within `max_tokens`
    #[must_use]
    pub fn within_budget(&self) -> bool {
        self.estimate_tokens() <= self.budget.max_tokens
    }

    /// Evict the oldest non-system turns until the transcript fits
    ///
    /// The system turn and the most recent turn are never evicted. When those
    /// alone exceed the budget the buffer is left over budget.
    ///
    /// Returns the number of evicted turns.
    pub fn enforce_budget(&mut self) -> usize {
        let first_evictable = usize::from(self.has_system_turn());
        let floor = first_evictable + 1;
        let mut evicted = 0;

        while self.turns.len() > floor && !self.within_budget() {
            self.turns.remove(first_evictable);
            evicted += 1;
            tracing::debug!(
                tokens = self.estimate_tokens(),
                remaining = self.turns.len(),
                "evicted oldest turn"
            );
        }

        if !self.within_budget() {
            tracing::warn!(
                tokens = self.estimate_tokens(),
                max_tokens = self.budget.max_tokens,
                "transcript over budget at eviction floor"
            );
        }

        evicted
    }

    /// Owned copy of the transcript in order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Borrowed view of the transcript
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Remove and return the most recent turn, the system turn excepted
    pub fn pop_last(&mut self) -> Option<Turn> {
        if self.turns.len() == 1 && self.has_system_turn() {
            return None;
        }
        self.turns.pop()
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the transcript has no turns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Human-readable dump of the transcript
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            out.push('[');
            out.push_str(turn.role.as_str());
            out.push_str("]\n");
            out.push_str(turn.content.trim());
            out.push_str("\n\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_tokens_floors_chars() {
        let budget = TokenBudget::default();
        assert_eq!(budget.text_tokens(""), 0);
        assert_eq!(budget.text_tokens("abc"), 0);
        assert_eq!(budget.text_tokens("abcd"), 1);
        assert_eq!(budget.text_tokens("hello world"), 2);
    }

    #[test]
    fn text_tokens_counts_chars_not_bytes() {
        let budget = TokenBudget::default();
        // 4 chars, 8 bytes
        assert_eq!(budget.text_tokens("éééé"), 1);
    }

    #[test]
    fn turn_tokens_include_role_and_overhead() {
        let budget = TokenBudget::default();
        // 4 overhead + "user" (1) + 8 chars (2)
        assert_eq!(budget.turn_tokens(&Turn::user("12345678")), 7);
        // "assistant" is 9 chars -> 2
        assert_eq!(budget.turn_tokens(&Turn::assistant("")), 6);
    }

    #[test]
    fn empty_buffer_costs_reply_overhead() {
        let buffer = ConversationBuffer::new(TokenBudget::default());
        assert_eq!(buffer.estimate_tokens(), 2);
    }

    #[test]
    fn role_round_trips_through_wire_names() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("tool"), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn set_system_prompt_replaces_in_place() {
        let mut buffer = ConversationBuffer::with_system_prompt(TokenBudget::default(), "one");
        buffer.append(Turn::user("hi"));
        buffer.set_system_prompt("two");

        assert_eq!(buffer.system_prompt(), Some("two"));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn set_system_prompt_inserts_at_front() {
        let mut buffer = ConversationBuffer::new(TokenBudget::default());
        buffer.append(Turn::user("hi"));
        buffer.set_system_prompt("persona");

        assert_eq!(buffer.turns()[0], Turn::system("persona"));
        assert_eq!(buffer.turns()[1], Turn::user("hi"));
    }

    #[test]
    fn pop_last_keeps_lone_system_turn() {
        let mut buffer = ConversationBuffer::with_system_prompt(TokenBudget::default(), "sys");
        assert_eq!(buffer.pop_last(), None);

        buffer.append(Turn::user("hi"));
        assert_eq!(buffer.pop_last(), Some(Turn::user("hi")));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn enforce_budget_without_system_turn_keeps_last() {
        let mut buffer = ConversationBuffer::new(TokenBudget::with_max_tokens(20));
        buffer.append(Turn::user("a".repeat(40)));
        buffer.append(Turn::assistant("b".repeat(40)));
        buffer.append(Turn::user("c".repeat(80)));

        let evicted = buffer.enforce_budget();

        assert_eq!(evicted, 2);
        assert_eq!(buffer.turns(), &[Turn::user("c".repeat(80))]);
    }

    #[test]
    fn enforce_budget_noop_when_within() {
        let mut buffer = ConversationBuffer::with_system_prompt(TokenBudget::default(), "sys");
        buffer.append(Turn::user("hello"));

        assert_eq!(buffer.enforce_budget(), 0);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn dump_lists_turns_in_order() {
        let mut buffer = ConversationBuffer::with_system_prompt(TokenBudget::default(), "sys");
        buffer.append(Turn::user("hi"));
        buffer.append(Turn::assistant("hello"));

        assert_eq!(buffer.dump(), "[system]\nsys\n\n[user]\nhi\n\n[assistant]\nhello\n\n");
    }
}
