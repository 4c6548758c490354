//! Transcript budgeting integration tests

use chatterbox::{ConversationBuffer, Role, TokenBudget, Turn};

/// Text that estimates to exactly `tokens` at four characters per token
fn text_of_tokens(tokens: usize) -> String {
    "abcd".repeat(tokens)
}

/// A system prompt estimating to about fifty tokens with its framing
fn system_prompt() -> String {
    text_of_tokens(45)
}

#[test]
fn test_fifo_eviction_keeps_system_and_latest() {
    let budget = TokenBudget::with_max_tokens(120);
    let mut buffer = ConversationBuffer::with_system_prompt(budget, "You are a bot.");
    buffer.append(Turn::user(format!("a{}", text_of_tokens(100))));
    buffer.append(Turn::user(format!("b{}", text_of_tokens(100))));
    buffer.append(Turn::user(format!("c{}", text_of_tokens(100))));

    let evicted = buffer.enforce_budget();

    assert_eq!(evicted, 2);
    let turns = buffer.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::System);
    assert!(turns[1].content.starts_with('c'));
    assert!(buffer.within_budget());
}

#[test]
fn test_eviction_stops_once_within_budget() {
    // sys (8) + three 105-token turns + reply (2) = 325; one eviction fits 220
    let budget = TokenBudget::with_max_tokens(220);
    let mut buffer = ConversationBuffer::with_system_prompt(budget, "You are a bot.");
    for tag in ["a", "b", "c"] {
        buffer.append(Turn::user(format!("{tag}{}", text_of_tokens(100))));
    }

    assert_eq!(buffer.enforce_budget(), 1);
    let contents: Vec<char> = buffer.turns()[1..]
        .iter()
        .filter_map(|t| t.content.chars().next())
        .collect();
    assert_eq!(contents, vec!['b', 'c']);
}

#[test]
fn test_long_conversation_stays_within_budget() {
    let mut buffer = ConversationBuffer::with_system_prompt(TokenBudget::default(), system_prompt());

    for i in 0..50 {
        buffer.append(Turn::user(format!("{i:03}{}", text_of_tokens(199))));
        buffer.enforce_budget();
        assert!(buffer.within_budget(), "over budget after question {i}");

        buffer.append(Turn::assistant(format!("{i:03}{}", text_of_tokens(199))));
        buffer.enforce_budget();
        assert!(buffer.within_budget(), "over budget after answer {i}");

        assert_eq!(buffer.turns()[0].role, Role::System);
        assert_eq!(buffer.turns()[0].content, system_prompt());
    }

    // Survivors are the most recent turns, still alternating
    let last = buffer.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(last.content.starts_with("049"));
    assert!(buffer.len() < 101);
    for pair in buffer.turns()[1..].windows(2) {
        assert_ne!(pair[0].role, pair[1].role);
    }
}

#[test]
fn test_oversized_turn_kept_over_budget() {
    let mut buffer = ConversationBuffer::with_system_prompt(TokenBudget::default(), system_prompt());
    buffer.append(Turn::user(text_of_tokens(9000)));

    let evicted = buffer.enforce_budget();

    assert_eq!(evicted, 0);
    assert_eq!(buffer.len(), 2);
    assert!(!buffer.within_budget());
    assert!(buffer.estimate_tokens() > 9000);
}

#[test]
fn test_oversized_turn_evicts_everything_between() {
    let mut buffer = ConversationBuffer::with_system_prompt(TokenBudget::default(), system_prompt());
    buffer.append(Turn::user("hello"));
    buffer.append(Turn::assistant("hi there"));
    buffer.append(Turn::user(text_of_tokens(9000)));

    assert_eq!(buffer.enforce_budget(), 2);
    assert_eq!(buffer.turns()[0].role, Role::System);
    assert_eq!(buffer.turns()[1].content.len(), 36_000);
}

#[test]
fn test_estimate_never_decreases_on_append() {
    let mut buffer = ConversationBuffer::new(TokenBudget::default());
    let mut previous = buffer.estimate_tokens();
    let long = text_of_tokens(50);

    for content in ["", "a", "hello there", "日本語のテキスト", long.as_str()] {
        buffer.append(Turn::user(content));
        let current = buffer.estimate_tokens();
        assert!(current >= previous, "{current} < {previous}");
        previous = current;
    }
}

#[test]
fn test_snapshot_is_independent_copy() {
    let mut buffer = ConversationBuffer::with_system_prompt(TokenBudget::default(), "sys");
    buffer.append(Turn::user("question"));

    let mut snapshot = buffer.snapshot();
    assert_eq!(snapshot, buffer.turns());

    snapshot.push(Turn::assistant("not in the buffer"));
    snapshot[1].content.push_str(" changed");
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.turns()[1].content, "question");

    buffer.append(Turn::assistant("answer"));
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[2].content, "not in the buffer");
}

#[test]
fn test_system_turn_survives_tiny_budget() {
    let mut buffer =
        ConversationBuffer::with_system_prompt(TokenBudget::with_max_tokens(1), system_prompt());
    for i in 0..10 {
        buffer.append(Turn::user(format!("turn {i}")));
        buffer.enforce_budget();
        assert_eq!(buffer.system_prompt(), Some(system_prompt().as_str()));
        assert_eq!(buffer.len(), 2);
    }
}
