// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Conversation history: the ordered record of turns fed to generation.
//!
//! The history is append-only within a session; [`ConversationHistory::reset`]
//! atomically replaces it with a fresh single system turn. Token accounting
//! is delegated to the [`crate::services::TokenCounter`] collaborator by the
//! owning processor; this module only stores turns and estimates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::now_ms;

/// The speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch at append time.
    pub timestamp_ms: u64,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp_ms: now_ms(),
        }
    }
}

/// Ordered, append-only (until reset) record of conversation turns.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    system_prompt: String,
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    /// Create a history seeded with a single system turn.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        let turns = vec![ConversationTurn::new(Role::System, system_prompt.clone())];
        Self {
            system_prompt,
            turns,
        }
    }

    /// Append a turn.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Replace all turns with a fresh single system turn.
    pub fn reset(&mut self) {
        self.turns = vec![ConversationTurn::new(
            Role::System,
            self.system_prompt.clone(),
        )];
    }

    /// Replace the stored turns with a previously persisted list.
    ///
    /// An empty list is treated as a reset so the system-turn invariant
    /// holds.
    pub fn restore(&mut self, turns: Vec<ConversationTurn>) {
        if turns.is_empty() {
            self.reset();
        } else {
            self.turns = turns;
        }
    }

    /// The current turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of turns, including the system turn.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Rough token estimate used when no external counter is configured:
    /// whitespace-separated words plus a small per-turn overhead.
    pub fn estimated_token_count(&self) -> usize {
        self.turns
            .iter()
            .map(|t| t.content.split_whitespace().count() + 4)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_history_has_one_system_turn() {
        let history = ConversationHistory::new("be brief");
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].role, Role::System);
        assert_eq!(history.turns()[0].content, "be brief");
    }

    #[test]
    fn reset_restores_baseline() {
        let mut history = ConversationHistory::new("be brief");
        let baseline = history.estimated_token_count();

        history.append(ConversationTurn::new(Role::User, "hello there"));
        history.append(ConversationTurn::new(Role::Assistant, "hi, how can I help?"));
        assert_eq!(history.len(), 3);
        assert!(history.estimated_token_count() > baseline);

        history.reset();
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].role, Role::System);
        assert_eq!(history.estimated_token_count(), baseline);
    }

    #[test]
    fn restore_empty_keeps_system_turn() {
        let mut history = ConversationHistory::new("prompt");
        history.restore(Vec::new());
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].role, Role::System);
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = ConversationTurn::new(Role::Assistant, "done.");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"assistant\""));
        let back: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "done.");
        assert_eq!(back.role, Role::Assistant);
    }
}
