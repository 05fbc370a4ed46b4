// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Context aggregation: the single owner of conversation history.
//!
//! All history mutation funnels through this stage:
//!
//! - Recognized voice turns and typed [`FrameEnum::InputText`] append a
//!   user turn and emit a [`FrameEnum::Context`] snapshot that triggers
//!   generation.
//! - [`FrameEnum::Delivery`] reports coming back upstream from playback
//!   append the assistant turn, and after a barge-in also a system turn
//!   recording exactly what was and wasn't delivered, so later generation
//!   requests are grounded in what the user actually heard.
//!
//! After every append the estimated token count is checked against the
//! soft budget; exceeding it flushes the conversation to the
//! [`HistoryStore`] and resets the history to its single system turn.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::HistoryParams;
use crate::context::{ConversationHistory, ConversationTurn, Role};
use crate::frames::{ContextSnapshot, FrameEnum};
use crate::processors::{FrameDirection, Processor, ProcessorContext};
use crate::services::{HistoryStore, TokenCounter};

/// Owns the conversation history and produces generation context.
pub struct ContextAggregator {
    history: ConversationHistory,
    counter: Box<dyn TokenCounter>,
    store: Box<dyn HistoryStore>,
    token_budget: usize,
}

impl ContextAggregator {
    pub fn new(
        params: HistoryParams,
        counter: Box<dyn TokenCounter>,
        store: Box<dyn HistoryStore>,
    ) -> Self {
        Self {
            history: ConversationHistory::new(params.system_prompt),
            counter,
            store,
            token_budget: params.token_budget,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    fn token_count(&self) -> usize {
        self.history
            .turns()
            .iter()
            .map(|t| self.counter.count(&t.content))
            .sum()
    }

    async fn append_and_enforce_budget(&mut self, turn: ConversationTurn) {
        self.history.append(turn);

        let tokens = self.token_count();
        if tokens > self.token_budget {
            info!(
                tokens,
                budget = self.token_budget,
                "token budget exceeded, flushing and resetting history"
            );
            if let Err(e) = self.store.save(self.history.turns()).await {
                warn!(error = %e, "history flush failed, resetting anyway");
            }
            self.history.reset();
        }
    }

    fn snapshot(&self) -> FrameEnum {
        FrameEnum::Context(ContextSnapshot {
            turns: self.history.turns().to_vec(),
        })
    }
}

impl std::fmt::Debug for ContextAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAggregator")
            .field("turns", &self.history.len())
            .field("token_budget", &self.token_budget)
            .finish()
    }
}

#[async_trait]
impl Processor for ContextAggregator {
    fn name(&self) -> &str {
        "ContextAggregator"
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        match frame {
            FrameEnum::Recognized(turn) => {
                self.append_and_enforce_budget(ConversationTurn::new(Role::User, turn.text.clone()))
                    .await;
                ctx.send_downstream(self.snapshot());
                // Forward the recognized turn so the application edge can
                // observe it as an event.
                ctx.send_downstream(FrameEnum::Recognized(turn));
            }
            FrameEnum::InputText(text) => {
                debug!(text = %text, "typed input accepted as user turn");
                self.append_and_enforce_budget(ConversationTurn::new(Role::User, text))
                    .await;
                ctx.send_downstream(self.snapshot());
            }
            FrameEnum::Delivery(report) => {
                if !report.delivered.is_empty() {
                    self.append_and_enforce_budget(ConversationTurn::new(
                        Role::Assistant,
                        report.delivered.clone(),
                    ))
                    .await;
                }
                if report.interrupted {
                    let note = format!(
                        "USER INTERRUPTED THE ASSISTANT. Text delivered: \"{}\". Text not delivered: \"{}\".",
                        report.delivered, report.undelivered
                    );
                    self.append_and_enforce_budget(ConversationTurn::new(Role::System, note))
                        .await;
                }
                // Keep flowing upstream for the application edge.
                ctx.send_upstream(FrameEnum::Delivery(report));
            }
            FrameEnum::End => {
                if let Err(e) = self.store.save(self.history.turns()).await {
                    warn!(error = %e, "final history flush failed");
                }
                ctx.send(FrameEnum::End, direction);
            }
            other => ctx.send(other, direction),
        }
    }

    async fn setup(&mut self) {
        match self.store.load().await {
            Ok(turns) if !turns.is_empty() => {
                debug!(turns = turns.len(), "restored persisted conversation");
                self.history.restore(turns);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not load persisted conversation"),
        }
    }

    async fn cleanup(&mut self) {
        if let Err(e) = self.store.save(self.history.turns()).await {
            warn!(error = %e, "history flush on shutdown failed");
        }
    }
}
