// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! The processor trait layer.
//!
//! A [`Processor`] consumes one frame at a time and emits output through
//! the [`ProcessorContext`] senders, which the owning pipeline task drains
//! into the inter-stage priority channels. Processors never talk to each
//! other directly and never share state; everything moves as frames.
//!
//! [`ProcessorWeight::Heavy`] marks stages that block on backend calls
//! (ASR, generation, synthesis, playback). The pipeline races their
//! `process()` against the priority channel so a barge-in
//! [`FrameEnum::Interruption`] can cancel them mid-call via the context's
//! interruption token.

pub mod context;
pub mod generation;
pub mod playback;
pub mod sentence;
pub mod synthesis;
pub mod transcription;
pub mod turn_start;
pub mod vad;

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::frames::FrameEnum;

/// Direction a frame travels through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDirection {
    /// Input toward output: audio in, speech out.
    Downstream,
    /// Output toward input: delivery reports, errors.
    Upstream,
}

/// Computational weight of a processor, used for channel sizing and for
/// deciding whether the two-level interruption monitor is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessorWeight {
    /// Pass-through and simple transforms; sub-millisecond.
    Light,
    /// State machines and aggregation; a few milliseconds.
    #[default]
    Standard,
    /// Backend-bound stages that can block for hundreds of milliseconds
    /// and must be interruptible mid-call.
    Heavy,
}

impl fmt::Display for ProcessorWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "Light"),
            Self::Standard => write!(f, "Standard"),
            Self::Heavy => write!(f, "Heavy"),
        }
    }
}

/// Context handed to a processor for every `process()` call.
pub struct ProcessorContext {
    downstream_tx: mpsc::UnboundedSender<FrameEnum>,
    upstream_tx: mpsc::UnboundedSender<FrameEnum>,
    cancel_token: CancellationToken,
    /// Cancelled when an Interruption arrives while this processor's
    /// `process()` is running (Heavy processors only).
    interruption_token: CancellationToken,
}

impl ProcessorContext {
    pub fn new(
        downstream_tx: mpsc::UnboundedSender<FrameEnum>,
        upstream_tx: mpsc::UnboundedSender<FrameEnum>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            downstream_tx,
            upstream_tx,
            cancel_token,
            interruption_token: CancellationToken::new(),
        }
    }

    /// Send a frame downstream. Never blocks; logs if the pipeline side
    /// has already shut down.
    pub fn send_downstream(&self, frame: FrameEnum) {
        if self.downstream_tx.send(frame).is_err() {
            tracing::warn!("ProcessorContext: downstream receiver dropped, frame lost");
        }
    }

    /// Send a frame upstream. Never blocks.
    pub fn send_upstream(&self, frame: FrameEnum) {
        if self.upstream_tx.send(frame).is_err() {
            tracing::warn!("ProcessorContext: upstream receiver dropped, frame lost");
        }
    }

    /// Send in the given direction.
    pub fn send(&self, frame: FrameEnum, direction: FrameDirection) {
        match direction {
            FrameDirection::Downstream => self.send_downstream(frame),
            FrameDirection::Upstream => self.send_upstream(frame),
        }
    }

    /// Global shutdown token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Barge-in token for the current `process()` call. Heavy processors
    /// select on this inside long-running loops.
    pub fn interruption_token(&self) -> &CancellationToken {
        &self.interruption_token
    }

    pub fn is_interrupted(&self) -> bool {
        self.interruption_token.is_cancelled()
    }

    /// Installed by the pipeline task before each Heavy `process()` call.
    pub(crate) fn set_interruption_token(&mut self, token: CancellationToken) {
        self.interruption_token = token;
    }
}

impl fmt::Debug for ProcessorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorContext")
            .field("cancelled", &self.cancel_token.is_cancelled())
            .field("interrupted", &self.interruption_token.is_cancelled())
            .finish()
    }
}

/// One stage of the pipeline.
#[async_trait]
pub trait Processor: Send + fmt::Debug {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Standard
    }

    /// Handle one frame, emitting output through `ctx`. Frames the
    /// processor does not consume must be forwarded in their original
    /// direction, or downstream stages go blind.
    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext);

    /// Called once when the pipeline starts.
    async fn setup(&mut self) {}

    /// Called once when the pipeline shuts down.
    async fn cleanup(&mut self) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn context_routes_by_direction() {
        let (ctx, mut drx, mut urx) = test_support::test_ctx();

        ctx.send(FrameEnum::End, FrameDirection::Downstream);
        ctx.send(FrameEnum::Interruption, FrameDirection::Upstream);

        assert!(matches!(drx.recv().await, Some(FrameEnum::End)));
        assert!(matches!(urx.recv().await, Some(FrameEnum::Interruption)));
    }

    #[test]
    fn interruption_token_replaceable() {
        let (mut ctx, _drx, _urx) = test_support::test_ctx();

        ctx.interruption_token().clone().cancel();
        assert!(ctx.is_interrupted());

        ctx.set_interruption_token(CancellationToken::new());
        assert!(!ctx.is_interrupted());
    }
}
