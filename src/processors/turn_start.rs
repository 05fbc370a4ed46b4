// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Barge-in strategy: turn speech onset into an interruption.
//!
//! Listens for [`FrameEnum::UserStartedSpeaking`] from the segmentation
//! stage and, when interruptions are enabled, pushes
//! [`FrameEnum::Interruption`] downstream so in-flight generation,
//! synthesis, and playback for the previous response are cancelled. The
//! flag is initialized from the [`FrameEnum::Start`] frame.
//!
//! Sits directly after the VAD stage and before everything that produces
//! response output, so the interruption overtakes any queued data frames
//! on the priority channels.

use async_trait::async_trait;
use tracing::debug;

use crate::frames::FrameEnum;
use crate::processors::{FrameDirection, Processor, ProcessorContext, ProcessorWeight};

/// Emits an interruption whenever the user starts speaking.
#[derive(Debug)]
pub struct TurnStartStrategy {
    allow_interruptions: bool,
}

impl TurnStartStrategy {
    /// Interruptions stay disabled until a Start frame enables them.
    pub fn new() -> Self {
        Self {
            allow_interruptions: false,
        }
    }

    pub fn interruptions_enabled(&self) -> bool {
        self.allow_interruptions
    }
}

impl Default for TurnStartStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for TurnStartStrategy {
    fn name(&self) -> &str {
        "TurnStartStrategy"
    }

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Light
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        match &frame {
            FrameEnum::Start(start) => {
                self.allow_interruptions = start.allow_interruptions;
                debug!(
                    enabled = self.allow_interruptions,
                    "barge-in interruptions configured"
                );
                ctx.send(frame, direction);
            }
            FrameEnum::UserStartedSpeaking => {
                if self.allow_interruptions {
                    debug!("user started speaking, interrupting in-flight response");
                    ctx.send_downstream(FrameEnum::Interruption);
                }
                ctx.send(frame, direction);
            }
            _ => ctx.send(frame, direction),
        }
    }
}
