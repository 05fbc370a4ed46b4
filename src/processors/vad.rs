// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! VAD scoring and utterance segmentation stage.
//!
//! Consumes [`FrameEnum::InputAudio`] from the frame source, scores each
//! frame through the [`VadScorer`] collaborator, feeds the adaptive
//! threshold tracker and the turn segmenter, and emits:
//!
//! - [`FrameEnum::Confidence`] per frame (observability),
//! - [`FrameEnum::UserStartedSpeaking`] on confirmed speech onset (the
//!   signal the barge-in strategy turns into an interruption),
//! - [`FrameEnum::UserStoppedSpeaking`] plus [`FrameEnum::Utterance`] on
//!   finalize.
//!
//! This stage is driven by the time-critical audio path: it never blocks
//! and only enqueues. On every finalize or blip discard the whole session
//! resets: segmenter buffers, the dynamic threshold, and the scorer's
//! recurrent state all revert to defaults.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::audio::{AdaptiveThreshold, SegmentEvent, TurnSegmenter};
use crate::config::{SegmenterParams, VadParams};
use crate::frames::{ConfidenceSample, FrameEnum};
use crate::processors::{FrameDirection, Processor, ProcessorContext};
use crate::services::VadScorer;

/// Speech detection and segmentation processor.
pub struct VadProcessor {
    scorer: Box<dyn VadScorer>,
    threshold: AdaptiveThreshold,
    segmenter: TurnSegmenter,
}

impl VadProcessor {
    pub fn new(
        scorer: Box<dyn VadScorer>,
        vad_params: VadParams,
        segmenter_params: SegmenterParams,
        sample_rate: u32,
    ) -> Self {
        Self {
            scorer,
            threshold: AdaptiveThreshold::new(vad_params),
            segmenter: TurnSegmenter::new(segmenter_params, sample_rate),
        }
    }

    fn reset_session(&mut self) {
        self.segmenter.reset();
        self.threshold.reset();
        self.scorer.reset();
    }
}

impl std::fmt::Debug for VadProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VadProcessor")
            .field("state", &self.segmenter.state())
            .field("threshold", &self.threshold.current())
            .finish()
    }
}

#[async_trait]
impl Processor for VadProcessor {
    fn name(&self) -> &str {
        "VadProcessor"
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        let audio = match frame {
            FrameEnum::InputAudio(audio) => audio,
            other => {
                ctx.send(other, direction);
                return;
            }
        };

        let seq = audio.seq;
        let confidence = match self.scorer.score(&audio.samples) {
            Ok(c) => c.clamp(0.0, 1.0),
            Err(e) => {
                warn!(seq, error = %e, "VAD scoring failed, frame skipped");
                return;
            }
        };

        let threshold = self.threshold.update(confidence);
        ctx.send_downstream(FrameEnum::Confidence(ConfidenceSample {
            seq,
            raw: confidence,
            smoothed: self.threshold.smoothed(),
            threshold,
        }));

        match self.segmenter.push(audio, confidence, threshold) {
            SegmentEvent::None => {}
            SegmentEvent::SpeechStarted => {
                debug!(seq, confidence, threshold, "speech onset");
                ctx.send_downstream(FrameEnum::UserStartedSpeaking);
            }
            SegmentEvent::UtteranceReady(utterance) => {
                debug!(
                    samples = utterance.samples.len(),
                    secs = utterance.duration_secs(),
                    "utterance finalized"
                );
                ctx.send_downstream(FrameEnum::UserStoppedSpeaking);
                ctx.send_downstream(FrameEnum::Utterance(utterance));
                self.reset_session();
            }
            SegmentEvent::UtteranceDiscarded => {
                debug!(seq, "utterance below minimum length, discarded as noise");
                ctx.send_downstream(FrameEnum::UserStoppedSpeaking);
                self.reset_session();
            }
        }
    }
}
