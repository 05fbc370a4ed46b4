// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Transcription stage with wake-word gating.
//!
//! Consumes finalized [`FrameEnum::Utterance`]s, sends them to the
//! [`AsrService`] collaborator, and emits [`FrameEnum::Recognized`] turns.
//! A turn the wake-word gate rejects is dropped silently: no generation
//! request is issued and nothing is logged above debug level, matching how
//! an assistant should behave when it overhears speech not addressed to it.
//!
//! Backend failures are transient-recoverable: the turn is abandoned with
//! a warning and an upstream [`FrameEnum::Error`], and the stage waits for
//! the next utterance.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::frames::{ErrorFrame, FrameEnum, RecognizedTurn};
use crate::processors::{FrameDirection, Processor, ProcessorContext, ProcessorWeight};
use crate::services::AsrService;
use crate::turns::WakeWordGate;

/// Utterance-to-text stage.
pub struct TranscriptionProcessor {
    asr: Box<dyn AsrService>,
    gate: WakeWordGate,
}

impl TranscriptionProcessor {
    pub fn new(asr: Box<dyn AsrService>, gate: WakeWordGate) -> Self {
        Self { asr, gate }
    }
}

impl std::fmt::Debug for TranscriptionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionProcessor")
            .field("gate_enabled", &self.gate.is_enabled())
            .finish()
    }
}

#[async_trait]
impl Processor for TranscriptionProcessor {
    fn name(&self) -> &str {
        "TranscriptionProcessor"
    }

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Heavy
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        let utterance = match frame {
            FrameEnum::Utterance(utterance) => utterance,
            other => {
                ctx.send(other, direction);
                return;
            }
        };

        let duration = utterance.duration_secs();
        let result = tokio::select! {
            biased;
            _ = ctx.interruption_token().cancelled() => {
                debug!("transcription abandoned by interruption");
                return;
            }
            result = self.asr.transcribe(&utterance.samples, utterance.sample_rate) => result,
        };

        let transcript = match result {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "transcription failed, turn abandoned");
                ctx.send_upstream(FrameEnum::Error(ErrorFrame::non_fatal(format!(
                    "transcription failed: {e}"
                ))));
                return;
            }
        };

        let text = transcript.text.trim();
        if text.is_empty() {
            debug!("empty transcription, nothing recognized");
            return;
        }

        if !self.gate.accepts(text) {
            debug!(text, "wake word not detected, turn dropped");
            return;
        }

        info!(text, language = ?transcript.language, "turn recognized");
        ctx.send_downstream(FrameEnum::Recognized(RecognizedTurn {
            text: text.to_string(),
            language: transcript.language,
            language_confidence: transcript.language_confidence,
            utterance_secs: duration,
        }));
    }
}
