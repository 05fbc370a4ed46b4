// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Speech synthesis stage.
//!
//! Converts each [`FrameEnum::Chunk`] into [`FrameEnum::TtsAudio`] through
//! the [`TtsService`] collaborator, preserving chunk order (the stage
//! processes one chunk at a time, and chunks arrive in index order on the
//! bounded data channel). The terminal sentinel chunk passes through
//! untouched so playback knows when the response is complete.
//!
//! An empty synthesis buffer is data-invalid: discarded with a warning,
//! no retry. Backend failures abandon the chunk with a non-fatal error
//! upstream; later chunks of the same response still play, which beats
//! going silent for the rest of the turn.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::frames::{ErrorFrame, FrameEnum, SynthesizedAudio};
use crate::processors::{FrameDirection, Processor, ProcessorContext, ProcessorWeight};
use crate::services::TtsService;

/// Chunk-to-audio stage.
pub struct SynthesisProcessor {
    tts: Box<dyn TtsService>,
}

impl SynthesisProcessor {
    pub fn new(tts: Box<dyn TtsService>) -> Self {
        Self { tts }
    }
}

impl std::fmt::Debug for SynthesisProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisProcessor").finish()
    }
}

#[async_trait]
impl Processor for SynthesisProcessor {
    fn name(&self) -> &str {
        "SynthesisProcessor"
    }

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Heavy
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        let chunk = match frame {
            FrameEnum::Chunk(chunk) => chunk,
            other => {
                ctx.send(other, direction);
                return;
            }
        };

        if chunk.end_of_response {
            ctx.send_downstream(FrameEnum::Chunk(chunk));
            return;
        }

        let synthesis = tokio::select! {
            biased;
            _ = ctx.interruption_token().cancelled() => {
                debug!(index = chunk.index, "synthesis abandoned by barge-in");
                return;
            }
            result = self.tts.synthesize(&chunk.text) => result,
        };

        match synthesis {
            Ok(audio) if audio.samples.is_empty() => {
                warn!(index = chunk.index, "synthesis returned an empty buffer, chunk discarded");
            }
            Ok(audio) => {
                ctx.send_downstream(FrameEnum::TtsAudio(SynthesizedAudio {
                    chunk,
                    samples: audio.samples,
                    sample_rate: audio.sample_rate,
                }));
            }
            Err(e) => {
                warn!(index = chunk.index, error = %e, "synthesis failed, chunk skipped");
                ctx.send_upstream(FrameEnum::Error(ErrorFrame::non_fatal(format!(
                    "synthesis failed: {e}"
                ))));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParleyError;
    use crate::frames::ResponseChunk;
    use crate::processors::test_support::{drain, test_ctx};
    use crate::services::Synthesis;

    struct FixedTts {
        samples_per_call: usize,
        fail: bool,
    }

    #[async_trait]
    impl TtsService for FixedTts {
        async fn synthesize(&self, _text: &str) -> Result<Synthesis, ParleyError> {
            if self.fail {
                return Err(ParleyError::Synthesis("backend unreachable".into()));
            }
            Ok(Synthesis {
                samples: vec![0.0; self.samples_per_call],
                sample_rate: 16000,
            })
        }
    }

    #[tokio::test]
    async fn chunk_becomes_audio() {
        let mut proc = SynthesisProcessor::new(Box::new(FixedTts {
            samples_per_call: 8000,
            fail: false,
        }));
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(
            FrameEnum::Chunk(ResponseChunk::new(3, "Hello.")),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;

        let frames = drain(&mut drx);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            FrameEnum::TtsAudio(audio) => {
                assert_eq!(audio.chunk.index, 3);
                assert_eq!(audio.chunk.text, "Hello.");
                assert_eq!(audio.samples.len(), 8000);
                assert!((audio.expected_secs() - 0.5).abs() < 1e-9);
            }
            other => panic!("expected TtsAudio, got {other}"),
        }
    }

    #[tokio::test]
    async fn sentinel_passes_through() {
        let mut proc = SynthesisProcessor::new(Box::new(FixedTts {
            samples_per_call: 8000,
            fail: false,
        }));
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(
            FrameEnum::Chunk(ResponseChunk::end_of_response(5)),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;

        let frames = drain(&mut drx);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            FrameEnum::Chunk(chunk) => assert!(chunk.end_of_response),
            other => panic!("expected sentinel Chunk, got {other}"),
        }
    }

    #[tokio::test]
    async fn empty_buffer_discarded() {
        let mut proc = SynthesisProcessor::new(Box::new(FixedTts {
            samples_per_call: 0,
            fail: false,
        }));
        let (ctx, mut drx, mut urx) = test_ctx();

        proc.process(
            FrameEnum::Chunk(ResponseChunk::new(0, "quiet")),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;

        assert!(drain(&mut drx).is_empty());
        assert!(drain(&mut urx).is_empty());
    }

    #[tokio::test]
    async fn failure_skips_chunk_with_error() {
        let mut proc = SynthesisProcessor::new(Box::new(FixedTts {
            samples_per_call: 0,
            fail: true,
        }));
        let (ctx, mut drx, mut urx) = test_ctx();

        proc.process(
            FrameEnum::Chunk(ResponseChunk::new(0, "oops")),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;

        assert!(drain(&mut drx).is_empty());
        let upstream = drain(&mut urx);
        assert_eq!(upstream.len(), 1);
        assert!(matches!(&upstream[0], FrameEnum::Error(e) if !e.fatal));
    }
}
