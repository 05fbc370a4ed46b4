// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Collaborator interfaces consumed by the pipeline.
//!
//! The acoustic VAD model, speech-to-text, text generation, text-to-speech,
//! token counting, persistence, and the audio devices are all external
//! collaborators: parley coordinates them but does not implement them
//! (the bundled [`openai`] client and [`store`] are the exceptions that
//! ship with the crate because they are pure protocol plumbing).
//!
//! Each backend is selected once at construction time and held as a boxed
//! trait object; there is no per-call dispatch by name.

pub mod openai;
pub mod shared;
pub mod store;

use async_trait::async_trait;
use futures_util::stream::Stream;
use std::pin::Pin;

use crate::context::ConversationTurn;
use crate::error::ParleyError;
use crate::frames::AudioFrame;

/// A stream of generated response fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ParleyError>> + Send>>;

/// Result of transcribing one utterance.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    /// Detected language tag (e.g. "en"), if the backend reports one.
    pub language: Option<String>,
    /// Backend confidence in the language detection, in [0, 1].
    pub language_confidence: f64,
}

/// Result of synthesizing one text chunk.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Voice-activity scoring model.
///
/// Stateful across calls (recurrent hidden state lives in the model);
/// [`reset`](VadScorer::reset) is invoked whenever segmentation restarts.
pub trait VadScorer: Send {
    /// Score one frame, returning a voice-presence confidence in [0, 1].
    fn score(&mut self, samples: &[f32]) -> Result<f64, ParleyError>;

    /// Clear recurrent state.
    fn reset(&mut self);
}

/// Speech-to-text backend.
#[async_trait]
pub trait AsrService: Send + Sync {
    async fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Transcript, ParleyError>;
}

/// Text-generation backend.
///
/// Implementations may stream fragments incrementally or yield the whole
/// response as a single-item stream.
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn complete(&self, turns: &[ConversationTurn]) -> Result<TextStream, ParleyError>;
}

/// Text-to-speech backend.
#[async_trait]
pub trait TtsService: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Synthesis, ParleyError>;
}

/// Token counting for the history budget. Estimates are fine; the budget
/// is a soft limit.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Whitespace-word token estimator used when no model tokenizer is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Conversation persistence.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save(&self, turns: &[ConversationTurn]) -> Result<(), ParleyError>;
    async fn load(&self) -> Result<Vec<ConversationTurn>, ParleyError>;
}

/// Microphone-side frame producer.
///
/// `start` opens the device; failure there is resource-fatal and surfaces
/// from agent startup. `next_frame` must deliver fixed-duration frames at a
/// constant sample rate with monotonic sequence numbers.
#[async_trait]
pub trait AudioSource: Send {
    async fn start(&mut self) -> Result<(), ParleyError>;
    async fn next_frame(&mut self) -> Result<AudioFrame, ParleyError>;
    async fn stop(&mut self) -> Result<(), ParleyError> {
        Ok(())
    }
}

/// Speaker-side audio device, exclusive to the playback controller.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn start(&mut self) -> Result<(), ParleyError> {
        Ok(())
    }

    /// Begin playing the buffer without blocking until completion; the
    /// playback controller paces itself on the expected duration.
    async fn play(&self, samples: &[f32], sample_rate: u32) -> Result<(), ParleyError>;

    /// Halt output immediately, discarding anything still buffered.
    async fn stop_playback(&self) -> Result<(), ParleyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_counter_counts_words() {
        let counter = WordCounter;
        assert_eq!(counter.count("one two three"), 3);
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("  spaced   out  "), 2);
    }
}
