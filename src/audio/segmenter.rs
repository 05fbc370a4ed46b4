// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Utterance segmentation state machine.
//!
//! Consumes (frame, confidence, threshold) triples and decides when an
//! utterance starts and ends. While not recording, frames accumulate in a
//! bounded pre-roll ring buffer (oldest evicted first); when confidence
//! first exceeds the threshold the entire pre-roll is prepended to the
//! utterance so speech onset is not clipped. During recording, a gap
//! counter accumulates sub-threshold frame durations and finalizes the
//! utterance once the configured pause limit is exceeded. Utterances
//! shorter than the minimum length are discarded as VAD blips.
//!
//! The machine is driven by the audio-side consumer task and never blocks:
//! finalizing only *returns* the utterance, handing ownership of the
//! sample buffer to the caller for enqueueing.

use std::collections::VecDeque;

use crate::config::SegmenterParams;
use crate::frames::{AudioFrame, Utterance};

/// Segmenter states.
///
/// `Finalizing` is transient: it is entered while an utterance is being
/// handed off and exits to `Idle` in the same call, unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// No frames seen since the last reset.
    Idle,
    /// Pre-roll accumulating, no confirmed speech yet.
    Armed,
    /// Speech confirmed; frames append to the utterance buffer.
    Recording,
    /// Utterance being handed off; buffers clearing.
    Finalizing,
}

/// Events emitted by [`TurnSegmenter::push`].
#[derive(Debug)]
pub enum SegmentEvent {
    /// No transition occurred.
    None,
    /// Confidence exceeded the threshold; recording started.
    SpeechStarted,
    /// The pause limit was exceeded and the utterance is long enough.
    /// Ownership of the samples transfers to the caller.
    UtteranceReady(Utterance),
    /// The pause limit was exceeded but the utterance was shorter than the
    /// minimum length: treated as noise, nothing to transcribe.
    UtteranceDiscarded,
}

/// State machine segmenting a scored frame stream into utterances.
#[derive(Debug)]
pub struct TurnSegmenter {
    params: SegmenterParams,
    sample_rate: u32,
    state: SegmenterState,
    /// Bounded ring of recent frames kept while not recording.
    pre_roll: VecDeque<AudioFrame>,
    /// Total samples currently held in `pre_roll`.
    pre_roll_samples: usize,
    /// Accumulating utterance samples while recording.
    samples: Vec<f32>,
    /// Accumulated sub-threshold duration during recording, in ms.
    gap_ms: f64,
    /// Samples appended during the current trailing gap. Subtracted from
    /// the utterance length for the minimum-length check, so the pause
    /// limit's worth of silence can't make a blip look like speech.
    gap_samples: usize,
    start_seq: u64,
    end_seq: u64,
}

impl TurnSegmenter {
    pub fn new(params: SegmenterParams, sample_rate: u32) -> Self {
        Self {
            params,
            sample_rate,
            state: SegmenterState::Idle,
            pre_roll: VecDeque::new(),
            pre_roll_samples: 0,
            samples: Vec::new(),
            gap_ms: 0.0,
            gap_samples: 0,
            start_seq: 0,
            end_seq: 0,
        }
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Whether an utterance is currently being recorded.
    pub fn is_recording(&self) -> bool {
        self.state == SegmenterState::Recording
    }

    /// Feed one frame with its confidence and the threshold in effect.
    pub fn push(&mut self, frame: AudioFrame, confidence: f64, threshold: f64) -> SegmentEvent {
        match self.state {
            SegmenterState::Idle | SegmenterState::Armed => {
                if confidence > threshold {
                    self.begin_recording(frame);
                    SegmentEvent::SpeechStarted
                } else {
                    self.push_pre_roll(frame);
                    self.state = SegmenterState::Armed;
                    SegmentEvent::None
                }
            }
            SegmenterState::Recording => {
                let frame_ms = frame.duration_ms();
                self.end_seq = frame.seq;
                self.samples.extend_from_slice(&frame.samples);

                if confidence >= threshold {
                    self.gap_ms = 0.0;
                    self.gap_samples = 0;
                } else {
                    self.gap_ms += frame_ms;
                    self.gap_samples += frame.samples.len();
                }

                if self.gap_ms > self.params.pause_limit_ms as f64 {
                    self.finalize()
                } else {
                    SegmentEvent::None
                }
            }
            // Finalizing exits to Idle before push() returns, so a frame
            // can never observe it.
            SegmenterState::Finalizing => SegmentEvent::None,
        }
    }

    /// Abort any in-progress recording and clear all session buffers.
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.pre_roll.clear();
        self.pre_roll_samples = 0;
        self.samples.clear();
        self.gap_ms = 0.0;
        self.gap_samples = 0;
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn begin_recording(&mut self, frame: AudioFrame) {
        self.state = SegmenterState::Recording;
        self.gap_ms = 0.0;
        self.gap_samples = 0;

        // Prepend the pre-roll so speech onset keeps its leading context.
        self.samples = Vec::with_capacity(self.pre_roll_samples + frame.samples.len());
        self.start_seq = self.pre_roll.front().map_or(frame.seq, |f| f.seq);
        for buffered in self.pre_roll.drain(..) {
            self.samples.extend_from_slice(&buffered.samples);
        }
        self.pre_roll_samples = 0;

        self.end_seq = frame.seq;
        self.samples.extend_from_slice(&frame.samples);
    }

    fn push_pre_roll(&mut self, frame: AudioFrame) {
        let capacity = self.pre_roll_capacity_samples();
        self.pre_roll_samples += frame.samples.len();
        self.pre_roll.push_back(frame);

        while self.pre_roll_samples > capacity {
            match self.pre_roll.pop_front() {
                Some(evicted) => self.pre_roll_samples -= evicted.samples.len(),
                None => break,
            }
        }
    }

    fn pre_roll_capacity_samples(&self) -> usize {
        (self.sample_rate as u64 * self.params.pre_roll_ms / 1000) as usize
    }

    fn min_utterance_samples(&self) -> usize {
        (self.sample_rate as u64 * self.params.min_utterance_ms / 1000) as usize
    }

    fn finalize(&mut self) -> SegmentEvent {
        self.state = SegmenterState::Finalizing;

        let samples = std::mem::take(&mut self.samples);
        let speech_samples = samples.len().saturating_sub(self.gap_samples);
        let event = if speech_samples < self.min_utterance_samples() {
            SegmentEvent::UtteranceDiscarded
        } else {
            SegmentEvent::UtteranceReady(Utterance {
                samples,
                sample_rate: self.sample_rate,
                start_seq: self.start_seq,
                end_seq: self.end_seq,
            })
        };

        // Session buffers clear regardless of what happens to the
        // utterance downstream.
        self.reset();
        event
    }
}
