// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Playback and barge-in control.
//!
//! Plays [`FrameEnum::TtsAudio`] chunks in order through the exclusive
//! [`AudioSink`], pacing itself on the expected duration computed from
//! sample count and rate while polling the interruption token at a short
//! interval. This is the one sanctioned poll loop in the pipeline: the
//! controller has to react to a barge-in within tens of milliseconds
//! while a chunk plays.
//!
//! If the user barges in mid-chunk, the controller:
//!
//! 1. computes `percentage_played = elapsed / expected` (clamped to
//!    [0, 100]) and clips the chunk's text proportionally by word count,
//! 2. appends the `<INTERRUPTED>` marker and stops audio output
//!    immediately,
//! 3. reports delivered vs undelivered text upstream so the context
//!    aggregator can record both the assistant turn and the system turn
//!    describing the cut-off.
//!
//! Remaining queued chunks of the response never arrive: the pipeline's
//! flush gate discards them while the interruption propagates. Whether a
//! response completes or is cut short, playback state is cleared before
//! the stage returns to idle.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::PlaybackParams;
use crate::frames::{DeliveryReport, FrameEnum, SynthesizedAudio};
use crate::processors::{FrameDirection, Processor, ProcessorContext, ProcessorWeight};
use crate::services::AudioSink;

/// Marker appended to the clipped text of an interrupted chunk.
pub const INTERRUPTED_MARKER: &str = "<INTERRUPTED>";

/// Clip `text` to the fraction of words matching `percentage_played`.
///
/// At 0% the clip is empty; at 100% the whole text survives. Rounds to
/// the nearest word.
pub fn clip_interrupted_text(text: &str, percentage_played: f64) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let fraction = (percentage_played / 100.0).clamp(0.0, 1.0);
    let keep = ((words.len() as f64 * fraction).round() as usize).min(words.len());
    words[..keep].join(" ")
}

/// Per-response playback state. One live value per in-flight response.
#[derive(Debug, Default)]
struct PlaybackState {
    /// Text of every fully played chunk, in order, plus the clipped text
    /// of an interrupted final chunk.
    delivered: Vec<String>,
    /// Unspoken remainder of the chunk that was cut off.
    undelivered: String,
    interrupted: bool,
}

/// Ordered, interruptible playback of synthesized chunks.
pub struct PlaybackProcessor {
    sink: Box<dyn AudioSink>,
    params: PlaybackParams,
    state: Option<PlaybackState>,
}

impl PlaybackProcessor {
    pub fn new(sink: Box<dyn AudioSink>, params: PlaybackParams) -> Self {
        Self {
            sink,
            params,
            state: None,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state.is_some()
    }

    /// Play one chunk to completion or interruption. Returns `true` if the
    /// chunk finished naturally.
    async fn play_chunk(&mut self, audio: &SynthesizedAudio, ctx: &ProcessorContext) -> bool {
        let expected = Duration::from_secs_f64(audio.expected_secs());
        if let Err(e) = self.sink.play(&audio.samples, audio.sample_rate).await {
            warn!(index = audio.chunk.index, error = %e, "audio output failed, chunk dropped");
            return true;
        }

        let poll = Duration::from_millis(self.params.poll_interval_ms.max(1));
        let started = Instant::now();

        loop {
            let elapsed = started.elapsed();
            if elapsed >= expected {
                return true;
            }

            if ctx.is_interrupted() {
                let percentage_played =
                    (elapsed.as_secs_f64() / expected.as_secs_f64() * 100.0).clamp(0.0, 100.0);
                self.interrupt_chunk(&audio.chunk.text, percentage_played)
                    .await;
                return false;
            }

            tokio::time::sleep(poll.min(expected - elapsed)).await;
        }
    }

    async fn interrupt_chunk(&mut self, text: &str, percentage_played: f64) {
        debug!(percentage_played, "playback interrupted mid-chunk");
        if let Err(e) = self.sink.stop_playback().await {
            warn!(error = %e, "failed to stop audio output");
        }

        let clipped = clip_interrupted_text(text, percentage_played);
        let spoken_words = clipped.split_whitespace().count();
        let remainder = text
            .split_whitespace()
            .skip(spoken_words)
            .collect::<Vec<_>>()
            .join(" ");

        let state = self.state.get_or_insert_with(PlaybackState::default);
        state.interrupted = true;
        state.undelivered = remainder;
        if clipped.is_empty() {
            state.delivered.push(INTERRUPTED_MARKER.to_string());
        } else {
            state
                .delivered
                .push(format!("{clipped} {INTERRUPTED_MARKER}"));
        }
    }

    /// Clear playback state and report the outcome upstream.
    fn finish_response(&mut self, ctx: &ProcessorContext) {
        let Some(state) = self.state.take() else {
            return;
        };
        ctx.send_downstream(FrameEnum::BotStoppedSpeaking);
        ctx.send_upstream(FrameEnum::Delivery(DeliveryReport {
            delivered: state.delivered.join(" "),
            undelivered: state.undelivered,
            interrupted: state.interrupted,
        }));
    }
}

impl std::fmt::Debug for PlaybackProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackProcessor")
            .field("speaking", &self.is_speaking())
            .finish()
    }
}

#[async_trait]
impl Processor for PlaybackProcessor {
    fn name(&self) -> &str {
        "PlaybackProcessor"
    }

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Heavy
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        match frame {
            FrameEnum::TtsAudio(audio) => {
                if self.state.is_none() {
                    self.state = Some(PlaybackState::default());
                    ctx.send_downstream(FrameEnum::BotStartedSpeaking);
                }

                if self.play_chunk(&audio, ctx).await {
                    if let Some(state) = self.state.as_mut() {
                        state.delivered.push(audio.chunk.text.clone());
                    }
                } else {
                    // Interrupted: close out the response now. Its
                    // remaining chunks are being flushed by the pipeline.
                    self.finish_response(ctx);
                }
            }
            FrameEnum::Chunk(chunk) if chunk.end_of_response => {
                self.finish_response(ctx);
            }
            FrameEnum::Interruption => {
                // Barge-in between chunks: the queued remainder of the
                // response is being flushed, so the response counts as
                // interrupted even though no chunk was clipped. After an
                // interrupted play_chunk this is a redispatch; state is
                // None then and nothing is reported twice.
                if let Some(state) = self.state.as_mut() {
                    state.interrupted = true;
                }
                self.finish_response(ctx);
                ctx.send(FrameEnum::Interruption, direction);
            }
            other => ctx.send(other, direction),
        }
    }

    async fn cleanup(&mut self) {
        if let Err(e) = self.sink.stop_playback().await {
            warn!(error = %e, "failed to stop audio output on shutdown");
        }
    }
}
