// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration for every tunable in the pipeline.
//!
//! All parameter structs implement `Default` with values that work for
//! 16 kHz mono microphone input, and `Deserialize` so a surrounding
//! application can load them from a config file.

use serde::{Deserialize, Serialize};

/// Parameters for VAD confidence smoothing and adaptive thresholding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadParams {
    /// Static speech/silence threshold, also the value the dynamic
    /// threshold reverts to on reset.
    pub static_threshold: f64,
    /// Exponential smoothing factor for the confidence history.
    pub smoothing_factor: f64,
    /// Number of smoothed samples in the sliding median window.
    pub median_window: usize,
    /// Multiplier applied to the window median to derive the dynamic
    /// threshold. Below 1.0 so the trigger sits under recent typical
    /// voice confidence.
    pub threshold_multiplier: f64,
    /// Lower bound for the dynamic threshold.
    pub threshold_floor: f64,
    /// Upper bound for the dynamic threshold.
    pub threshold_ceiling: f64,
}

impl Default for VadParams {
    fn default() -> Self {
        Self {
            static_threshold: 0.5,
            smoothing_factor: 0.1,
            median_window: 5,
            threshold_multiplier: 0.7,
            threshold_floor: 0.15,
            threshold_ceiling: 0.9,
        }
    }
}

/// Parameters for the turn segmenter state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterParams {
    /// Duration of leading audio retained in the pre-roll ring buffer, so
    /// a sudden speech onset is not clipped.
    pub pre_roll_ms: u64,
    /// Accumulated sub-threshold duration that ends an utterance. The
    /// trade-off between responsiveness and cutting off slow speakers;
    /// sensible values are 1000-2300 ms.
    pub pause_limit_ms: u64,
    /// Utterances shorter than this are discarded as VAD blips.
    pub min_utterance_ms: u64,
}

impl Default for SegmenterParams {
    fn default() -> Self {
        Self {
            pre_roll_ms: 500,
            pause_limit_ms: 1300,
            min_utterance_ms: 250,
        }
    }
}

/// Parameters for wake-word gating of recognized turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WakeWordParams {
    /// Configured wake phrases. Empty disables the gate entirely.
    pub phrases: Vec<String>,
    /// Maximum Levenshtein distance between a spoken word and a phrase
    /// for the turn to be accepted.
    pub max_distance: usize,
}

impl WakeWordParams {
    /// Gate on the given phrases with the default edit distance of 2.
    pub fn with_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases.into_iter().map(Into::into).collect(),
            max_distance: 2,
        }
    }
}

/// Parameters for splitting generated responses into speakable chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterParams {
    /// Maximum chunk length in characters. Bounds per-chunk TTS latency
    /// and how much audio can be in flight when an interruption occurs.
    pub max_chunk_len: usize,
}

impl Default for SplitterParams {
    fn default() -> Self {
        Self { max_chunk_len: 200 }
    }
}

/// Parameters for the playback and barge-in controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackParams {
    /// Interval at which the controller polls for an interruption while a
    /// chunk is playing. Tens of milliseconds keeps barge-in reactive.
    pub poll_interval_ms: u64,
}

impl Default for PlaybackParams {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
        }
    }
}

/// Parameters for conversation history management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryParams {
    /// System prompt installed as the first turn and restored by reset.
    pub system_prompt: String,
    /// Soft token budget; exceeding it triggers a persistence flush and a
    /// history reset.
    pub token_budget: usize,
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful voice assistant.".to_string(),
            token_budget: 3072,
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Duration of each input audio frame in milliseconds.
    pub frame_ms: u64,
    /// Whether user speech interrupts in-flight playback.
    pub allow_interruptions: bool,
    pub vad: VadParams,
    pub segmenter: SegmenterParams,
    pub wake_word: WakeWordParams,
    pub splitter: SplitterParams,
    pub playback: PlaybackParams,
    pub history: HistoryParams,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_ms: 50,
            allow_interruptions: true,
            vad: VadParams::default(),
            segmenter: SegmenterParams::default(),
            wake_word: WakeWordParams::default(),
            splitter: SplitterParams::default(),
            playback: PlaybackParams::default(),
            history: HistoryParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = AgentConfig::default();
        assert!(cfg.vad.threshold_floor < cfg.vad.static_threshold);
        assert!(cfg.vad.static_threshold < cfg.vad.threshold_ceiling);
        assert!(cfg.vad.threshold_multiplier < 1.0);
        assert!(cfg.segmenter.min_utterance_ms < cfg.segmenter.pause_limit_ms);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = AgentConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sample_rate, cfg.sample_rate);
        assert_eq!(back.segmenter.pause_limit_ms, cfg.segmenter.pause_limit_ms);
    }

    #[test]
    fn wake_word_builder() {
        let params = WakeWordParams::with_phrases(["computer"]);
        assert_eq!(params.phrases, vec!["computer".to_string()]);
        assert_eq!(params.max_distance, 2);
    }
}
