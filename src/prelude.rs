// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Common re-exports for convenient use of parley.
//!
//! ```
//! use parley::prelude::*;
//! ```

pub use crate::agent::{AgentEvent, AgentServices, VoiceAgent};
pub use crate::audio::{AdaptiveThreshold, SegmentEvent, SegmenterState, TurnSegmenter};
pub use crate::config::{
    AgentConfig, HistoryParams, PlaybackParams, SegmenterParams, SplitterParams, VadParams,
    WakeWordParams,
};
pub use crate::context::{ConversationHistory, ConversationTurn, Role};
pub use crate::error::ParleyError;
pub use crate::frames::{
    AudioFrame, ConfidenceSample, DeliveryReport, FrameEnum, FrameKind, RecognizedTurn,
    ResponseChunk, StartFrame, SynthesizedAudio, Utterance,
};
pub use crate::pipeline::Pipeline;
pub use crate::processors::{FrameDirection, Processor, ProcessorContext, ProcessorWeight};
pub use crate::services::{
    AsrService, AudioSink, AudioSource, HistoryStore, LlmService, Synthesis, TextStream,
    TokenCounter, Transcript, TtsService, VadScorer, WordCounter,
};
pub use crate::turns::WakeWordGate;
