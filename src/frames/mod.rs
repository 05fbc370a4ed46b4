// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Frame definitions for the parley pipeline.
//!
//! All data flows as [`FrameEnum`] values through the processor chain.
//! Frames fall into three categories:
//!
//! - **System frames**: high-priority control traffic (interruptions,
//!   lifecycle, speaking events, raw input). Never discarded while a
//!   barge-in flush is active.
//! - **Data frames**: ordered content (utterances, text, chunks, audio).
//!   Discarded by a barge-in flush unless marked uninterruptible.
//! - **Control frames**: ordered in-band signals (generation start/end).
//!
//! The enum replaces runtime downcasting with exhaustive pattern matching:
//! adding a frame type is a compile error in every processor that forgot to
//! handle or forward it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ConversationTurn;

// ---------------------------------------------------------------------------
// Frame categories
// ---------------------------------------------------------------------------

/// Categorizes a frame into one of the primary processing categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// High-priority, not affected by interruptions.
    System,
    /// Ordered content, cancelled by interruptions.
    Data,
    /// Ordered control signals, cancelled by interruptions.
    Control,
}

// ---------------------------------------------------------------------------
// Data model structs
// ---------------------------------------------------------------------------

/// One fixed-duration buffer of microphone samples. Immutable once produced.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Monotonic sequence number assigned by the frame source.
    pub seq: u64,
    /// Mono float samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Source timestamp in seconds since capture start.
    pub timestamp: f64,
}

impl AudioFrame {
    pub fn new(seq: u64, samples: Vec<f32>, sample_rate: u32, timestamp: f64) -> Self {
        Self {
            seq,
            samples,
            sample_rate,
            timestamp,
        }
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// VAD confidence for one frame, produced 1:1 with input frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceSample {
    /// Sequence number of the scored frame.
    pub seq: u64,
    /// Raw model confidence in [0, 1].
    pub raw: f64,
    /// Exponentially smoothed confidence.
    pub smoothed: f64,
    /// Dynamic threshold in effect when this frame was scored.
    pub threshold: f64,
}

/// A finalized stretch of speech: pre-roll plus recorded frames, flattened
/// into one contiguous sample buffer. Ownership transfers to the
/// transcription stage on finalize; the segmenter keeps nothing.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Sequence number of the first frame (including pre-roll).
    pub start_seq: u64,
    /// Sequence number of the last appended frame.
    pub end_seq: u64,
}

impl Utterance {
    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// The transcription of one utterance, after wake-word gating.
#[derive(Debug, Clone)]
pub struct RecognizedTurn {
    pub text: String,
    /// Detected language tag, if the backend reports one.
    pub language: Option<String>,
    /// Backend confidence in the language detection, in [0, 1].
    pub language_confidence: f64,
    /// Duration of the source utterance in seconds.
    pub utterance_secs: f64,
}

/// Snapshot of the conversation history handed to the generation stage.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub turns: Vec<ConversationTurn>,
}

/// One speakable fragment of a generated response.
///
/// `index` is stable within the parent response so "what was actually
/// delivered" can be reconstructed after an interruption. The terminal
/// sentinel (`end_of_response = true`, empty text) tells the playback
/// controller the response is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseChunk {
    pub index: u32,
    pub text: String,
    pub end_of_response: bool,
}

impl ResponseChunk {
    pub fn new(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            end_of_response: false,
        }
    }

    /// The terminal sentinel closing a response.
    pub fn end_of_response(index: u32) -> Self {
        Self {
            index,
            text: String::new(),
            end_of_response: true,
        }
    }
}

/// Synthesized audio for one response chunk. Ephemeral: consumed by
/// playback and then released.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub chunk: ResponseChunk,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    /// Expected playback duration in seconds.
    pub fn expected_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Report from the playback controller describing how a response ended.
///
/// Flows upstream to the context aggregator, which records the assistant
/// turn (and, after a barge-in, the system turn stating what was and was
/// not delivered). Uninterruptible: it must survive the flush that follows
/// the very interruption it describes.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// Everything that was spoken, including a clipped final chunk.
    pub delivered: String,
    /// The unspoken remainder of the chunk that was cut off, if any.
    pub undelivered: String,
    pub interrupted: bool,
}

/// Error notification; non-fatal errors abandon the current turn only.
#[derive(Debug, Clone)]
pub struct ErrorFrame {
    pub error: String,
    pub fatal: bool,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>, fatal: bool) -> Self {
        Self {
            error: error.into(),
            fatal,
        }
    }

    pub fn non_fatal(error: impl Into<String>) -> Self {
        Self::new(error, false)
    }
}

/// Initial frame configuring all processors.
#[derive(Debug, Clone)]
pub struct StartFrame {
    pub sample_rate: u32,
    pub allow_interruptions: bool,
}

// ---------------------------------------------------------------------------
// The frame enum
// ---------------------------------------------------------------------------

/// Concrete enum of all frame types in the pipeline.
#[derive(Debug, Clone)]
pub enum FrameEnum {
    // ----- system frames -----
    /// Pipeline start, carries runtime parameters.
    Start(StartFrame),
    /// Graceful end of input; workers drain and exit.
    End,
    /// Error notification.
    Error(ErrorFrame),
    /// Barge-in signal: cancel in-flight response output.
    Interruption,
    /// The segmenter confirmed speech onset.
    UserStartedSpeaking,
    /// The segmenter confirmed end of speech.
    UserStoppedSpeaking,
    /// Playback began speaking a response.
    BotStartedSpeaking,
    /// Playback finished or aborted a response.
    BotStoppedSpeaking,
    /// Raw audio from the frame source.
    InputAudio(AudioFrame),
    /// Typed user input, bypassing VAD/ASR and the wake-word gate.
    InputText(String),

    // ----- data frames -----
    /// Per-frame VAD confidence, for observability.
    Confidence(ConfidenceSample),
    /// A finalized utterance awaiting transcription.
    Utterance(Utterance),
    /// A recognized (and gate-accepted) user turn.
    Recognized(RecognizedTurn),
    /// History snapshot for the generation stage.
    Context(ContextSnapshot),
    /// A streamed fragment of generated response text.
    GenText(String),
    /// A speakable chunk of the response.
    Chunk(ResponseChunk),
    /// Synthesized audio for one chunk.
    TtsAudio(SynthesizedAudio),
    /// Playback outcome for a response (uninterruptible).
    Delivery(DeliveryReport),

    // ----- control frames -----
    /// The generation stage started streaming a response.
    GenerationStarted,
    /// The generation stage finished streaming a response.
    GenerationEnded,
}

impl FrameEnum {
    /// The processing category of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            FrameEnum::Start(_)
            | FrameEnum::End
            | FrameEnum::Error(_)
            | FrameEnum::Interruption
            | FrameEnum::UserStartedSpeaking
            | FrameEnum::UserStoppedSpeaking
            | FrameEnum::BotStartedSpeaking
            | FrameEnum::BotStoppedSpeaking
            | FrameEnum::InputAudio(_)
            | FrameEnum::InputText(_) => FrameKind::System,

            FrameEnum::Confidence(_)
            | FrameEnum::Utterance(_)
            | FrameEnum::Recognized(_)
            | FrameEnum::Context(_)
            | FrameEnum::GenText(_)
            | FrameEnum::Chunk(_)
            | FrameEnum::TtsAudio(_)
            | FrameEnum::Delivery(_) => FrameKind::Data,

            FrameEnum::GenerationStarted | FrameEnum::GenerationEnded => FrameKind::Control,
        }
    }

    /// Whether this frame must survive an interruption flush.
    pub fn is_uninterruptible(&self) -> bool {
        matches!(
            self,
            FrameEnum::Start(_) | FrameEnum::End | FrameEnum::Error(_) | FrameEnum::Delivery(_)
        )
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            FrameEnum::Start(_) => "Start",
            FrameEnum::End => "End",
            FrameEnum::Error(_) => "Error",
            FrameEnum::Interruption => "Interruption",
            FrameEnum::UserStartedSpeaking => "UserStartedSpeaking",
            FrameEnum::UserStoppedSpeaking => "UserStoppedSpeaking",
            FrameEnum::BotStartedSpeaking => "BotStartedSpeaking",
            FrameEnum::BotStoppedSpeaking => "BotStoppedSpeaking",
            FrameEnum::InputAudio(_) => "InputAudio",
            FrameEnum::InputText(_) => "InputText",
            FrameEnum::Confidence(_) => "Confidence",
            FrameEnum::Utterance(_) => "Utterance",
            FrameEnum::Recognized(_) => "Recognized",
            FrameEnum::Context(_) => "Context",
            FrameEnum::GenText(_) => "GenText",
            FrameEnum::Chunk(_) => "Chunk",
            FrameEnum::TtsAudio(_) => "TtsAudio",
            FrameEnum::Delivery(_) => "Delivery",
            FrameEnum::GenerationStarted => "GenerationStarted",
            FrameEnum::GenerationEnded => "GenerationEnded",
        }
    }
}

impl fmt::Display for FrameEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameEnum::InputAudio(frame) => write!(
                f,
                "InputAudio(seq: {}, samples: {}, rate: {})",
                frame.seq,
                frame.samples.len(),
                frame.sample_rate
            ),
            FrameEnum::Utterance(u) => write!(
                f,
                "Utterance(samples: {}, {:.2}s, seq: {}..{})",
                u.samples.len(),
                u.duration_secs(),
                u.start_seq,
                u.end_seq
            ),
            FrameEnum::Recognized(t) => {
                write!(f, "Recognized(text: [{}], lang: {:?})", t.text, t.language)
            }
            FrameEnum::GenText(text) => write!(f, "GenText([{}])", text),
            FrameEnum::Chunk(c) => write!(
                f,
                "Chunk(#{}, eor: {}, text: [{}])",
                c.index, c.end_of_response, c.text
            ),
            FrameEnum::TtsAudio(a) => write!(
                f,
                "TtsAudio(#{}, samples: {}, {:.2}s)",
                a.chunk.index,
                a.samples.len(),
                a.expected_secs()
            ),
            FrameEnum::Delivery(d) => write!(
                f,
                "Delivery(interrupted: {}, delivered: [{}])",
                d.interrupted, d.delivered
            ),
            FrameEnum::Error(e) => write!(f, "Error({}, fatal: {})", e.error, e.fatal),
            other => write!(f, "{}", other.name()),
        }
    }
}
