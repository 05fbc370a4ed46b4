// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Error types for collaborator seams.
//!
//! Failures inside the pipeline travel as [`crate::frames::ErrorFrame`]
//! values so worker tasks can log and continue; the `Result`-based errors
//! here surface at the service traits and at agent startup.
//!
//! Taxonomy:
//!
//! - *Transient-recoverable* (backend unreachable, empty result): the
//!   current turn is abandoned and the pipeline returns to idle.
//! - *Data-invalid* (audio too short, empty synthesis buffer, malformed
//!   backend response): discarded with a warning, no retry.
//! - *Resource-fatal* (audio device unavailable at startup): returned from
//!   [`crate::agent::VoiceAgent::start`], not retried.

use thiserror::Error;

/// Errors produced by parley and its collaborator backends.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// The audio input or output device could not be opened or failed.
    #[error("audio device error: {0}")]
    AudioDevice(String),

    /// The speech-to-text backend failed or returned an unusable result.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// The text-generation backend failed or returned a malformed response.
    #[error("generation error: {0}")]
    Generation(String),

    /// The text-to-speech backend failed.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// A payload failed validation (too short, empty, malformed).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Conversation persistence failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// An HTTP request to a backend failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A backend response could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParleyError {
    /// Whether the pipeline should recover by abandoning the current turn
    /// rather than shutting down.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ParleyError::AudioDevice(_))
    }
}
