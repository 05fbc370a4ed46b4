// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Parley - Real-time spoken-dialogue front end.
//!
//! Parley listens to a microphone stream, detects when a person starts and
//! stops speaking, hands finished utterances to a speech-to-text backend,
//! feeds recognized text through a streaming response pipeline
//! (generate -> split into sentences -> synthesize -> play), and stays able
//! to detect that the user has started talking again mid-playback so the
//! reply can be cut short ("barge-in").
//!
//! Everything flows as [`frames::FrameEnum`] values through a chain of
//! [`processors::Processor`] tasks connected by priority mpsc channels
//! ([`pipeline::Pipeline`]): system and control frames (interruptions,
//! lifecycle) are never blocked behind audio or text backpressure.
//!
//! Speech, language and synthesis models are external collaborators behind
//! the traits in [`services`]; the crate owns only the control logic that
//! coordinates them.

pub mod agent;
pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod frames;
pub mod pipeline;
pub mod prelude;
pub mod processors;
pub mod services;
pub mod turns;
pub mod utils;
