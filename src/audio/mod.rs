// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Audio-side turn-taking logic: confidence smoothing, adaptive
//! thresholding, and the utterance segmentation state machine.
//!
//! Everything here is pure logic with no frame types, channels, or async
//! traits, so it can be unit-tested with synthetic confidence sequences and
//! embedded in any driver.

pub mod segmenter;
pub mod threshold;
pub mod utils;

pub use segmenter::{SegmentEvent, SegmenterState, TurnSegmenter};
pub use threshold::AdaptiveThreshold;
