// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Turn acceptance logic layered on top of segmentation.

pub mod wake_word;

pub use wake_word::WakeWordGate;
