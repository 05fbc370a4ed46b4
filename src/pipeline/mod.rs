// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Channel-based pipeline where each processor runs on its own tokio task.

pub mod channel;

pub use channel::{DirectedFrame, Pipeline, PriorityReceiver, PrioritySender};
