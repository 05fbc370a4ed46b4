// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Adaptive speech/silence threshold tracking.
//!
//! The tracker smooths raw VAD confidences with an exponential moving
//! average, keeps a short sliding window of smoothed values, and derives
//! the dynamic threshold as the window median scaled by a multiplier below
//! 1.0. The trigger point therefore sits just under recent typical voice
//! confidence and tolerates a varying noise floor.
//!
//! Until the window fills, and after every [`reset`](AdaptiveThreshold::reset),
//! the threshold is the configured static default. The result is always
//! clamped to the configured floor/ceiling band, so degenerate input
//! (all-zero confidence) simply holds the threshold at its floor.

use std::collections::VecDeque;

use crate::audio::utils::{exp_smoothing, median};
use crate::config::VadParams;

/// Derives a dynamic speech/silence threshold from a confidence stream.
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    params: VadParams,
    smoothed: Option<f64>,
    window: VecDeque<f64>,
    current: f64,
}

impl AdaptiveThreshold {
    pub fn new(params: VadParams) -> Self {
        let current = params
            .static_threshold
            .clamp(params.threshold_floor, params.threshold_ceiling);
        Self {
            params,
            smoothed: None,
            window: VecDeque::new(),
            current,
        }
    }

    /// Feed one raw confidence value; returns the updated dynamic threshold.
    pub fn update(&mut self, raw_confidence: f64) -> f64 {
        let smoothed = match self.smoothed {
            None => raw_confidence,
            Some(prev) => exp_smoothing(raw_confidence, prev, self.params.smoothing_factor),
        };
        self.smoothed = Some(smoothed);

        self.window.push_back(smoothed);
        while self.window.len() > self.params.median_window {
            self.window.pop_front();
        }

        let threshold = if self.window.len() == self.params.median_window {
            let window: Vec<f64> = self.window.iter().copied().collect();
            median(&window) * self.params.threshold_multiplier
        } else {
            self.params.static_threshold
        };

        self.current = threshold.clamp(self.params.threshold_floor, self.params.threshold_ceiling);
        self.current
    }

    /// The dynamic threshold currently in effect.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// The most recent smoothed confidence, or 0.0 before any input.
    pub fn smoothed(&self) -> f64 {
        self.smoothed.unwrap_or(0.0)
    }

    /// Revert to the static default and clear the confidence history.
    pub fn reset(&mut self) {
        self.smoothed = None;
        self.window.clear();
        self.current = self
            .params
            .static_threshold
            .clamp(self.params.threshold_floor, self.params.threshold_ceiling);
    }
}
