// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Fuzzy wake-word gating of recognized turns.
//!
//! The gate compares every word of the recognized text against every
//! configured wake phrase by Levenshtein distance and accepts the turn if
//! the minimum distance is within the configured limit. ASR regularly
//! mangles invented assistant names ("glados" -> "glad os", "gladys"), so
//! exact matching would reject most genuine activations.
//!
//! An empty phrase list disables the gate: every turn is accepted.

use crate::config::WakeWordParams;

/// Gate applied to recognized text before a turn enters generation.
#[derive(Debug, Clone)]
pub struct WakeWordGate {
    params: WakeWordParams,
}

impl WakeWordGate {
    pub fn new(params: WakeWordParams) -> Self {
        Self { params }
    }

    /// Whether gating is active at all.
    pub fn is_enabled(&self) -> bool {
        !self.params.phrases.is_empty()
    }

    /// Accept or reject recognized text.
    ///
    /// Accepts when disabled, or when any word of `text` is within
    /// `max_distance` edits of any configured phrase. Comparison is
    /// case-insensitive; punctuation attached to words is stripped.
    pub fn accepts(&self, text: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let closest = text
            .split_whitespace()
            .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|word| !word.is_empty())
            .flat_map(|word| {
                self.params
                    .phrases
                    .iter()
                    .map(move |phrase| levenshtein(&word.to_lowercase(), &phrase.to_lowercase()))
            })
            .min();

        match closest {
            Some(distance) => distance <= self.params.max_distance,
            None => false,
        }
    }
}

/// Levenshtein edit distance between two strings, by character.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let insertion = previous[j + 1] + 1;
            let deletion = current[j] + 1;
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = insertion.min(deletion).min(substitution);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
