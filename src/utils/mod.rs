// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Shared utility functions for the parley pipeline.

use std::time::SystemTime;

/// Milliseconds since the Unix epoch.
///
/// Used to stamp conversation turns; wall-clock precision is sufficient
/// because turns are ordered by position, not timestamp.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_nonzero() {
        assert!(now_ms() > 0);
    }
}
