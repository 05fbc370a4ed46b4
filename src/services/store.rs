// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! File-backed conversation persistence.
//!
//! Each flush writes the full turn list to `conversation_<n>.json` in the
//! configured directory, where `n` is one past the highest existing suffix;
//! earlier conversations are never overwritten. `load` returns the most
//! recent file, or an empty list when none exists.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::context::ConversationTurn;
use crate::error::ParleyError;
use crate::services::HistoryStore;

/// JSON conversation store with monotonic file suffixes.
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    dir: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, suffix: u32) -> PathBuf {
        self.dir.join(format!("conversation_{suffix}.json"))
    }

    /// Highest existing suffix, if any conversation file is present.
    async fn latest_suffix(&self) -> Option<u32> {
        let mut latest = None;
        let mut entries = tokio::fs::read_dir(&self.dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let suffix = name
                .strip_prefix("conversation_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(n) = suffix {
                latest = Some(latest.map_or(n, |prev: u32| prev.max(n)));
            }
        }
        latest
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn save(&self, turns: &[ConversationTurn]) -> Result<(), ParleyError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let suffix = match self.latest_suffix().await {
            Some(n) => n + 1,
            None => 0,
        };
        let path = self.file_path(suffix);
        let json = serde_json::to_vec_pretty(turns)?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), turns = turns.len(), "conversation saved");
        Ok(())
    }

    async fn load(&self) -> Result<Vec<ConversationTurn>, ParleyError> {
        let Some(suffix) = self.latest_suffix().await else {
            return Ok(Vec::new());
        };
        let bytes = tokio::fs::read(self.file_path(suffix)).await?;
        let turns = serde_json::from_slice(&bytes)?;
        Ok(turns)
    }
}
