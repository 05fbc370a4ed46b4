// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Incremental Server-Sent Events parsing for streaming chat backends.
//!
//! Network reads split SSE records arbitrarily, so the parser buffers
//! partial lines across [`feed`](SseParser::feed) calls and emits complete
//! events only. Recognizes `data:` payloads, the OpenAI-style `[DONE]`
//! sentinel, SSE comments, and blank record separators.

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload.
    Data(String),
    /// Stream termination (`data: [DONE]`).
    Done,
}

/// Streaming SSE parser tolerant of chunk boundaries anywhere.
#[derive(Debug, Default)]
pub struct SseParser {
    line_buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            line_buffer: String::with_capacity(256),
        }
    }

    /// Feed a UTF-8 text chunk; returns any events completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.line_buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer[..newline].to_string();
            self.line_buffer.drain(..=newline);
            let line = line.trim();

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }

        events
    }
}
