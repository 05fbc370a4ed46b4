// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Sentence splitting: generated text into speakable chunks.
//!
//! Accumulates [`FrameEnum::GenText`] fragments and emits a
//! [`FrameEnum::Chunk`] whenever a sentence boundary (`.`, `!`, `?`, or
//! hard newline) completes. Sentences longer than the configured maximum
//! are re-split on comma boundaries (falling back to whitespace for
//! comma-less runs), so no chunk exceeds the maximum and the amount of
//! audio in flight during an interruption stays bounded. A chunk is never
//! empty.
//!
//! Before chunking, each sentence is normalized for speech: stage
//! directions in `*asterisks*` or `(parentheses)` are removed and
//! newlines collapse into sentence pauses, so the TTS never reads action
//! markup aloud.
//!
//! [`FrameEnum::GenerationEnded`] flushes any remainder and emits the
//! terminal sentinel chunk that tells playback to finalize the response.
//! An interruption clears the buffer; stale fragments of the cancelled
//! response are already being dropped by the pipeline's flush gate.

use async_trait::async_trait;

use crate::config::SplitterParams;
use crate::frames::{FrameEnum, ResponseChunk};
use crate::processors::{FrameDirection, Processor, ProcessorContext};

/// Characters that end a sentence.
const SENTENCE_ENDINGS: &[char] = &['.', '!', '?', '\n'];

/// Split text into speakable pieces no longer than `max_len` characters.
///
/// Sentence-terminal punctuation and newlines bound the primary split;
/// overlong sentences split again on commas, then on whitespace. Pieces
/// are trimmed and never empty. Concatenating the pieces with single
/// spaces reproduces the input up to whitespace.
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();

    for sentence in split_sentences(text) {
        if sentence.chars().count() <= max_len {
            push_trimmed(&mut chunks, &sentence);
            continue;
        }
        for group in split_on(&sentence, ',', max_len) {
            if group.chars().count() <= max_len {
                push_trimmed(&mut chunks, &group);
            } else {
                for piece in split_on(&group, ' ', max_len) {
                    push_trimmed(&mut chunks, &piece);
                }
            }
        }
    }

    chunks
}

/// Remove spoken-text markup: `*stage directions*`, `(asides)`, and
/// colons; newlines become sentence pauses.
pub fn normalize_for_speech(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut skip_until: Option<char> = None;

    for c in text.chars() {
        if let Some(closer) = skip_until {
            if c == closer {
                skip_until = None;
            }
            continue;
        }
        match c {
            '*' => skip_until = Some('*'),
            '(' => skip_until = Some(')'),
            ':' => out.push(' '),
            '\n' => out.push_str(". "),
            _ => out.push(c),
        }
    }

    // Collapse runs of spaces introduced by the removals.
    let mut collapsed = String::with_capacity(out.len());
    let mut last_space = false;
    for c in out.chars() {
        if c == ' ' {
            if !last_space {
                collapsed.push(c);
            }
            last_space = true;
        } else {
            collapsed.push(c);
            last_space = false;
        }
    }
    collapsed.trim().to_string()
}

fn push_trimmed(chunks: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split at sentence-terminal characters, keeping the terminator attached.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if SENTENCE_ENDINGS.contains(&c) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

/// Greedily group `separator`-delimited pieces up to `max_len` characters,
/// keeping separators attached to the piece they end.
fn split_on(text: &str, separator: char, max_len: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut piece = String::new();

    let flush_piece = |current: &mut String, piece: &mut String, groups: &mut Vec<String>| {
        let piece_len = piece.chars().count();
        let current_len = current.chars().count();
        if current_len > 0 && current_len + piece_len > max_len {
            groups.push(std::mem::take(current));
        }
        current.push_str(piece);
        piece.clear();
    };

    for c in text.chars() {
        piece.push(c);
        if c == separator {
            flush_piece(&mut current, &mut piece, &mut groups);
        }
    }
    flush_piece(&mut current, &mut piece, &mut groups);
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Whether buffered text ends at a sentence boundary.
fn ends_sentence(text: &str) -> bool {
    if text.ends_with('\n') {
        return true;
    }
    match text.trim_end().chars().last() {
        Some(last) => SENTENCE_ENDINGS.contains(&last),
        None => false,
    }
}

/// Aggregates generated fragments into indexed response chunks.
#[derive(Debug)]
pub struct SentenceSplitter {
    params: SplitterParams,
    /// Buffered text waiting for a sentence boundary.
    aggregation: String,
    /// True between GenerationStarted and GenerationEnded.
    active: bool,
    next_index: u32,
}

impl SentenceSplitter {
    pub fn new(params: SplitterParams) -> Self {
        Self {
            params,
            aggregation: String::with_capacity(256),
            active: false,
            next_index: 0,
        }
    }

    pub fn aggregation(&self) -> &str {
        &self.aggregation
    }

    fn emit_chunks(&mut self, text: &str, ctx: &ProcessorContext) {
        let normalized = normalize_for_speech(text);
        for piece in split_into_chunks(&normalized, self.params.max_chunk_len) {
            ctx.send_downstream(FrameEnum::Chunk(ResponseChunk::new(self.next_index, piece)));
            self.next_index += 1;
        }
    }
}

#[async_trait]
impl Processor for SentenceSplitter {
    fn name(&self) -> &str {
        "SentenceSplitter"
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        match frame {
            FrameEnum::GenerationStarted => {
                self.active = true;
                self.aggregation.clear();
                self.next_index = 0;
            }
            FrameEnum::GenText(fragment) => {
                if !self.active {
                    return;
                }
                self.aggregation.push_str(&fragment);
                if ends_sentence(&self.aggregation) {
                    let sentence = std::mem::take(&mut self.aggregation);
                    self.emit_chunks(&sentence, ctx);
                }
            }
            FrameEnum::GenerationEnded => {
                if !self.active {
                    return;
                }
                if !self.aggregation.is_empty() {
                    let remainder = std::mem::take(&mut self.aggregation);
                    self.emit_chunks(&remainder, ctx);
                }
                ctx.send_downstream(FrameEnum::Chunk(ResponseChunk::end_of_response(
                    self.next_index,
                )));
                self.active = false;
            }
            FrameEnum::Interruption => {
                self.aggregation.clear();
                self.active = false;
                ctx.send(FrameEnum::Interruption, direction);
            }
            other => ctx.send(other, direction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::{drain, test_ctx};

    fn chunk_texts(frames: &[FrameEnum]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| match f {
                FrameEnum::Chunk(c) if !c.end_of_response => Some(c.text.clone()),
                _ => None,
            })
            .collect()
    }

    // -- pure splitting --------------------------------------------------

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_into_chunks("Just one sentence.", 200);
        assert_eq!(chunks, vec!["Just one sentence.".to_string()]);
    }

    #[test]
    fn splits_on_sentence_boundaries() {
        let chunks = split_into_chunks("First. Second! Third?", 200);
        assert_eq!(chunks, vec!["First.", "Second!", "Third?"]);
    }

    #[test]
    fn overlong_sentence_splits_on_commas() {
        let text = "one thing, two things, three things, four things, five things";
        let chunks = split_into_chunks(text, 25);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 25, "overlong chunk: {chunk}");
        }
    }

    #[test]
    fn comma_less_run_falls_back_to_whitespace() {
        let text = "word ".repeat(40);
        let chunks = split_into_chunks(&text, 30);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30);
        }
    }

    #[test]
    fn no_chunk_is_empty() {
        for text in ["...", "a.  b.", "\n\n\n", "  ", ""] {
            for chunk in split_into_chunks(text, 10) {
                assert!(!chunk.trim().is_empty());
            }
        }
    }

    #[test]
    fn roundtrip_preserves_words() {
        let text = "The quick brown fox, which was very quick, jumped over the lazy dog. It barked! Then it slept?";
        let chunks = split_into_chunks(text, 30);
        let rejoined = chunks.join(" ");
        let original_words: Vec<&str> = text.split_whitespace().collect();
        let rejoined_words: Vec<&str> = rejoined.split_whitespace().collect();
        assert_eq!(original_words, rejoined_words);
    }

    #[test]
    fn normalization_strips_markup() {
        assert_eq!(
            normalize_for_speech("*whispers* Hello there (quietly)"),
            "Hello there"
        );
        assert_eq!(normalize_for_speech("First\nSecond"), "First. Second");
        assert_eq!(normalize_for_speech("Note: important"), "Note important");
    }

    // -- processor behaviour ---------------------------------------------

    #[tokio::test]
    async fn buffers_until_sentence_end() {
        let mut proc = SentenceSplitter::new(SplitterParams::default());
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(FrameEnum::GenerationStarted, FrameDirection::Downstream, &ctx)
            .await;
        proc.process(
            FrameEnum::GenText("Hello".into()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        assert!(drain(&mut drx).is_empty());
        assert_eq!(proc.aggregation(), "Hello");

        proc.process(
            FrameEnum::GenText(", world.".into()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        let frames = drain(&mut drx);
        assert_eq!(chunk_texts(&frames), vec!["Hello, world."]);
        assert!(proc.aggregation().is_empty());
    }

    #[tokio::test]
    async fn end_flushes_and_emits_sentinel() {
        let mut proc = SentenceSplitter::new(SplitterParams::default());
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(FrameEnum::GenerationStarted, FrameDirection::Downstream, &ctx)
            .await;
        proc.process(
            FrameEnum::GenText("no punctuation yet".into()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        proc.process(FrameEnum::GenerationEnded, FrameDirection::Downstream, &ctx)
            .await;

        let frames = drain(&mut drx);
        assert_eq!(chunk_texts(&frames), vec!["no punctuation yet"]);
        match frames.last().unwrap() {
            FrameEnum::Chunk(c) => {
                assert!(c.end_of_response);
                assert_eq!(c.index, 1);
            }
            other => panic!("expected sentinel chunk, got {other}"),
        }
    }

    #[tokio::test]
    async fn chunk_indexes_are_sequential() {
        let mut proc = SentenceSplitter::new(SplitterParams::default());
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(FrameEnum::GenerationStarted, FrameDirection::Downstream, &ctx)
            .await;
        proc.process(
            FrameEnum::GenText("One. Two. Three.".into()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        proc.process(FrameEnum::GenerationEnded, FrameDirection::Downstream, &ctx)
            .await;

        let frames = drain(&mut drx);
        let indexes: Vec<u32> = frames
            .iter()
            .filter_map(|f| match f {
                FrameEnum::Chunk(c) => Some(c.index),
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]); // 3 chunks + sentinel
    }

    #[tokio::test]
    async fn interruption_clears_buffer() {
        let mut proc = SentenceSplitter::new(SplitterParams::default());
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(FrameEnum::GenerationStarted, FrameDirection::Downstream, &ctx)
            .await;
        proc.process(
            FrameEnum::GenText("half a sent".into()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        proc.process(FrameEnum::Interruption, FrameDirection::Downstream, &ctx)
            .await;

        // Buffer gone, interruption forwarded, and a stale end marker
        // afterwards emits nothing.
        assert!(proc.aggregation().is_empty());
        proc.process(FrameEnum::GenerationEnded, FrameDirection::Downstream, &ctx)
            .await;
        let frames = drain(&mut drx);
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], FrameEnum::Interruption));
    }

    #[tokio::test]
    async fn fragments_outside_response_ignored() {
        let mut proc = SentenceSplitter::new(SplitterParams::default());
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(
            FrameEnum::GenText("orphan.".into()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        assert!(drain(&mut drx).is_empty());
    }
}
