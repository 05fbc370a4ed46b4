// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Response generation stage.
//!
//! Consumes [`FrameEnum::Context`] snapshots, calls the [`LlmService`]
//! collaborator, and relays the fragment stream downstream between
//! [`FrameEnum::GenerationStarted`] and [`FrameEnum::GenerationEnded`]
//! markers that the sentence splitter uses to scope a response.
//!
//! Backend failures are transient-recoverable: logged, surfaced as a
//! non-fatal upstream error, and the pipeline goes back to waiting for
//! the next turn. A barge-in cancels the stream mid-flight through the
//! context's interruption token; no end marker is emitted in that case
//! because the response no longer exists downstream.

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::frames::{ErrorFrame, FrameEnum};
use crate::processors::{FrameDirection, Processor, ProcessorContext, ProcessorWeight};
use crate::services::LlmService;

/// Streams LLM responses for each context snapshot.
pub struct GenerationProcessor {
    llm: Box<dyn LlmService>,
}

impl GenerationProcessor {
    pub fn new(llm: Box<dyn LlmService>) -> Self {
        Self { llm }
    }
}

impl std::fmt::Debug for GenerationProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationProcessor").finish()
    }
}

#[async_trait]
impl Processor for GenerationProcessor {
    fn name(&self) -> &str {
        "GenerationProcessor"
    }

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Heavy
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        let snapshot = match frame {
            FrameEnum::Context(snapshot) => snapshot,
            other => {
                ctx.send(other, direction);
                return;
            }
        };

        let mut stream = match self.llm.complete(&snapshot.turns).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "generation request failed, turn abandoned");
                ctx.send_upstream(FrameEnum::Error(ErrorFrame::non_fatal(format!(
                    "generation failed: {e}"
                ))));
                return;
            }
        };

        ctx.send_downstream(FrameEnum::GenerationStarted);
        let mut fragments = 0usize;

        loop {
            let item = tokio::select! {
                biased;
                _ = ctx.interruption_token().cancelled() => {
                    debug!(fragments, "generation cancelled by barge-in");
                    return;
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(fragment)) => {
                    fragments += 1;
                    ctx.send_downstream(FrameEnum::GenText(fragment));
                }
                Some(Err(e)) => {
                    warn!(error = %e, fragments, "generation stream failed mid-response");
                    ctx.send_upstream(FrameEnum::Error(ErrorFrame::non_fatal(format!(
                        "generation stream failed: {e}"
                    ))));
                    break;
                }
                None => break,
            }
        }

        if fragments == 0 {
            debug!("generation produced no text");
        }
        ctx.send_downstream(FrameEnum::GenerationEnded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::context::{ConversationTurn, Role};
    use crate::error::ParleyError;
    use crate::frames::ContextSnapshot;
    use crate::processors::test_support::{drain, test_ctx};
    use crate::services::TextStream;

    struct ScriptedLlm {
        fragments: Vec<&'static str>,
        fail_on_request: bool,
    }

    #[async_trait]
    impl LlmService for ScriptedLlm {
        async fn complete(&self, _turns: &[ConversationTurn]) -> Result<TextStream, ParleyError> {
            if self.fail_on_request {
                return Err(ParleyError::Generation("backend unreachable".into()));
            }
            let items: Vec<Result<String, ParleyError>> = self
                .fragments
                .iter()
                .map(|s| Ok(s.to_string()))
                .collect();
            Ok(Box::pin(futures_util::stream::iter(items)))
        }
    }

    fn context() -> FrameEnum {
        FrameEnum::Context(ContextSnapshot {
            turns: vec![
                ConversationTurn::new(Role::System, "sys"),
                ConversationTurn::new(Role::User, "hi"),
            ],
        })
    }

    #[tokio::test]
    async fn streams_fragments_between_markers() {
        let mut proc = GenerationProcessor::new(Box::new(ScriptedLlm {
            fragments: vec!["Hello", " there", "."],
            fail_on_request: false,
        }));
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(context(), FrameDirection::Downstream, &ctx)
            .await;

        let frames = drain(&mut drx);
        assert!(matches!(frames[0], FrameEnum::GenerationStarted));
        assert!(matches!(frames[4], FrameEnum::GenerationEnded));
        let text: String = frames
            .iter()
            .filter_map(|f| match f {
                FrameEnum::GenText(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello there.");
    }

    #[tokio::test]
    async fn request_failure_is_recoverable() {
        let mut proc = GenerationProcessor::new(Box::new(ScriptedLlm {
            fragments: vec![],
            fail_on_request: true,
        }));
        let (ctx, mut drx, mut urx) = test_ctx();

        proc.process(context(), FrameDirection::Downstream, &ctx)
            .await;

        // No markers, no fragments; one non-fatal error upstream.
        assert!(drain(&mut drx).is_empty());
        let upstream = drain(&mut urx);
        assert_eq!(upstream.len(), 1);
        match &upstream[0] {
            FrameEnum::Error(e) => assert!(!e.fatal),
            other => panic!("expected Error, got {other}"),
        }
    }

    #[tokio::test]
    async fn empty_response_still_closes() {
        let mut proc = GenerationProcessor::new(Box::new(ScriptedLlm {
            fragments: vec![],
            fail_on_request: false,
        }));
        let (ctx, mut drx, _urx) = test_ctx();

        proc.process(context(), FrameDirection::Downstream, &ctx)
            .await;

        let frames = drain(&mut drx);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], FrameEnum::GenerationStarted));
        assert!(matches!(frames[1], FrameEnum::GenerationEnded));
    }

    #[tokio::test]
    async fn interruption_token_cancels_stream() {
        let mut proc = GenerationProcessor::new(Box::new(ScriptedLlm {
            fragments: vec!["never"],
            fail_on_request: false,
        }));
        let (ctx, mut drx, _urx) = test_ctx();
        ctx.interruption_token().clone().cancel();

        proc.process(context(), FrameDirection::Downstream, &ctx)
            .await;

        let frames = drain(&mut drx);
        // Started may be emitted before the cancellation is observed, but
        // no fragments and no end marker follow.
        assert!(frames
            .iter()
            .all(|f| !matches!(f, FrameEnum::GenText(_) | FrameEnum::GenerationEnded)));
    }
}
