// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! End-to-end agent tests with mock collaborators.
//!
//! The mock VAD scorer reports the first sample of each frame as its
//! confidence, so tests steer segmentation by the sample values they feed.
//! Mock ASR/LLM/TTS return canned results; the sink is a no-op, so
//! playback paces purely on expected duration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use parley::prelude::*;

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

/// Confidence = |first sample| of the frame.
struct FirstSampleScorer;

impl VadScorer for FirstSampleScorer {
    fn score(&mut self, samples: &[f32]) -> Result<f64, ParleyError> {
        Ok(samples.first().copied().unwrap_or(0.0).abs() as f64)
    }
    fn reset(&mut self) {}
}

struct FixedAsr {
    text: &'static str,
}

#[async_trait]
impl AsrService for FixedAsr {
    async fn transcribe(&self, _samples: &[f32], _rate: u32) -> Result<Transcript, ParleyError> {
        Ok(Transcript {
            text: self.text.to_string(),
            language: Some("en".to_string()),
            language_confidence: 0.95,
        })
    }
}

struct FixedLlm {
    fragments: Vec<&'static str>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmService for FixedLlm {
    async fn complete(&self, _turns: &[ConversationTurn]) -> Result<TextStream, ParleyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<String, ParleyError>> =
            self.fragments.iter().map(|s| Ok(s.to_string())).collect();
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

/// Fixed-duration synthesis regardless of text.
struct FixedTts {
    millis_per_chunk: u64,
}

#[async_trait]
impl TtsService for FixedTts {
    async fn synthesize(&self, _text: &str) -> Result<Synthesis, ParleyError> {
        Ok(Synthesis {
            samples: vec![0.0; (16 * self.millis_per_chunk) as usize],
            sample_rate: 16000,
        })
    }
}

struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, _samples: &[f32], _rate: u32) -> Result<(), ParleyError> {
        Ok(())
    }
    async fn stop_playback(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

/// Source fed by a channel from the test body.
struct ChannelSource {
    rx: mpsc::UnboundedReceiver<AudioFrame>,
}

#[async_trait]
impl AudioSource for ChannelSource {
    async fn start(&mut self) -> Result<(), ParleyError> {
        Ok(())
    }
    async fn next_frame(&mut self) -> Result<AudioFrame, ParleyError> {
        match self.rx.recv().await {
            Some(frame) => Ok(frame),
            // Test finished feeding; block until the pump is cancelled.
            None => futures_util::future::pending().await,
        }
    }
}

struct MemoryStore;

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn save(&self, _turns: &[ConversationTurn]) -> Result<(), ParleyError> {
        Ok(())
    }
    async fn load(&self) -> Result<Vec<ConversationTurn>, ParleyError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Install a subscriber once so failures come with pipeline logs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

const RATE: u32 = 16000;
const FRAME_SAMPLES: usize = 800; // 50 ms

struct Feeder {
    tx: mpsc::UnboundedSender<AudioFrame>,
    seq: u64,
}

impl Feeder {
    fn feed(&mut self, n: usize, level: f32) {
        for _ in 0..n {
            let frame = AudioFrame::new(
                self.seq,
                vec![level; FRAME_SAMPLES],
                RATE,
                self.seq as f64 * 0.05,
            );
            self.seq += 1;
            let _ = self.tx.send(frame);
        }
    }
}

fn config(wake_phrases: &[&str]) -> AgentConfig {
    AgentConfig {
        sample_rate: RATE,
        frame_ms: 50,
        allow_interruptions: true,
        segmenter: SegmenterParams {
            pre_roll_ms: 100,
            pause_limit_ms: 150,
            min_utterance_ms: 100,
        },
        wake_word: if wake_phrases.is_empty() {
            WakeWordParams::default()
        } else {
            WakeWordParams::with_phrases(wake_phrases.to_vec())
        },
        playback: PlaybackParams {
            poll_interval_ms: 10,
        },
        ..AgentConfig::default()
    }
}

async fn start_agent(
    cfg: AgentConfig,
    asr_text: &'static str,
    fragments: Vec<&'static str>,
    tts_millis: u64,
) -> (VoiceAgent, Feeder, Arc<AtomicUsize>) {
    init_tracing();
    let (tx, rx) = mpsc::unbounded_channel();
    let llm_calls = Arc::new(AtomicUsize::new(0));

    let services = AgentServices {
        vad: Box::new(FirstSampleScorer),
        asr: Box::new(FixedAsr { text: asr_text }),
        llm: Box::new(FixedLlm {
            fragments,
            calls: llm_calls.clone(),
        }),
        tts: Box::new(FixedTts {
            millis_per_chunk: tts_millis,
        }),
        token_counter: Box::new(WordCounter),
        store: Box::new(MemoryStore),
        source: Box::new(ChannelSource { rx }),
        sink: Box::new(NullSink),
    };

    let agent = VoiceAgent::start(cfg, services)
        .await
        .expect("agent startup");
    (agent, Feeder { tx, seq: 0 }, llm_calls)
}

async fn next_event(
    events: &mut tokio::sync::broadcast::Receiver<AgentEvent>,
    secs: u64,
) -> AgentEvent {
    timeout(Duration::from_secs(secs), events.recv())
        .await
        .expect("timed out waiting for agent event")
        .expect("event channel closed")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn voice_turn_is_recognized_and_answered() {
    let (agent, mut feeder, _) = start_agent(
        config(&[]),
        "hello assistant",
        vec!["Hi there. ", "Glad to help."],
        100,
    )
    .await;
    let mut events = agent.events();

    // Speak for 400 ms, then fall silent past the pause limit.
    feeder.feed(8, 0.9);
    feeder.feed(5, 0.0);

    match next_event(&mut events, 5).await {
        AgentEvent::TurnRecognized { text, language } => {
            assert_eq!(text, "hello assistant");
            assert_eq!(language.as_deref(), Some("en"));
        }
        other => panic!("expected TurnRecognized, got {other:?}"),
    }

    match next_event(&mut events, 5).await {
        AgentEvent::ResponseDelivered { text } => {
            assert_eq!(text, "Hi there. Glad to help.");
        }
        other => panic!("expected ResponseDelivered, got {other:?}"),
    }

    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn barge_in_interrupts_playback() {
    let (agent, mut feeder, _) = start_agent(
        config(&[]),
        "tell me everything",
        vec!["This is a very long answer that goes on and on for quite a while."],
        2000, // one 2 s chunk
    )
    .await;
    let mut events = agent.events();

    feeder.feed(8, 0.9);
    feeder.feed(5, 0.0);

    match next_event(&mut events, 5).await {
        AgentEvent::TurnRecognized { .. } => {}
        other => panic!("expected TurnRecognized, got {other:?}"),
    }

    // Let playback get a few hundred milliseconds into the chunk, then
    // start speaking again.
    tokio::time::sleep(Duration::from_millis(500)).await;
    feeder.feed(3, 0.9);

    match next_event(&mut events, 5).await {
        AgentEvent::ResponseInterrupted {
            delivered,
            undelivered,
        } => {
            assert!(
                delivered.contains("<INTERRUPTED>"),
                "delivered: {delivered}"
            );
            assert!(!undelivered.is_empty(), "undelivered should name the cut text");
        }
        other => panic!("expected ResponseInterrupted, got {other:?}"),
    }

    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn wake_word_rejection_drops_turn() {
    let (agent, mut feeder, llm_calls) = start_agent(
        config(&["glados"]),
        "open the pod bay doors",
        vec!["I'm afraid I can't do that."],
        50,
    )
    .await;
    let mut events = agent.events();

    feeder.feed(8, 0.9);
    feeder.feed(5, 0.0);

    // The turn is dropped silently: no event, no generation request.
    let waited = timeout(Duration::from_millis(1500), events.recv()).await;
    assert!(waited.is_err(), "expected no event, got {waited:?}");
    assert_eq!(llm_calls.load(Ordering::SeqCst), 0);

    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn typed_input_skips_gate_and_gets_answer() {
    let (agent, _feeder, llm_calls) = start_agent(
        config(&["glados"]), // gate enabled, typed input must bypass it
        "unused",
        vec!["Typed reply."],
        50,
    )
    .await;
    let mut events = agent.events();

    agent.submit_text("what time is it").await;

    match next_event(&mut events, 5).await {
        AgentEvent::ResponseDelivered { text } => {
            assert_eq!(text, "Typed reply.");
        }
        other => panic!("expected ResponseDelivered, got {other:?}"),
    }
    assert_eq!(llm_calls.load(Ordering::SeqCst), 1);

    agent.shutdown().await;
}
