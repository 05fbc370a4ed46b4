// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! The assembled voice agent.
//!
//! [`VoiceAgent::start`] wires the processor chain
//!
//! ```text
//! mic -> VAD/segmenter -> barge-in strategy -> transcription ->
//!   context -> generation -> sentence splitter -> synthesis -> playback
//! ```
//!
//! into a [`Pipeline`], pumps frames from the [`AudioSource`] into it, and
//! exposes:
//!
//! - [`submit_text`](VoiceAgent::submit_text) for typed input that skips
//!   VAD, ASR, and the wake-word gate,
//! - [`events`](VoiceAgent::events), a broadcast stream of structured
//!   [`AgentEvent`]s for a CLI or logging layer,
//! - [`shutdown`](VoiceAgent::shutdown), which stops the pumps, drains
//!   the workers, and cuts any in-flight playback short.
//!
//! Backends are chosen once, here, by constructing [`AgentServices`];
//! nothing downstream dispatches on a provider name.

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::ParleyError;
use crate::frames::{FrameEnum, StartFrame};
use crate::pipeline::{Pipeline, PriorityReceiver, PrioritySender};
use crate::processors::context::ContextAggregator;
use crate::processors::generation::GenerationProcessor;
use crate::processors::playback::PlaybackProcessor;
use crate::processors::sentence::SentenceSplitter;
use crate::processors::synthesis::SynthesisProcessor;
use crate::processors::transcription::TranscriptionProcessor;
use crate::processors::turn_start::TurnStartStrategy;
use crate::processors::vad::VadProcessor;
use crate::processors::{FrameDirection, Processor};
use crate::services::{
    AsrService, AudioSink, AudioSource, HistoryStore, LlmService, TokenCounter, TtsService,
    VadScorer,
};
use crate::turns::WakeWordGate;

/// Structured events emitted at the application edge.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A user turn passed transcription and (if enabled) the wake gate.
    TurnRecognized {
        text: String,
        language: Option<String>,
    },
    /// A response was spoken to completion.
    ResponseDelivered { text: String },
    /// A response was cut short by a barge-in.
    ResponseInterrupted {
        delivered: String,
        undelivered: String,
    },
}

/// The collaborator backends, selected once at construction.
pub struct AgentServices {
    pub vad: Box<dyn VadScorer>,
    pub asr: Box<dyn AsrService>,
    pub llm: Box<dyn LlmService>,
    pub tts: Box<dyn TtsService>,
    pub token_counter: Box<dyn TokenCounter>,
    pub store: Box<dyn HistoryStore>,
    pub source: Box<dyn AudioSource>,
    pub sink: Box<dyn AudioSink>,
}

/// A running spoken-dialogue agent.
pub struct VoiceAgent {
    input: PrioritySender,
    pipeline: Option<Pipeline>,
    events_tx: broadcast::Sender<AgentEvent>,
    pump_cancel: CancellationToken,
    pumps: JoinSet<()>,
}

impl VoiceAgent {
    /// Open the audio devices, build the pipeline, and start listening.
    ///
    /// Fails fast if the audio source or sink cannot start; that is the
    /// one non-recoverable startup error.
    pub async fn start(config: AgentConfig, services: AgentServices) -> Result<Self, ParleyError> {
        let AgentServices {
            vad,
            asr,
            llm,
            tts,
            token_counter,
            store,
            mut source,
            mut sink,
        } = services;

        source.start().await?;
        sink.start().await?;

        let processors: Vec<Box<dyn Processor>> = vec![
            Box::new(VadProcessor::new(
                vad,
                config.vad.clone(),
                config.segmenter.clone(),
                config.sample_rate,
            )),
            Box::new(TurnStartStrategy::new()),
            Box::new(TranscriptionProcessor::new(
                asr,
                WakeWordGate::new(config.wake_word.clone()),
            )),
            Box::new(ContextAggregator::new(
                config.history.clone(),
                token_counter,
                store,
            )),
            Box::new(GenerationProcessor::new(llm)),
            Box::new(SentenceSplitter::new(config.splitter.clone())),
            Box::new(SynthesisProcessor::new(tts)),
            Box::new(PlaybackProcessor::new(sink, config.playback.clone())),
        ];

        let mut pipeline = Pipeline::new(processors);
        pipeline
            .send(FrameEnum::Start(StartFrame {
                sample_rate: config.sample_rate,
                allow_interruptions: config.allow_interruptions,
            }))
            .await;

        let output_rx = pipeline
            .take_output()
            .expect("fresh pipeline always has an output receiver");
        let upstream_rx = pipeline
            .take_upstream()
            .expect("fresh pipeline always has an upstream receiver");

        let (events_tx, _) = broadcast::channel(64);
        let pump_cancel = CancellationToken::new();
        let mut pumps = JoinSet::new();

        pumps.spawn(audio_pump(source, pipeline.input().clone(), pump_cancel.clone()));
        pumps.spawn(edge_drain(output_rx, events_tx.clone(), pump_cancel.clone()));
        pumps.spawn(edge_drain(upstream_rx, events_tx.clone(), pump_cancel.clone()));

        Ok(Self {
            input: pipeline.input().clone(),
            pipeline: Some(pipeline),
            events_tx,
            pump_cancel,
            pumps,
        })
    }

    /// Inject typed user input. Skips VAD, ASR, and the wake-word gate.
    pub async fn submit_text(&self, text: impl Into<String>) {
        self.input
            .send(FrameEnum::InputText(text.into()), FrameDirection::Downstream)
            .await;
    }

    /// Subscribe to structured agent events.
    pub fn events(&self) -> broadcast::Receiver<AgentEvent> {
        self.events_tx.subscribe()
    }

    /// Stop the pumps and workers. In-flight playback stops immediately;
    /// queued frames are not processed.
    pub async fn shutdown(mut self) {
        self.input.send(FrameEnum::End, FrameDirection::Downstream).await;
        self.pump_cancel.cancel();
        while self.pumps.join_next().await.is_some() {}
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown().await;
        }
    }
}

/// Forward source frames into the pipeline until cancelled.
async fn audio_pump(
    mut source: Box<dyn AudioSource>,
    input: PrioritySender,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = source.next_frame() => frame,
        };
        match frame {
            Ok(frame) => {
                input
                    .send(FrameEnum::InputAudio(frame), FrameDirection::Downstream)
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, "audio source failed, stopping capture");
                break;
            }
        }
    }
    if let Err(e) = source.stop().await {
        tracing::warn!(error = %e, "audio source stop failed");
    }
}

/// Turn frames leaving the pipeline into broadcast events.
async fn edge_drain(
    mut rx: PriorityReceiver,
    events_tx: broadcast::Sender<AgentEvent>,
    cancel: CancellationToken,
) {
    loop {
        let directed = tokio::select! {
            _ = cancel.cancelled() => break,
            directed = rx.recv() => match directed {
                Some(d) => d,
                None => break,
            },
        };

        match directed.frame {
            FrameEnum::Recognized(turn) => {
                let _ = events_tx.send(AgentEvent::TurnRecognized {
                    text: turn.text,
                    language: turn.language,
                });
            }
            FrameEnum::Delivery(report) => {
                let event = if report.interrupted {
                    AgentEvent::ResponseInterrupted {
                        delivered: report.delivered,
                        undelivered: report.undelivered,
                    }
                } else {
                    AgentEvent::ResponseDelivered {
                        text: report.delivered,
                    }
                };
                let _ = events_tx.send(event);
            }
            FrameEnum::Error(e) if e.fatal => {
                tracing::error!(error = %e.error, "fatal pipeline error");
            }
            FrameEnum::Error(e) => {
                tracing::warn!(error = %e.error, "recoverable pipeline error");
            }
            other => {
                tracing::trace!(frame = %other, "edge frame");
            }
        }
    }
}
