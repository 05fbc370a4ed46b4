// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Channel plumbing between processor tasks.
//!
//! Each processor runs on its own tokio task; adjacent tasks are joined by
//! a *priority channel* pair:
//!
//! - System and control frames ride an unbounded channel checked first via
//!   `select! { biased; .. }`, so interruptions and lifecycle signals are
//!   never stuck behind data backpressure.
//! - Data frames ride a bounded channel sized by processor weight, which
//!   preserves FIFO ordering and applies backpressure to producers.
//!
//! The sender carries a *flush gate*: while a barge-in is being processed,
//! interruptible data frames are silently dropped at the send side so
//! stale response content (chunks, synthesized audio) never reaches the
//! stages past the interruption point. Uninterruptible frames (delivery
//! reports, errors, lifecycle) always pass.
//!
//! Heavy processors get a two-level monitor: their `process()` future is
//! raced against the priority channel, so an Interruption arriving while a
//! backend call is in flight cancels the call cooperatively through the
//! context's interruption token instead of waiting for it to finish.

use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::frames::{ErrorFrame, FrameEnum, FrameKind};
use crate::processors::{FrameDirection, Processor, ProcessorContext, ProcessorWeight};

/// Bounded data-channel capacity by processor weight.
fn data_channel_capacity(weight: ProcessorWeight) -> usize {
    match weight {
        ProcessorWeight::Light => 32,
        ProcessorWeight::Standard => 64,
        ProcessorWeight::Heavy => 128,
    }
}

/// A frame tagged with its flow direction.
#[derive(Debug)]
pub struct DirectedFrame {
    pub frame: FrameEnum,
    pub direction: FrameDirection,
}

/// Sender half of a priority channel pair.
#[derive(Clone)]
pub struct PrioritySender {
    priority_tx: mpsc::UnboundedSender<DirectedFrame>,
    data_tx: mpsc::Sender<DirectedFrame>,
    flushing: Arc<AtomicBool>,
}

impl PrioritySender {
    /// Send a frame, routing by kind.
    ///
    /// System/control frames always pass. Data frames are dropped while
    /// the flush gate is active unless they are uninterruptible.
    pub async fn send(&self, frame: FrameEnum, direction: FrameDirection) {
        let directed = DirectedFrame { frame, direction };
        if matches!(directed.frame.kind(), FrameKind::System | FrameKind::Control) {
            if self.priority_tx.send(directed).is_err() {
                tracing::warn!("PrioritySender: priority receiver dropped, frame lost");
            }
        } else {
            if self.flushing.load(Ordering::Acquire) && !directed.frame.is_uninterruptible() {
                tracing::trace!(frame = %directed.frame, "dropping data frame during flush");
                return;
            }
            if self.data_tx.send(directed).await.is_err() {
                tracing::warn!("PrioritySender: data receiver dropped, frame lost");
            }
        }
    }

    /// Begin dropping interruptible data frames. Idempotent.
    pub fn start_flush(&self) {
        self.flushing.store(true, Ordering::Release);
    }

    /// Let data frames flow normally again.
    pub fn stop_flush(&self) {
        self.flushing.store(false, Ordering::Release);
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }
}

/// Receiver half of a priority channel pair.
pub struct PriorityReceiver {
    priority_rx: mpsc::UnboundedReceiver<DirectedFrame>,
    data_rx: mpsc::Receiver<DirectedFrame>,
}

impl PriorityReceiver {
    /// Receive the next frame, preferring priority traffic.
    pub async fn recv(&mut self) -> Option<DirectedFrame> {
        tokio::select! {
            biased;
            Some(frame) = self.priority_rx.recv() => Some(frame),
            Some(frame) = self.data_rx.recv() => Some(frame),
            else => None,
        }
    }

    /// Receive from the priority channel only. Used by the Heavy monitor
    /// loop to watch for interruptions while `process()` runs.
    pub async fn recv_priority(&mut self) -> Option<DirectedFrame> {
        self.priority_rx.recv().await
    }

    /// Drain buffered data frames, keeping only uninterruptible ones.
    /// Returns `(preserved, discarded_count)`.
    pub fn drain_data_selective(&mut self) -> (Vec<DirectedFrame>, usize) {
        let mut preserved = Vec::new();
        let mut discarded = 0usize;
        while let Ok(directed) = self.data_rx.try_recv() {
            if directed.frame.is_uninterruptible() {
                preserved.push(directed);
            } else {
                discarded += 1;
            }
        }
        (preserved, discarded)
    }
}

/// Create a priority channel pair with the given data capacity.
pub fn priority_channel(data_capacity: usize) -> (PrioritySender, PriorityReceiver) {
    let (priority_tx, priority_rx) = mpsc::unbounded_channel();
    let (data_tx, data_rx) = mpsc::channel(data_capacity);
    (
        PrioritySender {
            priority_tx,
            data_tx,
            flushing: Arc::new(AtomicBool::new(false)),
        },
        PriorityReceiver {
            priority_rx,
            data_rx,
        },
    )
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A chain of processors, each on its own task, joined by priority channels.
///
/// ```text
/// [input] -> [proc 0] -> [proc 1] -> ... -> [proc N-1] -> [output]
///               ^            |
///               '--upstream--'
/// ```
pub struct Pipeline {
    input_tx: PrioritySender,
    output_rx: Option<PriorityReceiver>,
    upstream_rx: Option<PriorityReceiver>,
    join_set: JoinSet<()>,
    cancel_token: CancellationToken,
}

impl Pipeline {
    /// Spawn one task per processor and wire the channels between them.
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        let cancel_token = CancellationToken::new();
        let mut join_set = JoinSet::new();
        let n = processors.len();

        if n == 0 {
            let (input_tx, output_rx) = priority_channel(64);
            return Self {
                input_tx,
                output_rx: Some(output_rx),
                upstream_rx: None,
                join_set,
                cancel_token,
            };
        }

        // N+1 downstream pairs (input -> proc 0 -> ... -> proc N-1 -> output),
        // sized by the weight of the processor that reads each one.
        let mut down_txs = Vec::with_capacity(n + 1);
        let mut down_rxs: Vec<Option<PriorityReceiver>> = Vec::with_capacity(n + 1);
        let caps: Vec<usize> = processors
            .iter()
            .map(|p| data_channel_capacity(p.weight()))
            .chain(std::iter::once(64))
            .collect();
        for cap in caps {
            let (tx, rx) = priority_channel(cap);
            down_txs.push(tx);
            down_rxs.push(Some(rx));
        }

        // N+1 upstream pairs; upstream traffic is light.
        let mut up_txs = Vec::with_capacity(n + 1);
        let mut up_rxs: Vec<Option<PriorityReceiver>> = Vec::with_capacity(n + 1);
        for _ in 0..=n {
            let (tx, rx) = priority_channel(32);
            up_txs.push(tx);
            up_rxs.push(Some(rx));
        }

        let pipeline_input_tx = down_txs[0].clone();
        let pipeline_output_rx = down_rxs[n].take();
        let pipeline_upstream_rx = up_rxs[0].take();

        for (i, processor) in processors.into_iter().enumerate() {
            let down_rx = down_rxs[i].take().expect("down receiver taken twice");
            let up_rx = up_rxs[i + 1].take().expect("up receiver taken twice");
            let downstream_tx = down_txs[i + 1].clone();
            let upstream_tx = up_txs[i].clone();
            let token = cancel_token.clone();

            join_set.spawn(processor_task(
                processor,
                down_rx,
                up_rx,
                downstream_tx,
                upstream_tx,
                token,
            ));
        }

        Self {
            input_tx: pipeline_input_tx,
            output_rx: pipeline_output_rx,
            upstream_rx: pipeline_upstream_rx,
            join_set,
            cancel_token,
        }
    }

    /// Sender feeding the first processor.
    pub fn input(&self) -> &PrioritySender {
        &self.input_tx
    }

    /// Send a frame downstream into the pipeline.
    pub async fn send(&self, frame: FrameEnum) {
        self.input_tx.send(frame, FrameDirection::Downstream).await;
    }

    /// Take the downstream output receiver. Single use.
    pub fn take_output(&mut self) -> Option<PriorityReceiver> {
        self.output_rx.take()
    }

    /// Take the upstream output receiver (frames the first processor sends
    /// upstream). Single use.
    pub fn take_upstream(&mut self) -> Option<PriorityReceiver> {
        self.upstream_rx.take()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Cancel all processor tasks and wait for them to finish. In-flight
    /// work is cut short; queued frames are not processed.
    pub async fn shutdown(mut self) {
        drop(self.input_tx);
        self.cancel_token.cancel();
        while let Some(result) = self.join_set.join_next().await {
            if let Err(e) = result {
                tracing::error!("Pipeline: processor task panicked during shutdown: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-processor task loop
// ---------------------------------------------------------------------------

/// Outcome of racing a Heavy `process()` against the priority channel.
enum MonitorResult {
    Completed,
    Interrupted(DirectedFrame),
    Cancelled,
    Panicked(String),
}

async fn processor_task(
    mut processor: Box<dyn Processor>,
    mut down_rx: PriorityReceiver,
    mut up_rx: PriorityReceiver,
    downstream_tx: PrioritySender,
    upstream_tx: PrioritySender,
    token: CancellationToken,
) {
    // Context channels are unbounded so process() can emit without
    // deadlocking against its own input; the loop drains them into the
    // bounded inter-stage channels after every call.
    let (ctx_down_tx, mut ctx_down_rx) = mpsc::unbounded_channel::<FrameEnum>();
    let (ctx_up_tx, mut ctx_up_rx) = mpsc::unbounded_channel::<FrameEnum>();
    let mut ctx = ProcessorContext::new(ctx_down_tx, ctx_up_tx, token.clone());

    let is_heavy = processor.weight() == ProcessorWeight::Heavy;

    processor.setup().await;
    tracing::debug!(processor = %processor.name(), weight = %processor.weight(), "processor started");

    'outer: loop {
        let directed = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            Some(d) = down_rx.recv() => d,
            Some(d) = up_rx.recv() => d,
            // Background output produced between input frames still has to
            // be forwarded.
            Some(frame) = ctx_down_rx.recv() => {
                downstream_tx.send(frame, FrameDirection::Downstream).await;
                continue;
            }
            Some(frame) = ctx_up_rx.recv() => {
                upstream_tx.send(frame, FrameDirection::Upstream).await;
                continue;
            }
            else => break,
        };

        tracing::trace!(
            processor = %processor.name(),
            frame = %directed.frame,
            direction = ?directed.direction,
            "dispatching"
        );

        // An interruption received while idle still invalidates the data
        // frames queued behind it: they belong to the cancelled response
        // and were only overtaken because interruptions ride the priority
        // lane. Drop them before the processor sees the interruption.
        if matches!(directed.frame, FrameEnum::Interruption) {
            let (preserved, discarded) = down_rx.drain_data_selective();
            if discarded > 0 {
                tracing::debug!(
                    processor = %processor.name(),
                    discarded,
                    "dropped stale data frames overtaken by interruption"
                );
            }
            processor
                .process(directed.frame, directed.direction, &ctx)
                .await;
            drain_context(&mut ctx_down_rx, &mut ctx_up_rx, &downstream_tx, &upstream_tx).await;
            for pf in preserved {
                processor.process(pf.frame, pf.direction, &ctx).await;
                drain_context(&mut ctx_down_rx, &mut ctx_up_rx, &downstream_tx, &upstream_tx)
                    .await;
            }
            continue;
        }

        if is_heavy {
            let interrupt_token = CancellationToken::new();
            ctx.set_interruption_token(interrupt_token.clone());
            let proc_name = processor.name().to_string();
            let mut buffered_priority: Vec<DirectedFrame> = Vec::new();

            // The process future borrows the processor mutably, so
            // post-interruption handling happens after this block ends.
            let result = {
                let mut process_fut = pin!(AssertUnwindSafe(processor.process(
                    directed.frame,
                    directed.direction,
                    &ctx
                ))
                .catch_unwind());

                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break MonitorResult::Cancelled,
                        panic_result = &mut process_fut => {
                            match panic_result {
                                Err(panic_info) => break MonitorResult::Panicked(panic_message(panic_info)),
                                Ok(()) => break MonitorResult::Completed,
                            }
                        }
                        Some(pf) = down_rx.recv_priority() => {
                            if matches!(pf.frame, FrameEnum::Interruption) {
                                tracing::debug!(processor = %proc_name, "interruption during Heavy process()");
                                // Ask the processor to bail out, then let it finish.
                                interrupt_token.cancel();
                                let _ = process_fut.await;
                                break MonitorResult::Interrupted(pf);
                            }
                            buffered_priority.push(pf);
                        }
                    }
                }
            };

            match result {
                MonitorResult::Cancelled => break 'outer,
                MonitorResult::Panicked(msg) => {
                    tracing::error!(processor = %proc_name, "processor panicked: {msg}");
                    downstream_tx
                        .send(
                            FrameEnum::Error(ErrorFrame::new(
                                format!("processor {proc_name} panicked: {msg}"),
                                true,
                            )),
                            FrameDirection::Downstream,
                        )
                        .await;
                    break 'outer;
                }
                MonitorResult::Interrupted(interruption) => {
                    // Drop stale response data produced before and during
                    // the interrupted call.
                    downstream_tx.start_flush();

                    let mut ctx_discarded = 0usize;
                    while let Ok(frame) = ctx_down_rx.try_recv() {
                        // Same rule as the flush gate: only interruptible
                        // data frames belong to the cancelled response.
                        let stale = matches!(frame.kind(), FrameKind::Data)
                            && !frame.is_uninterruptible();
                        if stale {
                            ctx_discarded += 1;
                        } else {
                            downstream_tx.send(frame, FrameDirection::Downstream).await;
                        }
                    }
                    while let Ok(frame) = ctx_up_rx.try_recv() {
                        // Upstream traffic (reports, errors) is not part of
                        // the cancelled response; forward it all.
                        upstream_tx.send(frame, FrameDirection::Upstream).await;
                    }

                    let (preserved, discarded) = down_rx.drain_data_selective();
                    if discarded > 0 || ctx_discarded > 0 {
                        tracing::debug!(
                            processor = %proc_name,
                            discarded,
                            ctx_discarded,
                            "flushed stale frames after interruption"
                        );
                    }
                    for pf in preserved {
                        match pf.direction {
                            FrameDirection::Downstream => {
                                downstream_tx.send(pf.frame, pf.direction).await
                            }
                            FrameDirection::Upstream => {
                                upstream_tx.send(pf.frame, pf.direction).await
                            }
                        }
                    }

                    // Hand the Interruption itself to the processor for
                    // cleanup (and forwarding), with a fresh token.
                    ctx.set_interruption_token(CancellationToken::new());
                    processor
                        .process(interruption.frame, interruption.direction, &ctx)
                        .await;
                    drain_context(&mut ctx_down_rx, &mut ctx_up_rx, &downstream_tx, &upstream_tx)
                        .await;

                    downstream_tx.stop_flush();

                    for pf in buffered_priority.drain(..) {
                        processor.process(pf.frame, pf.direction, &ctx).await;
                        drain_context(
                            &mut ctx_down_rx,
                            &mut ctx_up_rx,
                            &downstream_tx,
                            &upstream_tx,
                        )
                        .await;
                    }
                    continue;
                }
                MonitorResult::Completed => {
                    for pf in buffered_priority.drain(..) {
                        processor.process(pf.frame, pf.direction, &ctx).await;
                    }
                }
            }
        } else {
            let result = AssertUnwindSafe(processor.process(directed.frame, directed.direction, &ctx))
                .catch_unwind()
                .await;
            if let Err(panic_info) = result {
                let msg = panic_message(panic_info);
                tracing::error!(processor = %processor.name(), "processor panicked: {msg}");
                downstream_tx
                    .send(
                        FrameEnum::Error(ErrorFrame::new(
                            format!("processor {} panicked: {msg}", processor.name()),
                            true,
                        )),
                        FrameDirection::Downstream,
                    )
                    .await;
                break;
            }
        }

        // Forward everything process() emitted before taking the next
        // input, preserving per-frame output ordering.
        drain_context(&mut ctx_down_rx, &mut ctx_up_rx, &downstream_tx, &upstream_tx).await;
    }

    processor.cleanup().await;
    tracing::debug!(processor = %processor.name(), "processor stopped");
}

async fn drain_context(
    ctx_down_rx: &mut mpsc::UnboundedReceiver<FrameEnum>,
    ctx_up_rx: &mut mpsc::UnboundedReceiver<FrameEnum>,
    downstream_tx: &PrioritySender,
    upstream_tx: &PrioritySender,
) {
    while let Ok(frame) = ctx_down_rx.try_recv() {
        downstream_tx.send(frame, FrameDirection::Downstream).await;
    }
    while let Ok(frame) = ctx_up_rx.try_recv() {
        upstream_tx.send(frame, FrameDirection::Upstream).await;
    }
}

fn panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::frames::ResponseChunk;

    #[derive(Debug)]
    struct Passthrough {
        name: &'static str,
    }

    #[async_trait]
    impl Processor for Passthrough {
        fn name(&self) -> &str {
            self.name
        }
        fn weight(&self) -> ProcessorWeight {
            ProcessorWeight::Light
        }
        async fn process(
            &mut self,
            frame: FrameEnum,
            direction: FrameDirection,
            ctx: &ProcessorContext,
        ) {
            ctx.send(frame, direction);
        }
    }

    /// Heavy processor that sleeps until its interruption token fires.
    #[derive(Debug)]
    struct SlowEcho;

    #[async_trait]
    impl Processor for SlowEcho {
        fn name(&self) -> &str {
            "SlowEcho"
        }
        fn weight(&self) -> ProcessorWeight {
            ProcessorWeight::Heavy
        }
        async fn process(
            &mut self,
            frame: FrameEnum,
            direction: FrameDirection,
            ctx: &ProcessorContext,
        ) {
            if let FrameEnum::Chunk(chunk) = &frame {
                if !chunk.end_of_response {
                    tokio::select! {
                        _ = ctx.interruption_token().cancelled() => {
                            // Abandoned mid-call: emit nothing.
                            return;
                        }
                        _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
                    }
                }
            }
            ctx.send(frame, direction);
        }
    }

    #[tokio::test]
    async fn frames_flow_through_chain() {
        let mut pipeline = Pipeline::new(vec![
            Box::new(Passthrough { name: "a" }),
            Box::new(Passthrough { name: "b" }),
        ]);
        let mut output = pipeline.take_output().unwrap();

        pipeline.send(FrameEnum::GenText("hello".into())).await;
        pipeline.send(FrameEnum::GenerationEnded).await;

        // Control frame rides the priority channel, so it can overtake the
        // data frame; collect both and check contents.
        let first = output.recv().await.unwrap();
        let second = output.recv().await.unwrap();
        let names: Vec<&str> = vec![first.frame.name(), second.frame.name()];
        assert!(names.contains(&"GenText"));
        assert!(names.contains(&"GenerationEnded"));

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn empty_pipeline_connects_input_to_output() {
        let mut pipeline = Pipeline::new(Vec::new());
        let mut output = pipeline.take_output().unwrap();
        pipeline.send(FrameEnum::End).await;
        let out = output.recv().await.unwrap();
        assert!(matches!(out.frame, FrameEnum::End));
    }

    #[tokio::test]
    async fn flush_gate_drops_interruptible_data() {
        let (tx, mut rx) = priority_channel(8);

        tx.start_flush();
        tx.send(
            FrameEnum::Chunk(ResponseChunk::new(0, "stale")),
            FrameDirection::Downstream,
        )
        .await;
        tx.send(FrameEnum::Interruption, FrameDirection::Downstream)
            .await;
        tx.stop_flush();
        tx.send(
            FrameEnum::Chunk(ResponseChunk::new(1, "fresh")),
            FrameDirection::Downstream,
        )
        .await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.frame, FrameEnum::Interruption));
        let second = rx.recv().await.unwrap();
        match second.frame {
            FrameEnum::Chunk(chunk) => assert_eq!(chunk.text, "fresh"),
            other => panic!("expected fresh chunk, got {other}"),
        }
    }

    #[tokio::test]
    async fn selective_drain_keeps_uninterruptible_data() {
        use crate::frames::DeliveryReport;

        let (tx, mut rx) = priority_channel(8);
        tx.send(
            FrameEnum::Chunk(ResponseChunk::new(0, "stale")),
            FrameDirection::Downstream,
        )
        .await;
        tx.send(
            FrameEnum::Delivery(DeliveryReport {
                delivered: "kept".into(),
                undelivered: String::new(),
                interrupted: true,
            }),
            FrameDirection::Upstream,
        )
        .await;

        let (preserved, discarded) = rx.drain_data_selective();
        assert_eq!(discarded, 1);
        assert_eq!(preserved.len(), 1);
        assert!(matches!(preserved[0].frame, FrameEnum::Delivery(_)));
    }

    #[tokio::test]
    async fn interruption_cancels_heavy_processor() {
        let mut pipeline = Pipeline::new(vec![Box::new(SlowEcho)]);
        let mut output = pipeline.take_output().unwrap();

        pipeline
            .send(FrameEnum::Chunk(ResponseChunk::new(0, "never spoken")))
            .await;
        // Give the task a moment to enter process().
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        pipeline.send(FrameEnum::Interruption).await;

        // The interruption must come out; the chunk must not.
        let out = tokio::time::timeout(std::time::Duration::from_secs(1), output.recv())
            .await
            .expect("interruption did not propagate")
            .unwrap();
        assert!(matches!(out.frame, FrameEnum::Interruption));

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_tasks() {
        let pipeline = Pipeline::new(vec![
            Box::new(Passthrough { name: "a" }),
            Box::new(Passthrough { name: "b" }),
        ]);
        // Must return promptly even with no traffic.
        tokio::time::timeout(std::time::Duration::from_secs(1), pipeline.shutdown())
            .await
            .expect("shutdown hung");
    }
}
