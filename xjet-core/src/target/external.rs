// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The remote multi-runner target: dispatches artifacts to a pool of
//! [`RunnerHandle`]s through a bounded [`AsyncQueue`], demuxing their
//! framed event streams back through a shared sink.

use super::Target;
use crate::errors::InfrastructureError;
use crate::lifecycle::FrameSink;
use crate::model::{SpecArtifact, UnitId};
use crate::queue::AsyncQueue;
use crate::wire::{ActionKind, ActionPayload, ErrorPayload, EventScope, FramedMessage, Payload, SuiteErrorPayload};
use crate::XjetError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;
use xjet_metadata::FrameKind;

/// One configured remote runner slot (a `testRunners` entry).
#[derive(Clone, Copy, Debug)]
pub struct RunnerSlot {
    pub runner_id: UnitId,
    pub concurrency: u32,
    /// Milliseconds-equivalent bound on one `dispatch()` call completing.
    pub dispatch_timeout: Duration,
    /// Bound on how long a runner's `connection()` is given to fail
    /// before it is declared connected and left running in the
    /// background. A `connection()` that resolves -- with either `Ok` or
    /// `Err` -- at any point, before or after this window, is treated as
    /// that runner having disconnected.
    pub connection_timeout: Duration,
}

/// A handle to one remote execution endpoint. Implemented by the
/// transport-specific adapter a real deployment wires in (TCP, stdio,
/// ...); `xjet-core` only depends on this abstraction.
pub trait RunnerHandle: Send + Sync {
    /// Sends `bytes` (the transpiled bundle) to the runner for `suite_id`.
    async fn dispatch(&self, bytes: &[u8], suite_id: UnitId) -> Result<(), XjetError>;

    /// Opens the runner's event stream, invoking `sink.send` for every
    /// framed message it receives, until the connection ends.
    async fn connection(&self, sink: Arc<dyn FrameSink>, runner_id: UnitId) -> Result<(), XjetError>;

    /// Tears down the connection, e.g. during an orderly shutdown.
    async fn disconnect(&self);
}

/// Forwards every frame to whichever sink [`ExternalTarget::execute_suites`]
/// last installed, or drops it if no run is in flight yet (`init()` opens
/// connections before a real sink exists for this run).
struct ForwardingSink {
    target: StdMutex<Option<Arc<dyn FrameSink>>>,
}

impl ForwardingSink {
    fn new() -> Self {
        Self {
            target: StdMutex::new(None),
        }
    }

    fn point_at(&self, sink: Arc<dyn FrameSink>) {
        *self.target.lock().expect("forwarding sink poisoned") = Some(sink);
    }
}

impl FrameSink for ForwardingSink {
    fn send(&self, frame: FramedMessage) {
        if let Some(sink) = self.target.lock().expect("forwarding sink poisoned").as_ref() {
            sink.send(frame);
        }
    }
}

/// Owns a `runnerId -> RunnerHandle` mapping and the bounded queue driving
/// dispatch across all of them.
pub struct ExternalTarget<H: RunnerHandle> {
    slots: Vec<RunnerSlot>,
    handles: HashMap<UnitId, Arc<H>>,
    queue: AsyncQueue,
    available: Arc<AsyncMutex<HashMap<UnitId, bool>>>,
    forwarding_sink: Arc<ForwardingSink>,
    initialized: AtomicBool,
}

impl<H: RunnerHandle + 'static> ExternalTarget<H> {
    /// Builds a target over `runners`, sizing the queue to
    /// `sum(per-runner concurrency)`.
    pub fn new(runners: Vec<(RunnerSlot, Arc<H>)>) -> Self {
        let total_concurrency: i64 = runners.iter().map(|(slot, _)| slot.concurrency as i64).sum();
        let mut slots = Vec::with_capacity(runners.len());
        let mut handles = HashMap::with_capacity(runners.len());
        let mut available = HashMap::with_capacity(runners.len());
        for (slot, handle) in runners {
            available.insert(slot.runner_id, true);
            handles.insert(slot.runner_id, handle);
            slots.push(slot);
        }

        Self {
            slots,
            handles,
            queue: AsyncQueue::new(total_concurrency),
            available: Arc::new(AsyncMutex::new(available)),
            forwarding_sink: Arc::new(ForwardingSink::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// The runner ids currently considered connected, in configuration
    /// order.
    pub async fn available_runners(&self) -> Vec<UnitId> {
        let available = self.available.lock().await;
        self.slots
            .iter()
            .map(|slot| slot.runner_id)
            .filter(|id| *available.get(id).unwrap_or(&false))
            .collect()
    }

    fn slot_for(&self, runner_id: UnitId) -> RunnerSlot {
        self.slots
            .iter()
            .copied()
            .find(|slot| slot.runner_id == runner_id)
            .expect("runner_id must belong to a configured slot")
    }

    /// Spawns one supervising task per configured runner: races its
    /// `connection()` against `connection_timeout`, marks it available if
    /// the window elapses without a result, and keeps polling it in the
    /// background either way.
    async fn supervise(&self, slot: RunnerSlot) {
        let handle = Arc::clone(&self.handles[&slot.runner_id]);
        let sink: Arc<dyn FrameSink> = Arc::clone(&self.forwarding_sink) as Arc<dyn FrameSink>;
        let available = Arc::clone(&self.available);
        let queue = self.queue.clone();
        let runner_id = slot.runner_id;
        let connection_timeout = slot.connection_timeout;

        tokio::spawn(async move {
            let connect_fut = handle.connection(sink, runner_id);
            tokio::pin!(connect_fut);

            let outcome = match tokio::time::timeout(connection_timeout, &mut connect_fut).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    // Did not fail within the window: leave it marked
                    // available (it already defaulted to `true`) and keep
                    // polling the same future for a later disconnect.
                    connect_fut.await
                }
            };

            if let Err(error) = &outcome {
                warn!(%runner_id, %error, "runner connection failed");
            } else {
                warn!(%runner_id, "runner connection ended");
            }
            available.lock().await.insert(runner_id, false);
            queue.remove_by_runner(&runner_id.to_string()).await;
        });
    }
}

impl<H: RunnerHandle + 'static> Target for ExternalTarget<H> {
    async fn init(&self) -> Result<(), XjetError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for slot in self.slots.clone() {
            self.supervise(slot).await;
        }
        Ok(())
    }

    async fn execute_suites(
        &self,
        artifacts: HashMap<UnitId, SpecArtifact>,
        sink: Arc<dyn FrameSink>,
        _rerun: bool,
    ) -> Result<(), XjetError> {
        self.forwarding_sink.point_at(Arc::clone(&sink));
        self.queue.start().await;

        let available = self.available_runners().await;
        if available.is_empty() {
            for suite_id in artifacts.keys() {
                emit_suite_error(
                    &sink,
                    *suite_id,
                    InfrastructureError::ConnectionTimeout {
                        runner_id: "<none>".to_string(),
                    },
                );
            }
            return Ok(());
        }

        let mut pending: Vec<(UnitId, UnitId, _)> = Vec::with_capacity(artifacts.len());
        for (index, (suite_id, artifact)) in artifacts.into_iter().enumerate() {
            let runner_id = available[index % available.len()];
            let handle = Arc::clone(&self.handles[&runner_id]);
            let dispatch_timeout = self.slot_for(runner_id).dispatch_timeout;
            let code = artifact.code.clone();
            let fut = dispatch_with_timeout(handle, code, suite_id, runner_id, dispatch_timeout);
            let result_fut = self.queue.enqueue(Some(runner_id.to_string()), fut);
            pending.push((suite_id, runner_id, result_fut));
        }

        for (suite_id, runner_id, fut) in pending {
            match fut.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(%suite_id, %runner_id, %error, "dispatch failed");
                    emit_suite_error_message(&sink, suite_id, error.to_string());
                }
                Err(_queue_closed) => {
                    emit_suite_error_message(&sink, suite_id, "dispatch was orphaned by queue shutdown".to_string());
                }
            }
        }

        Ok(())
    }

    async fn active_task_count(&self) -> usize {
        self.queue.active_count().await
    }
}

fn dispatch_with_timeout<H: RunnerHandle + 'static>(
    handle: Arc<H>,
    code: String,
    suite_id: UnitId,
    runner_id: UnitId,
    dispatch_timeout: Duration,
) -> impl Future<Output = Result<(), XjetError>> + Send + 'static {
    async move {
        match tokio::time::timeout(dispatch_timeout, handle.dispatch(code.as_bytes(), suite_id)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(XjetError::Infrastructure(InfrastructureError::DispatchTimeout {
                runner_id: runner_id.to_string(),
                suite_id: suite_id.to_string(),
            })),
        }
    }
}

fn emit_suite_error(sink: &Arc<dyn FrameSink>, suite_id: UnitId, error: InfrastructureError) {
    emit_suite_error_message(sink, suite_id, error.to_string());
}

fn emit_suite_error_message(sink: &Arc<dyn FrameSink>, suite_id: UnitId, message: String) {
    let runner_id = UnitId::new([0; 16]);
    sink.send(FramedMessage {
        kind: FrameKind::Error,
        suite_id,
        runner_id,
        payload: Payload::Error(SuiteErrorPayload {
            message: message.clone(),
            format_code: None,
            stacks: vec![],
        }),
    });
    sink.send(FramedMessage {
        kind: FrameKind::Action,
        suite_id,
        runner_id,
        payload: Payload::Action(ActionPayload {
            scope: EventScope::Describe,
            action: ActionKind::Failure,
            errors: vec![ErrorPayload {
                name: "InfrastructureError".to_string(),
                message,
                stack: None,
                formatted_stack: None,
                location: None,
                source_map_reference: None,
            }],
            ancestry: vec![],
            duration_ms: 0,
            location: None,
            description: suite_id.to_string(),
        }),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct AlwaysOkRunner {
        dispatched: AtomicUsize,
    }

    impl RunnerHandle for AlwaysOkRunner {
        async fn dispatch(&self, _bytes: &[u8], _suite_id: UnitId) -> Result<(), XjetError> {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn connection(&self, _sink: Arc<dyn FrameSink>, _runner_id: UnitId) -> Result<(), XjetError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn disconnect(&self) {}
    }

    fn slot(runner_id: UnitId) -> RunnerSlot {
        RunnerSlot {
            runner_id,
            concurrency: 2,
            dispatch_timeout: Duration::from_millis(500),
            connection_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatches_every_suite_to_the_only_configured_runner() {
        let runner_id = UnitId::new([0x11; 16]);
        let runner = Arc::new(AlwaysOkRunner { dispatched: AtomicUsize::new(0) });
        let target = ExternalTarget::new(vec![(slot(runner_id), Arc::clone(&runner))]);
        target.init().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(target.available_runners().await, vec![runner_id]);

        let mut artifacts = HashMap::new();
        for i in 0..3u8 {
            artifacts.insert(UnitId::new([i; 16]), SpecArtifact::new("code", "{}"));
        }
        let events: Arc<Mutex<Vec<FramedMessage>>> = Arc::default();
        let events_clone = Arc::clone(&events);
        let sink: Arc<dyn FrameSink> = crate::lifecycle::sink_from_fn(move |f| events_clone.lock().unwrap().push(f));

        target.execute_suites(artifacts, sink, false).await.unwrap();
        assert_eq!(runner.dispatched.load(Ordering::SeqCst), 3);
    }

    struct RejectingRunner;

    impl RunnerHandle for RejectingRunner {
        async fn dispatch(&self, _bytes: &[u8], _suite_id: UnitId) -> Result<(), XjetError> {
            Ok(())
        }

        async fn connection(&self, _sink: Arc<dyn FrameSink>, _runner_id: UnitId) -> Result<(), XjetError> {
            Err(XjetError::test_failure("refused"))
        }

        async fn disconnect(&self) {}
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_runner_whose_connection_fails_is_excluded() {
        let runner_id = UnitId::new([0x22; 16]);
        let target = ExternalTarget::new(vec![(slot(runner_id), Arc::new(RejectingRunner))]);
        target.init().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(target.available_runners().await.is_empty());
    }
}
