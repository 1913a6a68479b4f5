// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-process sandbox target: runs each artifact's already-registered
//! suite tree to completion, isolating a panicking suite via
//! `tokio::spawn`'s `JoinHandle` the way a real VM sandbox isolates a
//! runtime panic from the orchestrator's own process. A JS-hosted sandbox
//! would expose globals like `require`, `Buffer`, `console`, ...; this is
//! a Rust reimplementation, so the exposure surface shrinks to "the suite
//! tree the directive layer already registered", carried on
//! `SpecArtifact::suite` (see `model.rs`'s `SpecArtifact` doc comment for
//! why).

use super::Target;
use crate::errors::InfrastructureError;
use crate::lifecycle::{self, FrameSink, LifecycleConfig};
use crate::model::{ExecutionContext, SpecArtifact, UnitId};
use crate::wire::{ActionKind, ActionPayload, ErrorPayload, EventScope, FramedMessage, Payload, SuiteErrorPayload};
use crate::XjetError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{instrument, warn};
use xjet_metadata::FrameKind;

/// The sentinel runner id a [`LocalTarget`] stamps on every frame it
/// emits: there is no real remote runner to identify by in-process.
const LOCAL_RUNNER_ID: UnitId = UnitId::new([0; 16]);

/// Executes artifacts one at a time in the orchestrator's own process.
#[derive(Default)]
pub struct LocalTarget {
    active: AtomicUsize,
}

impl LocalTarget {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "debug", skip(self, artifact, sink), fields(suite = %suite_id))]
    async fn run_one(&self, suite_id: UnitId, artifact: SpecArtifact, sink: Arc<dyn FrameSink>) {
        let Some(suite) = artifact.suite.clone() else {
            warn!("artifact carried no registered suite tree; sandbox initialization failed");
            emit_infrastructure_failure(
                suite_id,
                &sink,
                InfrastructureError::SandboxInitFailed {
                    suite_id: suite_id.to_string(),
                    message: "artifact carried no registered suite tree".to_string(),
                },
            );
            return;
        };

        let ancestry = suite.ancestry.clone();
        let description = suite.name().to_string();
        let only_mode = artifact.only_mode;
        let randomize = artifact.randomize;
        let sink_for_task = Arc::clone(&sink);

        let join_result = tokio::spawn(async move {
            let config = LifecycleConfig {
                suite_id,
                runner_id: LOCAL_RUNNER_ID,
                sink: sink_for_task.as_ref(),
                only_mode,
                randomize,
            };
            let mut ctx = ExecutionContext::default();
            lifecycle::run_suite(&suite, &mut ctx, &config).await;
        })
        .await;

        // On suite completion, `run_suite` itself already emitted the
        // terminal describe action through `sink_for_task`. A panic is
        // the only path that leaves the suite without one -- decorate it
        // into a `VMRuntimeError` and emit that missing terminal action
        // ourselves.
        if let Err(join_error) = join_result {
            if join_error.is_panic() {
                let message = panic_message(join_error.into_panic());
                warn!(%message, "suite panicked inside the sandbox");
                let formatted_stack = artifact
                    .source_map()
                    .map(|_| "<source map present; no captured stack frames to resolve>".to_string());

                sink.send(FramedMessage {
                    kind: FrameKind::Error,
                    suite_id,
                    runner_id: LOCAL_RUNNER_ID,
                    payload: Payload::Error(SuiteErrorPayload {
                        message: message.clone(),
                        format_code: None,
                        stacks: formatted_stack.clone().into_iter().collect(),
                    }),
                });
                sink.send(FramedMessage {
                    kind: FrameKind::Action,
                    suite_id,
                    runner_id: LOCAL_RUNNER_ID,
                    payload: Payload::Action(ActionPayload {
                        scope: EventScope::Describe,
                        action: ActionKind::Failure,
                        errors: vec![ErrorPayload {
                            name: "VMRuntimeError".to_string(),
                            message,
                            stack: None,
                            formatted_stack,
                            location: None,
                            source_map_reference: None,
                        }],
                        ancestry: ancestry.iter().map(|s| s.to_string()).collect(),
                        duration_ms: 0,
                        location: None,
                        description,
                    }),
                });
            }
        }
    }
}

fn emit_infrastructure_failure(suite_id: UnitId, sink: &Arc<dyn FrameSink>, error: InfrastructureError) {
    sink.send(FramedMessage {
        kind: FrameKind::Error,
        suite_id,
        runner_id: LOCAL_RUNNER_ID,
        payload: Payload::Error(SuiteErrorPayload {
            message: error.to_string(),
            format_code: None,
            stacks: vec![],
        }),
    });
    sink.send(FramedMessage {
        kind: FrameKind::Action,
        suite_id,
        runner_id: LOCAL_RUNNER_ID,
        payload: Payload::Action(ActionPayload {
            scope: EventScope::Describe,
            action: ActionKind::Failure,
            errors: vec![ErrorPayload {
                name: "InfrastructureError".to_string(),
                message: error.to_string(),
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

impl Target for LocalTarget {
    async fn init(&self) -> Result<(), XjetError> {
        Ok(())
    }

    async fn execute_suites(
        &self,
        artifacts: HashMap<UnitId, SpecArtifact>,
        sink: Arc<dyn FrameSink>,
        _rerun: bool,
    ) -> Result<(), XjetError> {
        for (suite_id, artifact) in artifacts {
            self.active.fetch_add(1, Ordering::SeqCst);
            self.run_one(suite_id, artifact, Arc::clone(&sink)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn active_task_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "suite panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SuiteDescribe, TestBody, TestCase, TestFlags};
    use std::sync::Mutex;

    fn recording_sink() -> (Arc<dyn FrameSink>, Arc<Mutex<Vec<FramedMessage>>>) {
        let events: Arc<Mutex<Vec<FramedMessage>>> = Arc::default();
        let clone = Arc::clone(&events);
        (lifecycle::sink_from_fn(move |frame| clone.lock().unwrap().push(frame)), events)
    }

    fn passing_suite() -> SuiteDescribe {
        let mut suite = SuiteDescribe::root();
        suite.tests.push(TestCase {
            description: "passes".into(),
            implementation: TestBody::Sync(Box::new(|_cx| Ok(()))),
            parameters: None,
            flags: TestFlags::default(),
            timeout_ms: 1_000,
            ancestry: vec!["passes".into()],
            source_location: None,
        });
        suite
    }

    #[tokio::test]
    async fn runs_a_registered_suite_to_a_terminal_action() {
        let artifact = SpecArtifact::new("code", "{}").with_suite(Arc::new(passing_suite()));
        let mut artifacts = HashMap::new();
        let suite_id = UnitId::new([1; 16]);
        artifacts.insert(suite_id, artifact);

        let target = LocalTarget::new();
        let (sink, events) = recording_sink();
        target.init().await.unwrap();
        target.execute_suites(artifacts, sink, false).await.unwrap();

        let events = events.lock().unwrap();
        let success = events.iter().any(|frame| {
            matches!(&frame.payload, Payload::Action(action)
                if action.scope == EventScope::Describe && action.action == ActionKind::Success)
        });
        assert!(success, "a suite with a passing test must terminate with a successful describe action");
    }

    #[tokio::test]
    async fn missing_suite_tree_is_reported_as_infrastructure_error() {
        let artifact = SpecArtifact::new("code", "{}");
        let mut artifacts = HashMap::new();
        let suite_id = UnitId::new([2; 16]);
        artifacts.insert(suite_id, artifact);

        let target = LocalTarget::new();
        let (sink, events) = recording_sink();
        target.execute_suites(artifacts, sink, false).await.unwrap();

        let events = events.lock().unwrap();
        assert!(
            events.iter().any(|frame| matches!(frame.payload, Payload::Error(_))),
            "an artifact without a registered suite tree must surface as an infrastructure error"
        );
    }

    #[tokio::test]
    async fn active_task_count_returns_to_zero_after_completion() {
        let artifact = SpecArtifact::new("code", "{}").with_suite(Arc::new(passing_suite()));
        let mut artifacts = HashMap::new();
        artifacts.insert(UnitId::new([3; 16]), artifact);

        let target = LocalTarget::new();
        let (sink, _events) = recording_sink();
        target.execute_suites(artifacts, sink, false).await.unwrap();

        assert_eq!(target.active_task_count().await, 0);
    }
}
