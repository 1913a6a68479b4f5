// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reporter interface the core writes to.
//!
//! [`Reporter`] is object-safe so the orchestrator can hold it behind a
//! `Box<dyn Reporter>` without knowing the concrete sink -- a terminal
//! renderer, a structured JSON writer, or (in tests) an in-memory
//! recorder. The reporter is the only cross-suite sink and must tolerate
//! concurrent invocation, typically by serializing internally onto a
//! single output stream; implementations are responsible for that
//! internal serialization, since the trait itself takes `&self`.

use crate::wire::{ActionPayload, LogPayload, StatusPayload, SuiteErrorPayload};
use xjet_metadata::RunSummary;

/// `runner_count` passed to [`Reporter::init`]: `-1` denotes the local
/// (in-process) target.
pub const LOCAL_RUNNER_COUNT: i64 = -1;

/// The sink the [`crate::orchestrator::SuitesService`] and
/// [`crate::lifecycle`] write lifecycle events to.
pub trait Reporter: Send + Sync {
    /// Called once discovery has produced the full suite name list, before
    /// any dispatch begins.
    fn init(&self, suite_names: &[String], runner_count: i64);

    /// A `console.*`-style diagnostic line from a running suite.
    fn log(&self, suite: &str, payload: &LogPayload);

    /// A lifecycle status transition: start/skip/todo/end.
    fn status(&self, suite: &str, payload: &StatusPayload);

    /// A terminal outcome for a test or describe block.
    fn action(&self, suite: &str, payload: &ActionPayload);

    /// An infrastructure-level error not attributable to a single test
    /// (runner disconnect, sandbox init failure, dispatch timeout).
    fn suite_error(&self, suite: &str, payload: &SuiteErrorPayload);

    /// Called once, after every suite has reached a terminal state.
    /// Returns the structured end-of-run report.
    fn finish(&self) -> RunSummary;
}

/// An in-memory [`Reporter`] that records every call verbatim, used by
/// tests asserting the exact event sequence the lifecycle engine
/// requires.
#[derive(Default)]
pub struct RecordingReporter {
    inner: std::sync::Mutex<RecordingReporterState>,
}

#[derive(Default)]
struct RecordingReporterState {
    events: Vec<RecordedEvent>,
    summary: RunSummary,
}

/// One recorded reporter call, in call order.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    Init { suite_names: Vec<String>, runner_count: i64 },
    Log { suite: String, payload: LogPayload },
    Status { suite: String, payload: StatusPayload },
    Action { suite: String, payload: ActionPayload },
    SuiteError { suite: String, payload: SuiteErrorPayload },
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.inner.lock().expect("recording reporter poisoned").events.clone()
    }

    pub fn set_summary(&self, summary: RunSummary) {
        self.inner.lock().expect("recording reporter poisoned").summary = summary;
    }
}

impl Reporter for RecordingReporter {
    fn init(&self, suite_names: &[String], runner_count: i64) {
        self.inner.lock().expect("recording reporter poisoned").events.push(RecordedEvent::Init {
            suite_names: suite_names.to_vec(),
            runner_count,
        });
    }

    fn log(&self, suite: &str, payload: &LogPayload) {
        self.inner.lock().expect("recording reporter poisoned").events.push(RecordedEvent::Log {
            suite: suite.to_string(),
            payload: payload.clone(),
        });
    }

    fn status(&self, suite: &str, payload: &StatusPayload) {
        self.inner.lock().expect("recording reporter poisoned").events.push(RecordedEvent::Status {
            suite: suite.to_string(),
            payload: payload.clone(),
        });
    }

    fn action(&self, suite: &str, payload: &ActionPayload) {
        self.inner.lock().expect("recording reporter poisoned").events.push(RecordedEvent::Action {
            suite: suite.to_string(),
            payload: payload.clone(),
        });
    }

    fn suite_error(&self, suite: &str, payload: &SuiteErrorPayload) {
        self.inner
            .lock()
            .expect("recording reporter poisoned")
            .events
            .push(RecordedEvent::SuiteError {
                suite: suite.to_string(),
                payload: payload.clone(),
            });
    }

    fn finish(&self) -> RunSummary {
        self.inner.lock().expect("recording reporter poisoned").summary.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ActionKind, EventScope};

    #[test]
    fn records_events_in_call_order() {
        let reporter = RecordingReporter::new();
        reporter.init(&["auth".to_string()], LOCAL_RUNNER_COUNT);
        reporter.action(
            "auth",
            &ActionPayload {
                scope: EventScope::Test,
                action: ActionKind::Success,
                errors: vec![],
                ancestry: vec!["auth".to_string()],
                duration_ms: 1,
                location: None,
                description: "logs in".to_string(),
            },
        );
        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RecordedEvent::Init { .. }));
        assert!(matches!(events[1], RecordedEvent::Action { .. }));
    }
}
