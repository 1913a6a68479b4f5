// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The orchestrator: discovery -> transpile -> dispatch -> watch loop.
//!
//! Discovery (file globbing) and transpilation are external collaborators:
//! this module accepts already-globbed file paths and already-transpiled
//! [`SpecArtifact`]s, and owns the part that is actually "core" --
//! picking a [`Target`], dispatching to it, decoding its framed event
//! stream through a [`MessageHandler`], and feeding a [`Reporter`].

use crate::config::RunConfig;
use crate::glob;
use crate::lifecycle::FrameSink;
use crate::model::{SpecArtifact, UnitId};
use crate::reporter::{Reporter, LOCAL_RUNNER_COUNT};
use crate::target::{local::LocalTarget, Target};
use crate::wire::{FramedMessage, Payload};
use crate::XjetError;
use std::collections::HashMap;
use std::sync::Arc;
use xjet_metadata::{RunSummary, SuiteSummary, TestOutcome, TestSummary};

/// Decodes framed events and fans them out to a [`Reporter`].
///
/// Owns a `suiteId -> pending-state` map in spirit; here that "pending
/// state" is the per-suite [`SuiteSummary`] being accumulated for the
/// final [`RunSummary`], since this is the one piece of state the
/// decoder needs to carry across frames for the same suite.
pub struct MessageHandler {
    reporter: Arc<dyn Reporter>,
    suite_names: HashMap<UnitId, String>,
    pending: std::sync::Mutex<HashMap<UnitId, SuiteSummary>>,
}

impl MessageHandler {
    pub fn new(reporter: Arc<dyn Reporter>, suite_names: HashMap<UnitId, String>) -> Self {
        Self {
            reporter,
            suite_names,
            pending: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn suite_name(&self, suite_id: UnitId) -> String {
        self.suite_names.get(&suite_id).cloned().unwrap_or_else(|| suite_id.to_string())
    }

    fn summary_for(&self, suite_id: UnitId) -> SuiteSummary {
        SuiteSummary {
            suite_id: self.suite_name(suite_id).into(),
            source_file: None,
            tests: vec![],
            infrastructure_error: None,
        }
    }

    /// Dispatches one decoded frame to the reporter.
    pub fn handle(&self, frame: &FramedMessage) {
        let suite = self.suite_name(frame.suite_id);
        match &frame.payload {
            Payload::Log(payload) => self.reporter.log(&suite, payload),
            Payload::Status(payload) => self.reporter.status(&suite, payload),
            Payload::Action(payload) => {
                self.reporter.action(&suite, payload);
                self.record_action(frame.suite_id, payload);
            }
            Payload::Error(payload) => {
                self.reporter.suite_error(&suite, payload);
                let mut pending = self.pending.lock().expect("message handler poisoned");
                let entry = pending.entry(frame.suite_id).or_insert_with(|| self.summary_for(frame.suite_id));
                entry.infrastructure_error = Some(payload.message.clone());
            }
        }
    }

    fn record_action(&self, suite_id: UnitId, payload: &crate::wire::ActionPayload) {
        use crate::wire::{ActionKind, EventScope};
        if payload.scope != EventScope::Test {
            return;
        }
        let outcome = match payload.action {
            ActionKind::Success => TestOutcome::Success,
            ActionKind::Failure => TestOutcome::Failure,
        };
        let mut pending = self.pending.lock().expect("message handler poisoned");
        let entry = pending.entry(suite_id).or_insert_with(|| self.summary_for(suite_id));
        entry.tests.push(TestSummary {
            full_name: payload.ancestry.join("::").into(),
            outcome,
            duration: std::time::Duration::from_millis(payload.duration_ms),
            errors: payload.errors.iter().map(|e| e.message.clone()).collect(),
        });
    }

    /// Folds every suite's accumulated state into a [`RunSummary`].
    pub fn finish(&self) -> RunSummary {
        let pending = self.pending.lock().expect("message handler poisoned");
        RunSummary {
            suites: pending.values().cloned().collect(),
        }
    }
}

impl FrameSink for MessageHandler {
    fn send(&self, frame: FramedMessage) {
        self.handle(&frame);
    }
}

/// Drives discovery -> transpile -> dispatch -> watch for one run.
/// Generic over the [`Target`] implementation so callers can swap
/// [`LocalTarget`] for an `ExternalTarget` without this type changing.
pub struct SuitesService<T: Target> {
    config: RunConfig,
    target: T,
}

impl SuitesService<LocalTarget> {
    /// Convenience constructor selecting [`LocalTarget`], used when
    /// `config.test_runners` is empty.
    pub fn local(config: RunConfig) -> Self {
        Self {
            config,
            target: LocalTarget::new(),
        }
    }
}

impl<T: Target> SuitesService<T> {
    pub fn new(config: RunConfig, target: T) -> Self {
        Self { config, target }
    }

    /// Filters `paths` by `config.files`/`config.exclude`'s glob contract,
    /// returning only the paths that should be discovered.
    pub fn filter_paths(&self, paths: &[String]) -> Result<Vec<String>, glob::GlobError> {
        let includes: Vec<_> = self.config.files.iter().map(|p| glob::compile(p)).collect::<Result<_, _>>()?;
        let excludes: Vec<_> = self.config.exclude.iter().map(|p| glob::compile(p)).collect::<Result<_, _>>()?;

        Ok(paths
            .iter()
            .filter(|path| includes.is_empty() || includes.iter().any(|re| re.is_match(path)))
            .filter(|path| !excludes.iter().any(|re| re.is_match(path)))
            .cloned()
            .collect())
    }

    /// Dispatches `artifacts` (already transpiled) to the target and
    /// returns the folded-down [`RunSummary`] once every suite has
    /// reached a terminal state.
    pub async fn run(
        &self,
        artifacts: HashMap<UnitId, SpecArtifact>,
        suite_names: HashMap<UnitId, String>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<RunSummary, XjetError> {
        let names: Vec<String> = suite_names.values().cloned().collect();
        let runner_count = if self.config.uses_external_target() {
            self.config.test_runners.len() as i64
        } else {
            LOCAL_RUNNER_COUNT
        };
        reporter.init(&names, runner_count);

        let handler = Arc::new(MessageHandler::new(Arc::clone(&reporter), suite_names));
        self.target.init().await?;

        let mut remaining = artifacts;
        if self.config.bail {
            // Bail-out mode: dispatch suites one at a time, stopping after
            // the first describe-level failure.
            let mut summary = RunSummary::default();
            let ids: Vec<UnitId> = remaining.keys().copied().collect();
            for id in ids {
                let Some(artifact) = remaining.remove(&id) else { continue };
                let mut one = HashMap::new();
                one.insert(id, artifact);
                self.target.execute_suites(one, handler.clone(), false).await?;
                let partial = handler.finish();
                let failed = partial.has_failures();
                summary = partial;
                if failed {
                    break;
                }
            }
            reporter.finish();
            return Ok(summary);
        }

        self.target.execute_suites(remaining, handler.clone(), false).await?;
        let summary = handler.finish();
        reporter.finish();
        Ok(summary)
    }

    /// Re-triggers discovery/dispatch for `changed` paths (the `watch`
    /// config option). The actual filesystem-watching implementation is
    /// an external collaborator; this just re-runs `run` for whichever
    /// artifacts the caller supplies for the changed paths.
    pub async fn watch(
        &self,
        mut changed: impl futures::Stream<Item = HashMap<UnitId, SpecArtifact>> + Unpin,
        suite_names: HashMap<UnitId, String>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<(), XjetError> {
        use futures::StreamExt;
        while let Some(artifacts) = changed.next().await {
            self.run(artifacts, suite_names.clone(), Arc::clone(&reporter)).await?;
        }
        Ok(())
    }
}
