// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by xjet.
//!
//! Each error kind is a dedicated leaf type, composed into [`XjetError`]
//! as a handful of top-level enums.

use crate::model::SourceLocation;
use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Raised when `describe`/`test` is invoked while a `TestCase` is
/// currently running.
#[derive(Clone, Debug, Error, Diagnostic)]
#[error("cannot register `{attempted}` while `{running}` is executing")]
pub struct NestingError {
    pub attempted: &'static str,
    pub running: String,
}

/// Raised at modifier-chain time for an incompatible flag combination,
/// e.g. `{skip, only}`, `{skip, todo}`, or `{skip, failing}`.
#[derive(Clone, Debug, Error, Diagnostic)]
#[error("conflicting test modifiers: `{a}` and `{b}` cannot both be set")]
pub struct FlagConflictError {
    pub a: &'static str,
    pub b: &'static str,
}

/// Raised by `.each` tagged-template expansion when the input length is
/// not a multiple of the heading count.
#[derive(Clone, Debug, Error, Diagnostic)]
#[error(
    "tagged-template `.each` row shape mismatch: {value_count} values do not divide evenly \
     into {heading_count} headings ({headings:?})"
)]
pub struct TemplateShapeError {
    pub heading_count: usize,
    pub value_count: usize,
    pub headings: Vec<String>,
}

/// A test or hook did not complete within its configured timeout.
#[derive(Clone, Debug, Error)]
#[error("timed out after {duration:?} in {context_label}")]
pub struct TimeoutError {
    pub duration: Duration,
    pub location: Option<SourceLocation>,
    pub context_label: String,
}

/// A test marked `failing` completed without throwing.
#[derive(Clone, Debug, Error)]
#[error("test marked as failing unexpectedly passed")]
pub struct FailingPassedError;

/// The local sandbox's suite execution raised an uncaught error, decorated
/// with the artifact's source map.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct VmRuntimeError {
    pub message: String,
    pub formatted_stack: Option<String>,
}

/// A remote runner became unreachable: connection timeout, dispatch
/// timeout, or disconnect mid-run.
#[derive(Clone, Debug, Error)]
pub enum InfrastructureError {
    #[error("runner `{runner_id}` did not connect within the configured timeout")]
    ConnectionTimeout { runner_id: String },
    #[error("runner `{runner_id}` timed out dispatching suite `{suite_id}`")]
    DispatchTimeout { runner_id: String, suite_id: String },
    #[error("runner `{runner_id}` disconnected mid-run")]
    Disconnected { runner_id: String },
    #[error("sandbox initialization failed for suite `{suite_id}`: {message}")]
    SandboxInitFailed { suite_id: String, message: String },
}

/// The top-level error enum returned by fallible public operations.
///
/// Framework-internal bugs are deliberately *not* a variant here: they
/// are expected to panic and bubble to the
/// orchestrator's top-level `catch_unwind`/`JoinHandle` rather than being
/// folded into user-facing error reporting.
#[derive(Debug, Error, Diagnostic)]
pub enum XjetError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Nesting(#[from] NestingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FlagConflict(#[from] FlagConflictError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    TemplateShape(#[from] TemplateShapeError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    FailingPassed(#[from] FailingPassedError),

    #[error(transparent)]
    VmRuntime(#[from] VmRuntimeError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    /// A user test body threw or rejected; this is the catch-all for
    /// arbitrary error values surfaced by the host language bridge.
    #[error("{message}")]
    TestFailure {
        message: String,
        stack: Option<String>,
    },
}

impl XjetError {
    pub fn test_failure(message: impl Into<String>) -> Self {
        Self::TestFailure {
            message: message.into(),
            stack: None,
        }
    }
}
