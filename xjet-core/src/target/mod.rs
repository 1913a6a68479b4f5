// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatch target abstraction: a uniform interface the orchestrator
//! drives, implemented by an in-process [`local::LocalTarget`] sandbox and
//! a multi-runner [`external::ExternalTarget`]. Both must deliver the same
//! event stream shape to whatever [`FrameSink`] the orchestrator hands
//! them.

pub mod external;
pub mod local;

use crate::lifecycle::FrameSink;
use crate::model::{SpecArtifact, UnitId};
use crate::XjetError;
use std::collections::HashMap;
use std::sync::Arc;

/// A dispatch target consumed by [`crate::orchestrator::SuitesService`].
pub trait Target: Send + Sync {
    /// Acquires runner handles / opens event streams.
    async fn init(&self) -> Result<(), XjetError>;

    /// Runs every artifact, completing once every suite has emitted its
    /// terminal describe-action event. `rerun` distinguishes a fresh
    /// dispatch from a watch-mode re-dispatch of previously seen suites;
    /// both targets treat the two identically today, but the flag is
    /// threaded through so a future target (e.g. one that diffs against a
    /// prior run) can tell them apart without a signature change.
    async fn execute_suites(
        &self,
        artifacts: HashMap<UnitId, SpecArtifact>,
        sink: Arc<dyn FrameSink>,
        rerun: bool,
    ) -> Result<(), XjetError>;

    /// Introspection for the watch loop.
    async fn active_task_count(&self) -> usize;
}
