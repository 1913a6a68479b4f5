// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The configuration surface the core consumes.
//!
//! `RunConfig` is a plain, serde-`Deserialize`-able struct covering every
//! field the core needs. No file-watching or merging logic lives here --
//! that is the config-file loader's job -- but this struct is the seam
//! it would populate.

use serde::{Deserialize, Serialize};

/// `build.{target, external, platform, packages}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    pub target: Option<String>,
    #[serde(default)]
    pub external: Vec<String>,
    pub platform: Option<String>,
    #[serde(default)]
    pub packages: Vec<String>,
}

/// One entry of `testRunners`: presence of a non-empty list selects
/// [`crate::target::ExternalTarget`] over [`crate::target::LocalTarget`]
/// in the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub id: String,
    pub concurrency: u32,
    /// Milliseconds before a `dispatch` call without a terminal action is
    /// considered failed.
    pub dispatch_timeout_ms: u64,
    /// Milliseconds before an unanswered `connection()` call marks this
    /// runner unavailable.
    pub connection_timeout_ms: u64,
}

/// Every configuration field the core consumes, independent of how a
/// CLI or config file produced it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Include globs, per the glob contract's `files` field.
    #[serde(default)]
    pub files: Vec<String>,
    /// Suite-name whitelist.
    #[serde(default)]
    pub suites: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Default per-test/hook timeout in milliseconds, overridden per
    /// `TestCase`/`HookModel` when one is supplied explicitly.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Stop dispatching further suites after the first failure.
    #[serde(default)]
    pub bail: bool,
    #[serde(default)]
    pub watch: bool,
    #[serde(default)]
    pub randomize: bool,
    /// Regex strings composing the `filter` set: `^filter$` matches
    /// select `only` on each registered test.
    #[serde(default)]
    pub filter: Vec<String>,
    /// Overall suite-level concurrency used when no `testRunners` is
    /// configured (the `LocalTarget` still executes suites one at a time,
    /// but `parallel` governs how many suites the orchestrator keeps in
    /// flight awaiting dispatch).
    #[serde(default = "default_parallel")]
    pub parallel: u32,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub build: BuildConfig,
    /// Non-empty => `ExternalTarget`.
    #[serde(default)]
    pub test_runners: Vec<RunnerConfig>,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_parallel() -> u32 {
    1
}

impl RunConfig {
    /// True iff the configured runner pool selects
    /// [`crate::target::ExternalTarget`] over
    /// [`crate::target::LocalTarget`].
    pub fn uses_external_target(&self) -> bool {
        !self.test_runners.is_empty()
    }

    /// Compiles `filter` into a single alternation regex, or `None` if no
    /// filter was configured.
    pub fn compiled_filter(&self) -> Result<Option<regex::Regex>, regex::Error> {
        if self.filter.is_empty() {
            return Ok(None);
        }
        let pattern = self.filter.join("|");
        Ok(Some(regex::Regex::new(&pattern)?))
    }
}
