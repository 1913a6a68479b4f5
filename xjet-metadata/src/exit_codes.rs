// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `xjet` process runs.
///
/// Only the 0/1 boundary is load-bearing (every suite succeeded vs. at
/// least one failure or suite error); the codes beyond that follow the
/// taxonomy a real CLI front end needs to distinguish build/setup/
/// infrastructure failures from test failures.
///
/// Unknown/unexpected failures always fall back to exit code 1.
pub enum XjetExitCode {}

impl XjetExitCode {
    /// Every suite completed with `action(SUCCESS)` at the root level.
    pub const OK: i32 = 0;

    /// At least one `action(FAILURE)` or `suiteError` was emitted.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// No tests were discovered, but no other error occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// The transpiler returned a build error; the run was short-circuited.
    pub const BUILD_FAILED: i32 = 101;

    /// A user issue happened while setting up an xjet invocation
    /// (malformed config, conflicting CLI flags).
    pub const SETUP_ERROR: i32 = 96;

    /// An `ExternalTarget` runner failed to connect and the run could not
    /// proceed for at least one runner (surfaced per-suite as
    /// `suiteError`, but a fully-unreachable runner pool short-circuits
    /// the whole invocation with this code).
    pub const INFRASTRUCTURE_ERROR: i32 = 70;
}
