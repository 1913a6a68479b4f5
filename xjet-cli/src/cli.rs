// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The CLI argument surface: a thin `clap` front end over
//! [`xjet_core::config::RunConfig`].
//!
//! Config-file loading and merging is an external collaborator; this
//! only covers the CLI-flag half of `RunConfig`.

use clap::Parser;
use xjet_core::config::{BuildConfig, RunConfig};

/// Run xjet's test suites.
#[derive(Parser, Debug)]
#[command(name = "xjet", author, version, about)]
pub struct XjetArgs {
    /// Include globs. Defaults to every `*.spec.*` file under the
    /// current directory if none are given.
    #[arg(long = "file", value_name = "GLOB")]
    pub files: Vec<String>,

    /// Suite-name whitelist.
    #[arg(long = "suite", value_name = "NAME")]
    pub suites: Vec<String>,

    /// Exclude globs.
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Default per-test/hook timeout, in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub timeout: u64,

    /// Stop dispatching further suites after the first failure.
    #[arg(long)]
    pub bail: bool,

    /// Re-run on file changes (filesystem watching itself is an external
    /// collaborator; this only toggles the orchestrator's watch loop).
    #[arg(long)]
    pub watch: bool,

    /// Shuffle each suite's direct tests with Fisher-Yates before running.
    #[arg(long)]
    pub randomize: bool,

    /// Regex patterns composing the runtime `filter` set.
    #[arg(long = "filter", value_name = "REGEX")]
    pub filter: Vec<String>,

    /// How many suites the orchestrator keeps in flight awaiting
    /// dispatch.
    #[arg(long, default_value_t = 1)]
    pub parallel: u32,

    #[arg(long)]
    pub silent: bool,

    /// esbuild-style target, e.g. `es2022` (forwarded to the transpiler,
    /// which is an external collaborator -- this crate never inspects
    /// it).
    #[arg(long = "build-target")]
    pub build_target: Option<String>,
}

impl From<XjetArgs> for RunConfig {
    fn from(args: XjetArgs) -> Self {
        RunConfig {
            files: args.files,
            suites: args.suites,
            exclude: args.exclude,
            timeout_ms: args.timeout,
            bail: args.bail,
            watch: args.watch,
            randomize: args.randomize,
            filter: args.filter,
            parallel: args.parallel.max(1),
            silent: args.silent,
            build: BuildConfig {
                target: args.build_target,
                ..Default::default()
            },
            test_runners: vec![],
        }
    }
}
