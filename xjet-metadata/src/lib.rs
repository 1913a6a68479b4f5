// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured, serde-friendly types shared between the xjet execution
//! engine and anything outside its process: exit codes, the wire frame
//! type tags, and the end-of-run summary schema.

mod exit_codes;
mod frame_kind;
mod summary;

pub use exit_codes::XjetExitCode;
pub use frame_kind::FrameKind;
pub use summary::{RunSummary, SuiteSummary, TestOutcome, TestSummary};
