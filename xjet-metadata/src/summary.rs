// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

/// The terminal outcome of one [`TestCase`](xjet_core) as recorded in a
/// [`RunSummary`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// The test body ran and completed without error.
    Success,
    /// The test body threw, timed out, or a hook failed around it.
    Failure,
    /// `flags.skip` was set, or `onlyMode` excluded this test.
    Skipped,
    /// `flags.todo` was set (no implementation provided).
    Todo,
}

/// One test's contribution to a [`SuiteSummary`].
///
/// Mirrors the shape of `nextest_metadata`'s per-test JSON records: a flat,
/// serde-friendly struct suitable for archiving as CI output, independent
/// of the live event stream that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestSummary {
    /// Dot-joined ancestry, e.g. `"auth::login::rejects bad password"`.
    pub full_name: SmolStr,
    pub outcome: TestOutcome,
    #[serde(with = "humantime_duration")]
    pub duration: Duration,
    /// Populated only when `outcome == Failure`.
    pub errors: Vec<String>,
}

/// One suite's contribution to a [`RunSummary`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub suite_id: SmolStr,
    pub source_file: Option<Utf8PathBuf>,
    pub tests: Vec<TestSummary>,
    /// Set when the suite terminated via `suiteError` rather than an
    /// ordinary describe-level `action`.
    pub infrastructure_error: Option<String>,
}

/// The end-of-run report handed back by `Reporter::finish`.
///
/// A single ephemeral report, not persisted baseline storage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub suites: Vec<SuiteSummary>,
}

impl RunSummary {
    pub fn push_suite(&mut self, suite: SuiteSummary) {
        self.suites.push(suite);
    }

    /// Total count of tests in the `Failure` outcome across every suite.
    pub fn failed_count(&self) -> usize {
        self.suites
            .iter()
            .flat_map(|s| &s.tests)
            .filter(|t| matches!(t.outcome, TestOutcome::Failure))
            .count()
    }

    /// True iff this run should produce exit code
    /// [`XjetExitCode::TEST_RUN_FAILED`](crate::XjetExitCode::TEST_RUN_FAILED).
    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0 || self.suites.iter().any(|s| s.infrastructure_error.is_some())
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary() -> RunSummary {
        RunSummary {
            suites: vec![SuiteSummary {
                suite_id: "auth".into(),
                source_file: Some("tests/auth.spec.ts".into()),
                tests: vec![
                    TestSummary {
                        full_name: "auth::login".into(),
                        outcome: TestOutcome::Success,
                        duration: Duration::from_millis(12),
                        errors: vec![],
                    },
                    TestSummary {
                        full_name: "auth::logout".into(),
                        outcome: TestOutcome::Failure,
                        duration: Duration::from_millis(3),
                        errors: vec!["assertion failed".to_string()],
                    },
                ],
                infrastructure_error: None,
            }],
        }
    }

    #[test]
    fn has_failures_true_when_any_test_failed() {
        assert!(sample_summary().has_failures());
    }

    #[test]
    fn has_failures_false_for_all_green_suite() {
        let mut summary = sample_summary();
        summary.suites[0].tests.retain(|t| matches!(t.outcome, TestOutcome::Success));
        assert!(!summary.has_failures());
    }

    #[test]
    fn has_failures_true_on_infrastructure_error_alone() {
        let mut summary = RunSummary::default();
        summary.push_suite(SuiteSummary {
            suite_id: "billing".into(),
            source_file: None,
            tests: vec![],
            infrastructure_error: Some("runner disconnected".to_string()),
        });
        assert!(summary.has_failures());
    }

    #[test]
    fn serializes_round_trip_through_json() {
        let summary = sample_summary();
        let json = serde_json::to_string(&summary).unwrap();
        let back: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.failed_count(), summary.failed_count());
    }
}
