// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The core data model: `SuiteDescribe`, `TestCase`, `HookModel`,
//! `ExecutionContext`, `SpecArtifact`, and the framed wire unit's id type.

use crate::errors::XjetError;
use serde_json::Value;
use smol_str::SmolStr;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A fixed-width opaque identifier used for both suite ids and runner ids
/// on the wire, resolved at 16 bytes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct UnitId(pub [u8; 16]);

impl UnitId {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(*uuid.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Debug for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A resolved `file:line:column` a registration directive was called from,
/// threaded through for stack decoration and error reporting.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceLocation {
    pub file: SmolStr,
    pub line: u32,
    pub column: u32,
}

/// The merge-only flag set on a [`TestCase`] or [`SuiteDescribe`].
///
/// `skip`/`only` are OR-assigned from parent to child and never cleared;
/// `todo`/`failing` cannot coexist with `skip` (this is enforced at chain
/// time in `directive::builder`, not here -- by the time a `TestFlags`
/// reaches a `TestCase` it is already known-valid).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TestFlags {
    pub skip: bool,
    pub only: bool,
    pub todo: bool,
    pub failing: bool,
}

impl TestFlags {
    /// OR-merges `child` on top of `self`'s inherited ancestry; the merge
    /// is idempotent, so re-applying it is always safe.
    pub fn inherit(self, child: TestFlags) -> TestFlags {
        TestFlags {
            skip: self.skip || child.skip,
            only: self.only || child.only,
            todo: child.todo,
            failing: child.failing,
        }
    }
}

/// The merge-only flag set on a [`SuiteDescribe`] (only `skip`/`only`
/// apply to describes; `todo`/`failing` are test-only).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SuiteFlags {
    pub skip: bool,
    pub only: bool,
}

/// The tagged sum replacing arity-based callback inference: a test body
/// can be promise-returning, callback-style, or plain synchronous.
pub enum TestBody {
    /// Runs synchronously; any panic/error is caught by the caller.
    Sync(Box<dyn Fn(&mut crate::lifecycle::Context) -> Result<(), XjetError> + Send + Sync>),
    /// Returns a future that resolves or rejects.
    Async(
        Arc<
            dyn Fn(
                    &mut crate::lifecycle::Context,
                ) -> Pin<Box<dyn Future<Output = Result<(), XjetError>> + Send>>
                + Send
                + Sync,
        >,
    ),
    /// Declares a `done` callback; completion is signalled by invoking it.
    Callback(
        Arc<
            dyn Fn(&mut crate::lifecycle::Context, crate::lifecycle::DoneCallback) + Send + Sync,
        >,
    ),
    /// `test("description")` with no body: auto-sets `flags.todo = true`.
    Todo,
}

impl std::fmt::Debug for TestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            TestBody::Sync(_) => "Sync",
            TestBody::Async(_) => "Async",
            TestBody::Callback(_) => "Callback",
            TestBody::Todo => "Todo",
        };
        f.debug_tuple("TestBody").field(&kind).finish()
    }
}

/// One declared unit of behavior.
#[derive(Debug)]
pub struct TestCase {
    pub description: SmolStr,
    pub implementation: TestBody,
    /// The parameter bundle bound from `.each`, if any; `None` for a
    /// plain (non-parameterized) test.
    pub parameters: Option<Value>,
    pub flags: TestFlags,
    pub timeout_ms: u64,
    pub ancestry: Vec<SmolStr>,
    pub source_location: Option<SourceLocation>,
}

/// The lifecycle point a [`HookModel`] runs at.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HookKind {
    BeforeAll,
    BeforeEach,
    AfterAll,
    AfterEach,
}

/// A side-effecting function run at a well-defined lifecycle point.
/// `beforeEach`/`afterEach` hooks are cloned down the ancestry as an
/// immutable snapshot at registration time -- later parent additions do
/// not propagate.
pub struct HookModel {
    pub kind: HookKind,
    pub callback: TestBody,
    pub timeout_ms: u64,
    pub source_location: Option<SourceLocation>,
}

impl std::fmt::Debug for HookModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookModel")
            .field("kind", &self.kind)
            .field("timeout_ms", &self.timeout_ms)
            .field("source_location", &self.source_location)
            .finish()
    }
}

impl Clone for HookModel {
    fn clone(&self) -> Self {
        // `TestBody` closures are themselves `Arc`/`Box`-wrapped; cloning
        // a hook clones the description, not a fresh callback, so the
        // underlying callback is wrapped once more in an `Arc` at
        // registration time by callers that need to clone hooks (see
        // `directive::builder`'s describe-time snapshot). `Box<dyn Fn>`
        // variants (`Sync`) are not `Clone`, so cloning a `Sync` hook
        // panics -- in practice only `beforeEach`/`afterEach` hooks are
        // ever snapshotted, and callers register those as `Async` or
        // `Callback` variants, which are `Arc`-backed and clone cheaply.
        let callback = match &self.callback {
            TestBody::Async(f) => TestBody::Async(Arc::clone(f)),
            TestBody::Callback(f) => TestBody::Callback(Arc::clone(f)),
            TestBody::Todo => TestBody::Todo,
            TestBody::Sync(_) => {
                panic!("Sync hooks cannot be snapshotted down the ancestry; register beforeEach/afterEach as async or callback bodies")
            }
        };
        Self {
            kind: self.kind,
            callback,
            timeout_ms: self.timeout_ms,
            source_location: self.source_location.clone(),
        }
    }
}

/// A named container with nested describes and tests.
#[derive(Debug, Default)]
pub struct SuiteDescribe {
    pub ancestry: Vec<SmolStr>,
    pub before_all: Vec<HookModel>,
    pub before_each: Vec<HookModel>,
    pub after_all: Vec<HookModel>,
    pub after_each: Vec<HookModel>,
    pub children: Vec<SuiteDescribe>,
    pub tests: Vec<TestCase>,
    pub flags: SuiteFlags,
}

impl SuiteDescribe {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        self.ancestry.last().map(|s| s.as_str()).unwrap_or("<root>")
    }
}

/// Created per root-suite run; mutated by hook error recording and passed
/// by reference down the recursion.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub before_all_errors: Vec<XjetError>,
    pub after_all_errors: Vec<XjetError>,
    /// Threaded-through run-wide settings carried on the context rather
    /// than a global mutable record.
    pub filter: Option<regex::Regex>,
    pub randomize: bool,
}

/// Produced by the transpiler, consumed by targets.
///
/// `code`/`source_map_json` are the bytes an [`ExternalTarget`](crate::target::external::ExternalTarget)
/// forwards to a remote runner untouched. `suite` is the Rust-native
/// counterpart a [`LocalTarget`](crate::target::local::LocalTarget) runs
/// directly: since the transpiler is an external collaborator treated as
/// a pure function producing opaque bundled code, and this is a Rust
/// reimplementation rather than a JS-in-a-VM one, the orchestrator
/// attaches the already-registered suite tree here instead of asking
/// `LocalTarget` to interpret `code` as a scripting language.
#[derive(Clone)]
pub struct SpecArtifact {
    pub code: String,
    pub source_map_json: String,
    pub suite: Option<Arc<SuiteDescribe>>,
    /// The run-wide `onlyMode`/`randomize` bits this artifact's suite tree
    /// was registered under, threaded here since a
    /// [`LocalTarget`](crate::target::local::LocalTarget)
    /// builds a fresh [`crate::lifecycle::LifecycleConfig`] per artifact
    /// rather than sharing one across the whole run.
    pub only_mode: bool,
    pub randomize: bool,
    parsed_source_map: Arc<Option<sourcemap::SourceMap>>,
}

impl SpecArtifact {
    pub fn new(code: impl Into<String>, source_map_json: impl Into<String>) -> Self {
        let source_map_json = source_map_json.into();
        let parsed = sourcemap::SourceMap::from_slice(source_map_json.as_bytes()).ok();
        Self {
            code: code.into(),
            source_map_json,
            suite: None,
            only_mode: false,
            randomize: false,
            parsed_source_map: Arc::new(parsed),
        }
    }

    pub fn with_suite(mut self, suite: Arc<SuiteDescribe>) -> Self {
        self.suite = Some(suite);
        self
    }

    pub fn with_run_flags(mut self, only_mode: bool, randomize: bool) -> Self {
        self.only_mode = only_mode;
        self.randomize = randomize;
        self
    }

    pub fn source_map(&self) -> Option<&sourcemap::SourceMap> {
        self.parsed_source_map.as_ref().as_ref()
    }
}

impl std::fmt::Debug for SpecArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecArtifact")
            .field("code_len", &self.code.len())
            .field("has_source_map", &self.parsed_source_map.is_some())
            .finish()
    }
}

/// Duration helper shared by the lifecycle engine and the queue.
pub fn duration_from_millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
