// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The lifecycle execution engine: hook ordering, skip/only/todo/failing
//! decisions, timeout enforcement, and framed event emission.

use crate::errors::{FailingPassedError, TimeoutError, XjetError};
use crate::model::{ExecutionContext, HookModel, SourceLocation, SuiteDescribe, TestBody, TestCase, UnitId};
use crate::wire::{
    self, ActionKind, ActionPayload, EventScope, FramedMessage, Payload, StatusKind, StatusPayload,
};
use rand::seq::SliceRandom;
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Explicit first parameter threaded through hooks and test bodies,
/// replacing dynamic `this`/context binding.
pub struct Context {
    pub description: SmolStr,
    pub ancestry: Vec<SmolStr>,
    cancellation: CancellationToken,
}

impl Context {
    pub fn new(description: SmolStr, ancestry: Vec<SmolStr>, cancellation: CancellationToken) -> Self {
        Self {
            description,
            ancestry,
            cancellation,
        }
    }

    /// Threaded cooperative-cancellation handle: bodies that can check
    /// this cheaply should bail out promptly once a timeout abandons
    /// them.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// The callback-style completion signal: resolves the awaited future
/// with `Ok(())` when called with no argument, `Err` when called with
/// one.
pub struct DoneCallback {
    sender: Option<tokio::sync::oneshot::Sender<Result<(), XjetError>>>,
}

impl DoneCallback {
    pub(crate) fn new(sender: tokio::sync::oneshot::Sender<Result<(), XjetError>>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn call(mut self, error: Option<XjetError>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(match error {
                Some(e) => Err(e),
                None => Ok(()),
            });
        }
    }
}

/// Where framed events are sent. Both [`crate::target::LocalTarget`] and
/// unit tests implement this to observe the exact event sequence the
/// engine produces.
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: FramedMessage);
}

/// Everything `run_suite` needs that is constant for the whole run.
pub struct LifecycleConfig<'a> {
    pub suite_id: UnitId,
    pub runner_id: UnitId,
    pub sink: &'a dyn FrameSink,
    pub only_mode: bool,
    pub randomize: bool,
}

/// Runs a root (or nested) [`SuiteDescribe`] to completion.
///
/// On the way out, `ctx.before_all_errors`/`after_all_errors` are restored
/// to their pre-call state: "these errors belong to this describe, not
/// its siblings."
#[instrument(level = "debug", skip(suite, ctx, config), fields(suite = suite.name()))]
pub async fn run_suite(
    suite: &SuiteDescribe,
    ctx: &mut ExecutionContext,
    config: &LifecycleConfig<'_>,
) {
    debug!(skip = suite.flags.skip, tests = suite.tests.len(), children = suite.children.len(), "running suite");
    let saved_before_all_errors = std::mem::take(&mut ctx.before_all_errors);
    let saved_after_all_errors = std::mem::take(&mut ctx.after_all_errors);

    emit_status(
        config,
        EventScope::Describe,
        if suite.flags.skip {
            StatusKind::Skip
        } else {
            StatusKind::Start
        },
        &suite.ancestry,
        suite.name(),
    );

    // `flags.skip` only gates this describe's own hooks: a `TestCase`
    // nested under a skipped ancestor still carries its own inherited
    // `skip` flag (set at registration time), so it must still be walked
    // here to emit its required status/action -- never silently dropped.
    if !suite.flags.skip && ctx.before_all_errors.is_empty() {
        for hook in &suite.before_all {
            if let Err(error) = run_hook(hook, suite, config).await {
                ctx.before_all_errors.push(error);
            }
        }
    }

    let mut tests: Vec<&TestCase> = suite.tests.iter().collect();
    if config.randomize {
        tests.shuffle(&mut rand::rng());
    }
    for test in tests {
        run_test(test, suite, ctx, config).await;
    }

    for child in &suite.children {
        Box::pin(run_suite(child, ctx, config)).await;
    }

    if !suite.flags.skip {
        for hook in &suite.after_all {
            if let Err(error) = run_hook(hook, suite, config).await {
                ctx.after_all_errors.push(error);
            }
        }
    }

    let action = if ctx.after_all_errors.is_empty() {
        ActionKind::Success
    } else {
        ActionKind::Failure
    };
    emit_action(
        config,
        EventScope::Describe,
        action,
        &suite.ancestry,
        suite.name(),
        Duration::ZERO,
        &ctx.after_all_errors,
        None,
    );

    ctx.before_all_errors = saved_before_all_errors;
    ctx.after_all_errors = saved_after_all_errors;
}

/// Per-`TestCase` execution protocol.
#[instrument(level = "debug", skip(test, suite, ctx, config), fields(test = %test.description))]
async fn run_test(
    test: &TestCase,
    suite: &SuiteDescribe,
    ctx: &mut ExecutionContext,
    config: &LifecycleConfig<'_>,
) {
    debug!("running test");
    emit_status(
        config,
        EventScope::Test,
        StatusKind::Start,
        &test.ancestry,
        &test.description,
    );

    if !ctx.before_all_errors.is_empty() {
        emit_action(
            config,
            EventScope::Test,
            ActionKind::Failure,
            &test.ancestry,
            &test.description,
            Duration::ZERO,
            &ctx.before_all_errors,
            test.source_location.clone(),
        );
        return;
    }

    // Skip decision, first match wins.
    if config.only_mode && !test.flags.only {
        emit_status(config, EventScope::Test, StatusKind::Skip, &test.ancestry, &test.description);
        return;
    }
    if test.flags.todo {
        emit_status(config, EventScope::Test, StatusKind::Todo, &test.ancestry, &test.description);
        return;
    }
    if test.flags.skip {
        emit_status(config, EventScope::Test, StatusKind::Skip, &test.ancestry, &test.description);
        return;
    }

    let started = Instant::now();
    let cancellation = CancellationToken::new();

    let before_each_result = run_each_hooks(&suite_before_each(suite, ctx), test, &cancellation, config).await;

    let mut outcome = match before_each_result {
        Err(error) => Err(error),
        Ok(()) => run_body(test, &cancellation).await,
    };

    // afterEach runs regardless of whether beforeEach/body succeeded, in
    // reverse of beforeEach (innermost first): the hooks are already
    // stored outermost-first, so `after_each` reverses that order.
    run_each_hooks_reverse(&suite_after_each(suite, ctx), test, &cancellation, config).await;

    if outcome.is_ok() && test.flags.failing {
        outcome = Err(XjetError::FailingPassed(FailingPassedError));
    } else if outcome.is_err() && test.flags.failing {
        outcome = Ok(());
    }

    let duration = started.elapsed();
    match outcome {
        Ok(()) => emit_action(
            config,
            EventScope::Test,
            ActionKind::Success,
            &test.ancestry,
            &test.description,
            duration,
            &[],
            test.source_location.clone(),
        ),
        Err(error) => emit_action(
            config,
            EventScope::Test,
            ActionKind::Failure,
            &test.ancestry,
            &test.description,
            duration,
            std::slice::from_ref(&error),
            test.source_location.clone(),
        ),
    }
}

/// `beforeEach`/`afterEach` are stored as an inherited snapshot directly
/// on [`SuiteDescribe`] at describe-registration time (see
/// `Engine::push_describe`); at lifecycle-run time they're simply
/// `suite.before_each`/`suite.after_each`.
fn suite_before_each<'a>(suite: &'a SuiteDescribe, _ctx: &ExecutionContext) -> &'a [HookModel] {
    &suite.before_each
}

fn suite_after_each<'a>(suite: &'a SuiteDescribe, _ctx: &ExecutionContext) -> &'a [HookModel] {
    &suite.after_each
}

async fn run_each_hooks(
    hooks: &[HookModel],
    test: &TestCase,
    cancellation: &CancellationToken,
    _config: &LifecycleConfig<'_>,
) -> Result<(), XjetError> {
    for hook in hooks {
        run_hook_for_test(hook, test, cancellation).await?;
    }
    Ok(())
}

async fn run_each_hooks_reverse(
    hooks: &[HookModel],
    test: &TestCase,
    cancellation: &CancellationToken,
    _config: &LifecycleConfig<'_>,
) {
    for hook in hooks.iter().rev() {
        // `afterEach` errors are not specified to abort the rest of the
        // chain; each is best-effort, matching `afterAll`'s capture
        // semantics rather than `beforeEach`'s fail-fast one.
        let _ = run_hook_for_test(hook, test, cancellation).await;
    }
}

async fn run_hook(
    hook: &HookModel,
    suite: &SuiteDescribe,
    _config: &LifecycleConfig<'_>,
) -> Result<(), XjetError> {
    let cancellation = CancellationToken::new();
    let mut cx = Context::new(
        SmolStr::new(suite.name()),
        suite.ancestry.clone(),
        cancellation.clone(),
    );
    with_timeout(hook.timeout_ms, &suite.name().to_string(), hook.source_location.clone(), &cancellation, run_test_body_impl(&hook.callback, &mut cx)).await
}

async fn run_hook_for_test(
    hook: &HookModel,
    test: &TestCase,
    cancellation: &CancellationToken,
) -> Result<(), XjetError> {
    let mut cx = Context::new(
        test.description.clone(),
        test.ancestry.clone(),
        cancellation.clone(),
    );
    with_timeout(
        hook.timeout_ms,
        &test.description,
        hook.source_location.clone(),
        cancellation,
        run_test_body_impl(&hook.callback, &mut cx),
    )
    .await
}

async fn run_body(test: &TestCase, cancellation: &CancellationToken) -> Result<(), XjetError> {
    let mut cx = Context::new(test.description.clone(), test.ancestry.clone(), cancellation.clone());
    with_timeout(
        test.timeout_ms,
        &test.description,
        test.source_location.clone(),
        cancellation,
        run_test_body_impl(&test.implementation, &mut cx),
    )
    .await
}

/// Dispatches on the [`TestBody`] tagged sum, producing a boxed future
/// uniformly so `with_timeout` can race it regardless of which variant
/// it is.
fn run_test_body_impl<'a>(
    body: &'a TestBody,
    cx: &'a mut Context,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), XjetError>> + Send + 'a>> {
    match body {
        TestBody::Sync(f) => {
            let result = f(cx);
            Box::pin(async move { result })
        }
        TestBody::Async(f) => f(cx),
        TestBody::Callback(f) => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            f(cx, DoneCallback::new(tx));
            Box::pin(async move {
                rx.await.unwrap_or_else(|_| {
                    Err(XjetError::test_failure("done callback was dropped without being called"))
                })
            })
        }
        TestBody::Todo => Box::pin(async { Ok(()) }),
    }
}

/// Races `future` against a deadline: the timeout wrapper races the
/// operation against a deferred completion after `timeout_ms`.
///
/// The operation is not forcibly cancelled: on timeout the abandoned
/// future is simply dropped from this `select!`, but if it is an async
/// Rust future holding no blocking work, dropping it does stop its
/// progress (unlike a host runtime where a timed-out task keeps running
/// in the background). Cooperative cancellation is additionally offered
/// via `cancellation`, which bodies may poll to exit early before the
/// timeout even fires.
async fn with_timeout(
    timeout_ms: u64,
    context_label: &str,
    location: Option<SourceLocation>,
    cancellation: &CancellationToken,
    future: std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), XjetError>> + Send + '_>>,
) -> Result<(), XjetError> {
    let duration = Duration::from_millis(timeout_ms);
    tokio::select! {
        biased;
        result = future => result,
        _ = tokio::time::sleep(duration) => {
            warn!(duration_ms = timeout_ms, context_label, "timed out");
            cancellation.cancel();
            Err(XjetError::Timeout(TimeoutError {
                duration,
                location,
                context_label: context_label.to_string(),
            }))
        }
    }
}

fn emit_status(
    config: &LifecycleConfig<'_>,
    scope: EventScope,
    status: StatusKind,
    ancestry: &[SmolStr],
    description: &str,
) {
    config.sink.send(FramedMessage {
        kind: xjet_metadata::FrameKind::Status,
        suite_id: config.suite_id,
        runner_id: config.runner_id,
        payload: Payload::Status(StatusPayload {
            scope,
            status,
            ancestry: ancestry.iter().map(|s| s.to_string()).collect(),
            description: description.to_string(),
        }),
    });
}

#[allow(clippy::too_many_arguments)]
fn emit_action(
    config: &LifecycleConfig<'_>,
    scope: EventScope,
    action: ActionKind,
    ancestry: &[SmolStr],
    description: &str,
    duration: Duration,
    errors: &[XjetError],
    location: Option<SourceLocation>,
) {
    config.sink.send(FramedMessage {
        kind: xjet_metadata::FrameKind::Action,
        suite_id: config.suite_id,
        runner_id: config.runner_id,
        payload: Payload::Action(ActionPayload {
            scope,
            action,
            errors: errors.iter().map(wire::ErrorPayload::from).collect(),
            ancestry: ancestry.iter().map(|s| s.to_string()).collect(),
            duration_ms: duration.as_millis() as u64,
            location,
            description: description.to_string(),
        }),
    });
}

/// Helper retained for callers (the orchestrator) that need to construct
/// an `Arc<dyn FrameSink>` from a plain closure.
pub struct ClosureSink<F>(pub F);

impl<F> FrameSink for ClosureSink<F>
where
    F: Fn(FramedMessage) + Send + Sync,
{
    fn send(&self, frame: FramedMessage) {
        (self.0)(frame)
    }
}

/// Convenience constructor favoring small free functions over
/// trait-object boilerplate at call sites.
pub fn sink_from_fn<F>(f: F) -> Arc<dyn FrameSink>
where
    F: Fn(FramedMessage) + Send + Sync + 'static,
{
    Arc::new(ClosureSink(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SuiteFlags, TestFlags};
    use std::sync::Mutex;

    fn config(sink: &dyn FrameSink) -> LifecycleConfig<'_> {
        LifecycleConfig {
            suite_id: UnitId::new([0; 16]),
            runner_id: UnitId::new([0; 16]),
            sink,
            only_mode: false,
            randomize: false,
        }
    }

    fn recording_hook(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> HookModel {
        let log = Arc::clone(log);
        HookModel {
            kind: crate::model::HookKind::BeforeEach,
            callback: TestBody::Async(Arc::new(move |_cx| {
                let log = Arc::clone(&log);
                Box::pin(async move {
                    log.lock().unwrap().push(label);
                    Ok(())
                })
            })),
            timeout_ms: 1_000,
            source_location: None,
        }
    }

    fn sync_test(description: &str, flags: TestFlags, log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> TestCase {
        let log = Arc::clone(log);
        TestCase {
            description: description.into(),
            implementation: TestBody::Sync(Box::new(move |_cx| {
                log.lock().unwrap().push(label);
                Ok(())
            })),
            parameters: None,
            flags,
            timeout_ms: 1_000,
            ancestry: vec![description.into()],
            source_location: None,
        }
    }

    #[tokio::test]
    async fn before_each_runs_in_order_then_body_then_after_each_reverses() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let mut suite = SuiteDescribe::root();
        suite.before_each = vec![recording_hook(&log, "before-1"), recording_hook(&log, "before-2")];
        suite.after_each = vec![
            HookModel {
                kind: crate::model::HookKind::AfterEach,
                ..recording_hook(&log, "after-1")
            },
            HookModel {
                kind: crate::model::HookKind::AfterEach,
                ..recording_hook(&log, "after-2")
            },
        ];
        suite.tests = vec![sync_test("t", TestFlags::default(), &log, "body")];

        let sink = sink_from_fn(|_| {});
        let cfg = config(sink.as_ref());
        let mut ctx = ExecutionContext::default();
        run_suite(&suite, &mut ctx, &cfg).await;

        assert_eq!(
            log.lock().unwrap().as_slice(),
            &["before-1", "before-2", "body", "after-2", "after-1"],
        );
    }

    #[tokio::test]
    async fn skip_suppresses_failing_regardless_of_ancestry() {
        let mut flags = TestFlags::default();
        flags.skip = true;
        flags.failing = true;
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let mut suite = SuiteDescribe::root();
        suite.tests = vec![sync_test("t", flags, &log, "body")];

        let events: Arc<Mutex<Vec<FramedMessage>>> = Arc::default();
        let events_clone = Arc::clone(&events);
        let sink = sink_from_fn(move |frame| events_clone.lock().unwrap().push(frame));
        let cfg = config(sink.as_ref());
        let mut ctx = ExecutionContext::default();
        run_suite(&suite, &mut ctx, &cfg).await;

        assert!(log.lock().unwrap().is_empty(), "a skipped test's body must never run, even if flagged failing");
        let skipped = events
            .lock()
            .unwrap()
            .iter()
            .any(|frame| matches!(&frame.payload, Payload::Status(s) if s.status == StatusKind::Skip));
        assert!(skipped, "a skip must be reported regardless of the failing flag");
    }

    #[tokio::test]
    async fn before_all_failure_fails_every_test_without_running_it() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let after_all_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let after_all_ran_clone = Arc::clone(&after_all_ran);

        let mut suite = SuiteDescribe::root();
        suite.flags = SuiteFlags::default();
        suite.before_all = vec![HookModel {
            kind: crate::model::HookKind::BeforeAll,
            callback: TestBody::Async(Arc::new(|_cx| {
                Box::pin(async { Err(XjetError::test_failure("setup failed")) })
            })),
            timeout_ms: 1_000,
            source_location: None,
        }];
        suite.after_all = vec![HookModel {
            kind: crate::model::HookKind::AfterAll,
            callback: TestBody::Async(Arc::new(move |_cx| {
                let flag = Arc::clone(&after_all_ran_clone);
                Box::pin(async move {
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                })
            })),
            timeout_ms: 1_000,
            source_location: None,
        }];
        suite.tests = vec![sync_test("t", TestFlags::default(), &log, "body")];

        let events: Arc<Mutex<Vec<FramedMessage>>> = Arc::default();
        let events_clone = Arc::clone(&events);
        let sink = sink_from_fn(move |frame| events_clone.lock().unwrap().push(frame));
        let cfg = config(sink.as_ref());
        let mut ctx = ExecutionContext::default();
        run_suite(&suite, &mut ctx, &cfg).await;

        assert!(log.lock().unwrap().is_empty(), "a test must never run once beforeAll has failed");
        assert!(after_all_ran.load(std::sync::atomic::Ordering::SeqCst), "afterAll must still run after beforeAll fails");
        let test_failed = events.lock().unwrap().iter().any(|frame| {
            matches!(&frame.payload, Payload::Action(a) if a.action == ActionKind::Failure && a.scope == EventScope::Test)
        });
        assert!(test_failed, "the test must be reported as failed due to the inherited beforeAll error");
    }

    #[tokio::test]
    async fn a_skipped_parent_still_reports_nested_tests_as_skipped() {
        // Mirrors what `Engine::push_describe` produces: the child's own
        // `flags.skip`/test's own `flags.skip` already carry the inherited
        // `true`, independent of whether `run_suite`'s recursion is gated.
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let mut child = SuiteDescribe::root();
        child.ancestry = vec!["outer".into(), "inner".into()];
        child.flags = SuiteFlags { skip: true, only: false };
        let mut nested_flags = TestFlags::default();
        nested_flags.skip = true;
        child.tests = vec![sync_test("nested", nested_flags, &log, "nested-body")];

        let mut suite = SuiteDescribe::root();
        suite.ancestry = vec!["outer".into()];
        suite.flags = SuiteFlags { skip: true, only: false };
        suite.children = vec![child];

        let events: Arc<Mutex<Vec<FramedMessage>>> = Arc::default();
        let events_clone = Arc::clone(&events);
        let sink = sink_from_fn(move |frame| events_clone.lock().unwrap().push(frame));
        let cfg = config(sink.as_ref());
        let mut ctx = ExecutionContext::default();
        run_suite(&suite, &mut ctx, &cfg).await;

        assert!(log.lock().unwrap().is_empty(), "a skipped test's body must never run");
        let events = events.lock().unwrap();
        let nested_describe_skipped = events.iter().any(|frame| {
            matches!(&frame.payload, Payload::Status(s)
                if s.status == StatusKind::Skip && s.scope == EventScope::Describe && s.description == "inner")
        });
        let nested_test_skipped = events.iter().any(|frame| {
            matches!(&frame.payload, Payload::Status(s)
                if s.status == StatusKind::Skip && s.scope == EventScope::Test && s.description == "nested")
        });
        assert!(nested_describe_skipped, "a describe nested under a skipped ancestor must still emit its own SKIP status");
        assert!(nested_test_skipped, "a test nested under a skipped ancestor must still emit its own SKIP status, never silently dropped");
    }
}
