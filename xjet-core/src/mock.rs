// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-call tracking for spy/stub behavior.
//!
//! `MockState` is the call-tracking half of a mock function: it does not
//! itself decide *what* to return (that is the bound `current_impl`'s
//! job), only records what happened on each call and hands back the
//! right implementation to run, FIFO-draining `one_shot_impls` first.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Threaded-through invocation-order counter, global across every
/// `MockState` in one run: call order must stay monotonic across all
/// mocks in the same run, not just within one.
static INVOCATION_ORDER: AtomicU64 = AtomicU64::new(0);

/// The outcome variant of one recorded call.
#[derive(Clone, Debug)]
pub enum CallResult {
    /// The implementation returned normally, with this value.
    Return(Value),
    /// The implementation threw; `message` is its stringified error.
    Throw(String),
    /// A transient placeholder recorded at call time, overwritten once the
    /// implementation actually returns or throws.
    Incomplete,
}

/// One recorded invocation.
#[derive(Clone, Debug)]
pub struct Call {
    pub args: Vec<Value>,
    pub context: Option<Value>,
    pub result: CallResult,
    pub order: u64,
}

/// A callable implementation a mock can run: the user's default, or a
/// one-shot queued via `mockImplementationOnce`.
pub type MockImpl = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A restore callback stashed by whatever installed the mock (e.g. a spy
/// wrapping a real method), invoked by `mockRestore`.
pub type RestoreFn = Arc<dyn Fn() + Send + Sync>;

/// Per-call tracking for one mock function.
///
/// Bound-argument/this overrides (`__boundArgs`/`__boundThis`) are
/// represented as plain `Option` fields rather than magic struct
/// properties, since this is a typed re-architecture of a dynamically
/// bound callable.
#[derive(Default)]
pub struct MockState {
    calls: Vec<Call>,
    instances: Vec<Value>,
    current_impl: Option<MockImpl>,
    one_shot_impls: std::collections::VecDeque<MockImpl>,
    restore: Option<RestoreFn>,
    bound_args: Vec<Value>,
    bound_this: Option<Value>,
}

impl std::fmt::Debug for MockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockState")
            .field("calls", &self.calls.len())
            .field("instances", &self.instances.len())
            .field("one_shot_impls", &self.one_shot_impls.len())
            .finish()
    }
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a leading-argument prefix, applied before every call's own
    /// arguments.
    pub fn bind_args(&mut self, args: Vec<Value>) {
        self.bound_args = args;
    }

    /// Binds a fixed `this`/context override, applied to every call
    /// regardless of what the caller passes.
    pub fn bind_this(&mut self, this: Value) {
        self.bound_this = Some(this);
    }

    /// Invokes the mock with `args`/`context`, recording the call and
    /// returning its outcome.
    ///
    /// Step order:
    /// 1. consume the one-shot queue's head if non-empty, else the
    ///    default implementation;
    /// 2. apply bound-argument prefix and bound-this override;
    /// 3. record `(args, context, result)` with a monotonic order number,
    ///    persisting the last-arguments tuple implicitly (callers can read
    ///    `self.calls.last()`);
    /// 4. constructor recording is handled separately by
    ///    [`MockState::record_instance`], since "invoked as a
    ///    constructor" is a call-site property this type cannot observe
    ///    on its own.
    pub fn call(&mut self, args: Vec<Value>, context: Option<Value>) -> Result<Value, String> {
        let implementation = self.one_shot_impls.pop_front().or_else(|| self.current_impl.clone());

        let mut full_args = self.bound_args.clone();
        full_args.extend(args);
        let effective_context = self.bound_this.clone().or(context);

        let order = INVOCATION_ORDER.fetch_add(1, Ordering::SeqCst);
        // Record a transient placeholder first so a reentrant call from
        // inside `implementation` observes this call as already-in-flight
        // rather than missing entirely.
        let call_index = self.calls.len();
        self.calls.push(Call {
            args: full_args.clone(),
            context: effective_context.clone(),
            result: CallResult::Incomplete,
            order,
        });

        let outcome = match &implementation {
            Some(f) => f(&full_args),
            None => Ok(Value::Null),
        };

        self.calls[call_index].result = match &outcome {
            Ok(value) => CallResult::Return(value.clone()),
            Err(message) => CallResult::Throw(message.clone()),
        };

        outcome
    }

    /// Records a constructor invocation's produced instance: if invoked
    /// as a constructor, record the instance in `instances`; return the
    /// produced object if it is an object, else the constructed `this`.
    pub fn record_instance(&mut self, produced: Value, constructed_this: Value) -> Value {
        let instance = match &produced {
            Value::Object(_) => produced.clone(),
            _ => constructed_this,
        };
        self.instances.push(instance.clone());
        instance
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn instances(&self) -> &[Value] {
        &self.instances
    }

    pub fn last_args(&self) -> Option<&[Value]> {
        self.calls.last().map(|c| c.args.as_slice())
    }

    /// `mockClear()`: reset call tracking only.
    pub fn mock_clear(&mut self) {
        self.calls.clear();
        self.instances.clear();
    }

    /// `mockReset()`: clear tracking and drop the one-shot queue.
    pub fn mock_reset(&mut self) {
        self.mock_clear();
        self.one_shot_impls.clear();
        self.current_impl = None;
    }

    /// `mockRestore()`: invoke the stored restore callback (if any), then
    /// reset.
    pub fn mock_restore(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
        self.mock_reset();
    }

    pub fn set_restore(&mut self, restore: RestoreFn) {
        self.restore = Some(restore);
    }

    pub fn mock_implementation(&mut self, implementation: MockImpl) {
        self.current_impl = Some(implementation);
    }

    pub fn mock_implementation_once(&mut self, implementation: MockImpl) {
        self.one_shot_impls.push_back(implementation);
    }

    pub fn mock_return_value(&mut self, value: Value) {
        self.mock_implementation(Arc::new(move |_| Ok(value.clone())));
    }

    pub fn mock_return_value_once(&mut self, value: Value) {
        self.mock_implementation_once(Arc::new(move |_| Ok(value.clone())));
    }

    /// `mockResolvedValue`: wraps `value` as an already-resolved promise.
    /// Since this is a synchronous call-tracking state machine, "resolved
    /// promise" is represented as the plain value itself -- the async
    /// wrapping is the caller's (the `TestBody::Async` closure's) job.
    pub fn mock_resolved_value(&mut self, value: Value) {
        self.mock_return_value(value);
    }

    pub fn mock_resolved_value_once(&mut self, value: Value) {
        self.mock_return_value_once(value);
    }

    pub fn mock_rejected_value(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.mock_implementation(Arc::new(move |_| Err(message.clone())));
    }

    pub fn mock_rejected_value_once(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.mock_implementation_once(Arc::new(move |_| Err(message.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_calls_in_order_with_monotonic_counter() {
        let mut mock = MockState::new();
        mock.mock_return_value(json!("default"));
        let first_order = mock.call(vec![json!(1)], None).map(|_| ()).unwrap();
        let _ = first_order;
        mock.call(vec![json!(2)], None).unwrap();
        assert_eq!(mock.calls().len(), 2);
        assert!(mock.calls()[1].order > mock.calls()[0].order);
    }

    #[test]
    fn one_shot_impls_drain_fifo_before_default() {
        let mut mock = MockState::new();
        mock.mock_return_value(json!("default"));
        mock.mock_return_value_once(json!("first"));
        mock.mock_return_value_once(json!("second"));

        assert_eq!(mock.call(vec![], None).unwrap(), json!("first"));
        assert_eq!(mock.call(vec![], None).unwrap(), json!("second"));
        assert_eq!(mock.call(vec![], None).unwrap(), json!("default"));
    }

    #[test]
    fn no_implementation_returns_null() {
        let mut mock = MockState::new();
        assert_eq!(mock.call(vec![], None).unwrap(), Value::Null);
    }

    #[test]
    fn mock_clear_drops_calls_but_keeps_implementation() {
        let mut mock = MockState::new();
        mock.mock_return_value(json!(1));
        mock.call(vec![], None).unwrap();
        mock.mock_clear();
        assert!(mock.calls().is_empty());
        assert_eq!(mock.call(vec![], None).unwrap(), json!(1));
    }

    #[test]
    fn mock_reset_drops_one_shot_queue_and_implementation() {
        let mut mock = MockState::new();
        mock.mock_return_value(json!("default"));
        mock.mock_return_value_once(json!("once"));
        mock.mock_reset();
        assert_eq!(mock.call(vec![], None).unwrap(), Value::Null);
    }

    #[test]
    fn mock_restore_invokes_restore_callback() {
        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let invoked_clone = Arc::clone(&invoked);
        let mut mock = MockState::new();
        mock.set_restore(Arc::new(move || {
            invoked_clone.store(true, Ordering::SeqCst);
        }));
        mock.mock_restore();
        assert!(invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn bound_args_prefix_every_call() {
        let mut mock = MockState::new();
        mock.bind_args(vec![json!("bound")]);
        mock.mock_implementation(Arc::new(|args| Ok(json!(args))));
        let result = mock.call(vec![json!("actual")], None).unwrap();
        assert_eq!(result, json!(["bound", "actual"]));
    }

    #[test]
    fn rejected_value_surfaces_as_throw() {
        let mut mock = MockState::new();
        mock.mock_rejected_value("boom");
        let err = mock.call(vec![], None).unwrap_err();
        assert_eq!(err, "boom");
        assert!(matches!(mock.calls()[0].result, CallResult::Throw(_)));
    }

    #[test]
    fn constructor_instance_recording_prefers_produced_object() {
        let mut mock = MockState::new();
        let produced = mock.record_instance(json!({"a": 1}), json!("this"));
        assert_eq!(produced, json!({"a": 1}));
        assert_eq!(mock.instances().len(), 1);
    }

    #[test]
    fn constructor_instance_recording_falls_back_to_constructed_this() {
        let mut mock = MockState::new();
        let produced = mock.record_instance(json!("not an object"), json!({"this": true}));
        assert_eq!(produced, json!({"this": true}));
    }

    #[test]
    fn invocation_order_is_globally_monotonic_across_mocks() {
        let mut a = MockState::new();
        let mut b = MockState::new();
        a.call(vec![], None).unwrap();
        b.call(vec![], None).unwrap();
        a.call(vec![], None).unwrap();
        assert!(a.calls()[1].order > b.calls()[0].order);
    }
}
