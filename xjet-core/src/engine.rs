// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The registration-time engine handle and its process-wide default.
//!
//! Rather than a hidden process-singleton `SuiteState`, `Engine` is an
//! explicit handle a caller can own; [`Engine::current`] offers a
//! thread-local default so the `describe!`/`test!` macros can keep the
//! original DSL's ergonomics without *requiring* explicit threading
//! everywhere.

use crate::errors::NestingError;
use crate::model::SuiteDescribe;
use regex::Regex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// What is currently on the registration stack: nothing, a describe body,
/// or a running test. Attempting to register while `Running` raises
/// [`NestingError`].
#[derive(Clone, Debug, Eq, PartialEq)]
enum StackTop {
    Idle,
    Describing(String),
    Running(String),
}

/// The mutable registration scratchpad for one [`Engine`].
struct SuiteState {
    root: SuiteDescribe,
    /// Path of describe indices from the root to the describe currently
    /// being populated, e.g. `[0, 2]` means root's child 0's child 2.
    cursor: Vec<usize>,
    stack_top: StackTop,
}

impl SuiteState {
    fn new() -> Self {
        Self {
            root: SuiteDescribe::root(),
            cursor: Vec::new(),
            stack_top: StackTop::Idle,
        }
    }

    fn current_mut(&mut self) -> &mut SuiteDescribe {
        let mut node = &mut self.root;
        for &index in &self.cursor {
            node = &mut node.children[index];
        }
        node
    }

    /// Flags accumulated down the cursor's ancestry (OR-merged), used both
    /// to seed a new child describe's own flags and a new `TestCase`'s
    /// inherited `skip`/`only`.
    fn accumulated_flags(&self) -> crate::model::SuiteFlags {
        let mut node = &self.root;
        let mut flags = node.flags;
        for &index in &self.cursor {
            node = &node.children[index];
            flags.skip = flags.skip || node.flags.skip;
            flags.only = flags.only || node.flags.only;
        }
        flags
    }

    /// Snapshot of the `beforeEach`/`afterEach` hooks accumulated down the
    /// cursor's ancestry: a copy, not a live reference -- later additions
    /// to the parent do not propagate.
    fn accumulated_each_hooks(&self) -> (Vec<crate::model::HookModel>, Vec<crate::model::HookModel>) {
        let mut node = &self.root;
        let mut before_each = node.before_each.clone();
        let mut after_each = node.after_each.clone();
        for &index in &self.cursor {
            node = &node.children[index];
            before_each.extend(node.before_each.iter().cloned());
            after_each.extend(node.after_each.iter().cloned());
        }
        (before_each, after_each)
    }
}

/// An explicit handle to one registration run's state.
///
/// `only_mode` is an `AtomicBool` -- OR-assigned true and never cleared
/// during a run -- so a concurrently running reporter can observe it
/// without locking the whole state.
pub struct Engine {
    state: Mutex<SuiteState>,
    only_mode: AtomicBool,
    /// Runtime filter set: each test's `only` is set iff `^filter$`
    /// matches its description.
    pub filter: Option<Regex>,
}

impl Engine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SuiteState::new()),
            only_mode: AtomicBool::new(false),
            filter: None,
        })
    }

    pub fn with_filter(filter: Regex) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SuiteState::new()),
            only_mode: AtomicBool::new(false),
            filter: Some(filter),
        })
    }

    /// The thread-local default engine used by the bare `describe`/`test`
    /// free functions in [`crate::directive`].
    pub fn current() -> Arc<Self> {
        CURRENT.with(|cell| cell.borrow().clone())
    }

    /// Installs `engine` as the thread-local default for the duration of
    /// `body`, restoring the previous default afterwards. Used by test
    /// harnesses that want an isolated `Engine` per test.
    pub fn with_current<R>(engine: Arc<Engine>, body: impl FnOnce() -> R) -> R {
        let previous = CURRENT.with(|cell| std::mem::replace(&mut *cell.borrow_mut(), engine));
        let result = body();
        CURRENT.with(|cell| *cell.borrow_mut() = previous);
        result
    }

    pub fn only_mode(&self) -> bool {
        self.only_mode.load(Ordering::Acquire)
    }

    pub(crate) fn latch_only_mode(&self) {
        self.only_mode.store(true, Ordering::Release);
    }

    /// Takes ownership of the fully registered suite tree, leaving a fresh
    /// empty root behind. The root `SuiteDescribe` is discarded when the
    /// enclosing execution completes.
    pub fn take_root(&self) -> SuiteDescribe {
        let mut state = self.state.lock().expect("suite state poisoned");
        std::mem::replace(&mut state.root, SuiteDescribe::root())
    }

    pub(crate) fn push_describe(
        &self,
        name: &str,
        flags: crate::model::SuiteFlags,
    ) -> Result<(), NestingError> {
        let mut state = self.state.lock().expect("suite state poisoned");
        if let StackTop::Running(running) = &state.stack_top {
            return Err(NestingError {
                attempted: "describe",
                running: running.clone(),
            });
        }
        let mut ancestry = state.current_mut().ancestry.clone();
        ancestry.push(name.into());

        // Inherit the parent chain's skip/only and its beforeEach/afterEach
        // hooks as a snapshot, taken now rather than left as a live
        // reference to the parent.
        let inherited = state.accumulated_flags();
        let (before_each, after_each) = state.accumulated_each_hooks();

        let mut child = SuiteDescribe::root();
        child.ancestry = ancestry;
        child.flags = crate::model::SuiteFlags {
            skip: flags.skip || inherited.skip,
            only: flags.only || inherited.only,
        };
        child.before_each = before_each;
        child.after_each = after_each;
        if child.flags.only {
            self.latch_only_mode();
        }
        let parent = state.current_mut();
        parent.children.push(child);
        let new_index = parent.children.len() - 1;
        state.cursor.push(new_index);
        state.stack_top = StackTop::Describing(name.to_string());
        Ok(())
    }

    pub(crate) fn pop_describe(&self) {
        let mut state = self.state.lock().expect("suite state poisoned");
        state.cursor.pop();
        state.stack_top = StackTop::Idle;
    }

    pub(crate) fn push_test(&self, test: crate::model::TestCase) -> Result<(), NestingError> {
        let mut state = self.state.lock().expect("suite state poisoned");
        if let StackTop::Running(running) = &state.stack_top {
            return Err(NestingError {
                attempted: "test",
                running: running.clone(),
            });
        }
        if test.flags.only {
            self.latch_only_mode();
        }
        state.current_mut().tests.push(test);
        Ok(())
    }

    pub(crate) fn push_hook(&self, hook: crate::model::HookModel) {
        let mut state = self.state.lock().expect("suite state poisoned");
        let node = state.current_mut();
        match hook.kind {
            crate::model::HookKind::BeforeAll => node.before_all.push(hook),
            crate::model::HookKind::BeforeEach => node.before_each.push(hook),
            crate::model::HookKind::AfterAll => node.after_all.push(hook),
            crate::model::HookKind::AfterEach => node.after_each.push(hook),
        }
    }

    pub(crate) fn current_ancestry(&self) -> Vec<smol_str::SmolStr> {
        let mut state = self.state.lock().expect("suite state poisoned");
        state.current_mut().ancestry.clone()
    }

    /// Current flags accumulated on the describe stack (OR-merged down the
    /// ancestry), used to seed a new `TestCase`'s inherited `skip`/`only`.
    pub(crate) fn current_suite_flags(&self) -> crate::model::SuiteFlags {
        let state = self.state.lock().expect("suite state poisoned");
        state.accumulated_flags()
    }
}

thread_local! {
    static CURRENT: RefCell<Arc<Engine>> = RefCell::new(Engine::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HookKind, HookModel, SuiteFlags, TestBody};
    use std::sync::Arc as StdArc;

    fn async_hook(kind: HookKind) -> HookModel {
        HookModel {
            kind,
            callback: TestBody::Async(StdArc::new(|_cx| Box::pin(async { Ok(()) }))),
            timeout_ms: 1_000,
            source_location: None,
        }
    }

    #[test]
    fn child_describe_inherits_parent_before_each_and_after_each_as_a_snapshot() {
        let engine = Engine::new();
        engine.push_hook(async_hook(HookKind::BeforeEach));
        engine.push_hook(async_hook(HookKind::AfterEach));

        engine.push_describe("child", SuiteFlags::default()).unwrap();
        // Registered after the child exists: must not retroactively appear
        // in the child's snapshot. Later additions to the parent do not
        // propagate.
        engine.pop_describe();
        engine.push_hook(async_hook(HookKind::BeforeEach));

        let root = engine.take_root();
        assert_eq!(root.before_each.len(), 2);
        assert_eq!(root.children[0].before_each.len(), 1);
        assert_eq!(root.children[0].after_each.len(), 1);
    }

    #[test]
    fn nested_describe_inherits_skip_from_an_ancestor() {
        let engine = Engine::new();
        engine.push_describe("outer", SuiteFlags { skip: true, only: false }).unwrap();
        engine.push_describe("inner", SuiteFlags::default()).unwrap();
        engine.pop_describe();
        engine.pop_describe();

        let root = engine.take_root();
        assert!(root.children[0].flags.skip);
        assert!(root.children[0].children[0].flags.skip, "inner describe must inherit the outer skip flag");
    }

    #[test]
    fn nested_describe_inherits_only_and_latches_only_mode() {
        let engine = Engine::new();
        engine.push_describe("outer", SuiteFlags { skip: false, only: true }).unwrap();
        engine.push_describe("inner", SuiteFlags::default()).unwrap();
        engine.pop_describe();
        engine.pop_describe();

        let root = engine.take_root();
        assert!(root.children[0].children[0].flags.only);
        assert!(engine.only_mode());
    }
}
