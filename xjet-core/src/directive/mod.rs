// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The directive surface: `describe`, `test`, the modifier chain, and
//! `.each` parameterized expansion. This module translates the DSL into
//! typed model objects registered on an [`Engine`].

mod builder;
mod template;

pub use builder::TestModifiers;
pub use template::{interpolate_printf, interpolate_variable, EachRow, EachTable};

use crate::engine::Engine;
use crate::errors::{NestingError, XjetError};
use crate::model::{HookKind, HookModel, SourceLocation, SuiteFlags, TestBody, TestCase, TestFlags};
use serde_json::Value;
use std::sync::Arc;

/// `describe(description, body, flags?)`.
///
/// Pushes a new [`SuiteDescribe`](crate::model::SuiteDescribe) onto the
/// engine's stack, invokes `body` synchronously so it can register nested
/// describes/tests, then pops. Fails with [`NestingError`] if invoked
/// while a test is currently running.
pub fn describe(
    engine: &Arc<Engine>,
    description: &str,
    flags: SuiteFlags,
    body: impl FnOnce(),
) -> Result<(), NestingError> {
    engine.push_describe(description, flags)?;
    body();
    engine.pop_describe();
    Ok(())
}

/// `test(description, block?, timeout?)`.
///
/// If `block` is `None`, `flags.todo` is auto-set regardless of what the
/// caller passed in `modifiers`. Fails with [`NestingError`] if another
/// test is currently on the stack.
pub fn test(
    engine: &Arc<Engine>,
    description: &str,
    modifiers: TestModifiers,
    timeout_ms: u64,
    block: Option<TestBody>,
    parameters: Option<Value>,
    source_location: Option<SourceLocation>,
) -> Result<(), NestingError> {
    let mut flags = modifiers.into_flags();
    let inherited = engine.current_suite_flags();
    flags.skip = flags.skip || inherited.skip;
    flags.only = flags.only || inherited.only;

    let implementation = match block {
        Some(body) => body,
        None => {
            flags.todo = true;
            TestBody::Todo
        }
    };

    if let Some(filter) = &engine.filter {
        if !flags.only {
            let anchored = format!("^{}$", filter.as_str());
            // The engine stores a pre-compiled filter; re-anchoring per
            // call would be wasteful in a hot loop, but registration only
            // happens once per process, so clarity wins over a cached
            // anchored regex here.
            if regex::Regex::new(&anchored)
                .map(|re| re.is_match(description))
                .unwrap_or(false)
            {
                flags.only = true;
            }
        }
    }

    let mut ancestry = engine.current_ancestry();
    ancestry.push(description.into());

    let test_case = TestCase {
        description: description.into(),
        implementation,
        parameters,
        flags,
        timeout_ms,
        ancestry,
        source_location,
    };
    engine.push_test(test_case)
}

/// `beforeAll`/`beforeEach`/`afterAll`/`afterEach` registration.
/// `beforeAll`/`afterAll` are owned by
/// the current describe; `beforeEach`/`afterEach` additionally become
/// visible to every describe registered afterwards as an inherited
/// snapshot, taken when the child describe is registered (see
/// [`Engine::push_describe`]).
pub fn hook(
    engine: &Arc<Engine>,
    kind: HookKind,
    callback: TestBody,
    timeout_ms: u64,
    source_location: Option<SourceLocation>,
) {
    engine.push_hook(HookModel {
        kind,
        callback,
        timeout_ms,
        source_location,
    });
}

/// Expands a `.each` table into N registrations with interpolated
/// descriptions.
///
/// `description_template` is resolved once per row via printf or variable
/// mode (decided once, for the whole table, by [`EachTable::mode`]).
/// `make_body` receives the row so it can close over the parameter bundle.
pub fn each(
    engine: &Arc<Engine>,
    description_template: &str,
    table: &EachTable,
    modifiers: TestModifiers,
    timeout_ms: u64,
    mut make_body: impl FnMut(&EachRow) -> TestBody,
    source_location: Option<SourceLocation>,
) -> Result<(), XjetError> {
    for (index, row) in table.rows().enumerate() {
        let description = if description_template.contains("%%")
            || template::has_printf_token(description_template)
        {
            interpolate_printf(description_template, row, index)
        } else {
            interpolate_variable(description_template, row, index)
        };
        let parameters = Some(row.as_value());
        let body = make_body(row);
        test(
            engine,
            &description,
            modifiers,
            timeout_ms,
            Some(body),
            parameters,
            source_location.clone(),
        )
        .map_err(XjetError::from)?;
    }
    Ok(())
}
