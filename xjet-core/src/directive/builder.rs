// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The modifier chain (`test.skip`, `test.only`, `test.todo`,
//! `test.failing`) as an immutable builder, replacing a dynamic
//! proxy/callable-chain pattern.

use crate::errors::FlagConflictError;
use crate::model::TestFlags;

/// An immutable builder accumulating the flags a `.skip()/.only()/.todo()/
/// .failing()` chain sets, validating conflicts at each step -- raising
/// [`FlagConflictError`] at the chain step itself, before the test body
/// would ever run -- rather than waiting until registration time.
#[derive(Copy, Clone, Debug, Default)]
pub struct TestModifiers {
    flags: TestFlags,
}

impl TestModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(self) -> Result<Self, FlagConflictError> {
        if self.flags.only {
            return Err(conflict("skip", "only"));
        }
        if self.flags.todo {
            return Err(conflict("skip", "todo"));
        }
        if self.flags.failing {
            return Err(conflict("skip", "failing"));
        }
        Ok(Self {
            flags: TestFlags {
                skip: true,
                ..self.flags
            },
        })
    }

    pub fn only(self) -> Result<Self, FlagConflictError> {
        if self.flags.skip {
            return Err(conflict("skip", "only"));
        }
        Ok(Self {
            flags: TestFlags {
                only: true,
                ..self.flags
            },
        })
    }

    pub fn todo(self) -> Result<Self, FlagConflictError> {
        if self.flags.skip {
            return Err(conflict("skip", "todo"));
        }
        Ok(Self {
            flags: TestFlags {
                todo: true,
                ..self.flags
            },
        })
    }

    pub fn failing(self) -> Result<Self, FlagConflictError> {
        if self.flags.skip {
            return Err(conflict("skip", "failing"));
        }
        Ok(Self {
            flags: TestFlags {
                failing: true,
                ..self.flags
            },
        })
    }

    pub(crate) fn into_flags(self) -> TestFlags {
        self.flags
    }
}

fn conflict(a: &'static str, b: &'static str) -> FlagConflictError {
    FlagConflictError { a, b }
}
