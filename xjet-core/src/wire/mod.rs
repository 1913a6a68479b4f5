// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The framed wire protocol exchanged between a running suite and the
//! orchestrator.

mod codec;
mod payload;

pub use codec::{decode, encode, DecodeError, FramedMessage};
pub use payload::{
    ActionKind, ActionPayload, ErrorPayload, EventScope, LogLevel, LogPayload, Payload,
    StatusKind, StatusPayload, SuiteErrorPayload,
};
