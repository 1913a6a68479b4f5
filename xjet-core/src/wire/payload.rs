// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payload schemas keyed by [`FrameKind`](xjet_metadata::FrameKind).

use crate::model::SourceLocation;
use serde::{Deserialize, Serialize};

/// `reporter.log`'s `level` field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silent,
    Error,
    Warn,
    Info,
    Debug,
}

/// Whether an event concerns a `describe` block or a `test`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventScope {
    Describe,
    Test,
}

/// `status.type`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusKind {
    Start,
    Skip,
    Todo,
    End,
}

/// `action.type`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Success,
    Failure,
}

/// An error, flattened to an own-properties bag rather than assuming any
/// prototype-walk semantics: the serializer walks own properties plus
/// `name`/`message`/`stack`, avoiding any assumption about prototype
/// traversal idiomatic to dynamic languages.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub formatted_stack: Option<String>,
    pub location: Option<SourceLocation>,
    pub source_map_reference: Option<String>,
}

impl From<&crate::errors::XjetError> for ErrorPayload {
    fn from(error: &crate::errors::XjetError) -> Self {
        Self {
            name: error_name(error).to_string(),
            message: error.to_string(),
            stack: None,
            formatted_stack: None,
            location: None,
            source_map_reference: None,
        }
    }
}

fn error_name(error: &crate::errors::XjetError) -> &'static str {
    use crate::errors::XjetError;
    match error {
        XjetError::Nesting(_) => "NestingError",
        XjetError::FlagConflict(_) => "FlagConflictError",
        XjetError::TemplateShape(_) => "TemplateShapeError",
        XjetError::Timeout(_) => "TimeoutError",
        XjetError::FailingPassed(_) => "FailingPassedError",
        XjetError::VmRuntime(_) => "VMRuntimeError",
        XjetError::Infrastructure(_) => "InfrastructureError",
        XjetError::TestFailure { .. } => "Error",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogPayload {
    pub level: LogLevel,
    pub context: Option<String>,
    pub location: Option<SourceLocation>,
    pub timestamp_millis: i64,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusPayload {
    pub scope: EventScope,
    pub status: StatusKind,
    pub ancestry: Vec<String>,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionPayload {
    pub scope: EventScope,
    pub action: ActionKind,
    pub errors: Vec<ErrorPayload>,
    pub ancestry: Vec<String>,
    pub duration_ms: u64,
    pub location: Option<SourceLocation>,
    pub description: String,
}

/// Standalone infrastructure error, not attributable to a single test;
/// routed to `reporter.suiteError`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteErrorPayload {
    pub message: String,
    pub format_code: Option<String>,
    pub stacks: Vec<String>,
}

/// The union of payload shapes a [`FramedMessage`](super::FramedMessage)
/// can carry, tagged by the frame's type byte on the wire (not by this
/// enum's own discriminant -- see `wire::codec`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Payload {
    Log(LogPayload),
    Status(StatusPayload),
    Error(SuiteErrorPayload),
    Action(ActionPayload),
}
