// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The framed wire protocol.
//!
//! ```text
//! byte 0       : type code (0=log, 1=status, 2=error, 3=action)
//! bytes 1..17  : suite id (16 bytes)
//! bytes 17..33 : runner id (16 bytes)
//! bytes 33..   : payload (JSON-encoded, schema keyed by type)
//! ```
//!
//! The payload is JSON rather than a hand-rolled binary schema: the
//! teacher's own `reporter/events.rs` types are serde-derived, and only
//! the outer byte framing is fixed, not the payload encoding.

use super::payload::Payload;
use crate::model::UnitId;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use xjet_metadata::FrameKind;

const HEADER_LEN: usize = 1 + 16 + 16;

/// A single length-prefixed wire message.
#[derive(Clone, Debug)]
pub struct FramedMessage {
    pub kind: FrameKind,
    pub suite_id: UnitId,
    pub runner_id: UnitId,
    pub payload: Payload,
}

/// Errors produced by [`decode`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is {len} bytes, shorter than the {HEADER_LEN}-byte header")]
    Truncated { len: usize },
    #[error("unrecognized frame type byte {byte}")]
    UnknownType { byte: u8 },
    #[error("payload did not match the schema for this frame type: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("frame type byte did not match its own payload variant")]
    TypeMismatch,
}

/// Encodes `message` into its wire form.
///
/// `decode(encode(message)) == message` for every valid message.
pub fn encode(message: &FramedMessage) -> Bytes {
    let payload_bytes = serde_json::to_vec(&message.payload).expect("payload is always serializable");
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload_bytes.len());
    buf.put_u8(frame_kind_byte(message));
    buf.put_slice(message.suite_id.as_bytes());
    buf.put_slice(message.runner_id.as_bytes());
    buf.put_slice(&payload_bytes);
    buf.freeze()
}

/// Decodes a wire-form frame back into a [`FramedMessage`].
pub fn decode(mut bytes: Bytes) -> Result<FramedMessage, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::Truncated { len: bytes.len() });
    }
    let type_byte = bytes.get_u8();
    let kind = FrameKind::from_byte(type_byte).ok_or(DecodeError::UnknownType { byte: type_byte })?;

    let mut suite_id = [0u8; 16];
    bytes.copy_to_slice(&mut suite_id);
    let mut runner_id = [0u8; 16];
    bytes.copy_to_slice(&mut runner_id);

    let payload: Payload = serde_json::from_slice(&bytes)?;
    if !payload_matches_kind(&payload, kind) {
        return Err(DecodeError::TypeMismatch);
    }

    Ok(FramedMessage {
        kind,
        suite_id: UnitId::new(suite_id),
        runner_id: UnitId::new(runner_id),
        payload,
    })
}

fn frame_kind_byte(message: &FramedMessage) -> u8 {
    message.kind.as_byte()
}

fn payload_matches_kind(payload: &Payload, kind: FrameKind) -> bool {
    matches!(
        (payload, kind),
        (Payload::Log(_), FrameKind::Log)
            | (Payload::Status(_), FrameKind::Status)
            | (Payload::Error(_), FrameKind::Error)
            | (Payload::Action(_), FrameKind::Action)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::payload::{ActionKind, ActionPayload, EventScope};
    use proptest::prelude::*;

    fn sample_message() -> FramedMessage {
        FramedMessage {
            kind: FrameKind::Action,
            suite_id: UnitId::new([1; 16]),
            runner_id: UnitId::new([2; 16]),
            payload: Payload::Action(ActionPayload {
                scope: EventScope::Test,
                action: ActionKind::Success,
                errors: vec![],
                ancestry: vec!["auth".to_string(), "login".to_string()],
                duration_ms: 12,
                location: None,
                description: "logs in".to_string(),
            }),
        }
    }

    #[test]
    fn round_trips_a_sample_message() {
        let message = sample_message();
        let bytes = encode(&message);
        let decoded = decode(bytes).unwrap();
        assert_eq!(decoded.suite_id.as_bytes(), message.suite_id.as_bytes());
        assert_eq!(decoded.runner_id.as_bytes(), message.runner_id.as_bytes());
        assert!(matches!(decoded.payload, Payload::Action(_)));
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = Bytes::from_static(&[0u8; 10]);
        assert!(matches!(decode(bytes), Err(DecodeError::Truncated { len: 10 })));
    }

    #[test]
    fn rejects_unknown_type_byte() {
        let mut buf = BytesMut::new();
        buf.put_u8(255);
        buf.put_slice(&[0u8; 32]);
        buf.put_slice(b"{}");
        assert!(matches!(
            decode(buf.freeze()),
            Err(DecodeError::UnknownType { byte: 255 })
        ));
    }

    proptest! {
        #[test]
        fn round_trip_holds_for_arbitrary_ancestries(
            ancestry in prop::collection::vec("[a-z]{1,8}", 0..5),
            duration_ms in 0u64..100_000,
        ) {
            let message = FramedMessage {
                kind: FrameKind::Action,
                suite_id: UnitId::new([7; 16]),
                runner_id: UnitId::new([9; 16]),
                payload: Payload::Action(ActionPayload {
                    scope: EventScope::Describe,
                    action: ActionKind::Failure,
                    errors: vec![],
                    ancestry: ancestry.clone(),
                    duration_ms,
                    location: None,
                    description: "suite".to_string(),
                }),
            };
            let decoded = decode(encode(&message)).unwrap();
            let Payload::Action(decoded_action) = decoded.payload else {
                panic!("expected an action payload");
            };
            prop_assert_eq!(decoded_action.ancestry, ancestry);
            prop_assert_eq!(decoded_action.duration_ms, duration_ms);
        }
    }
}
