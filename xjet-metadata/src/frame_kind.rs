// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// The `type` byte of a [`FramedMessage`](crate::summary) header.
///
/// The discriminants below are the wire values, not just enum ordinals,
/// so they must never be reordered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    /// A `console.*`-style diagnostic line.
    Log = 0,
    /// A lifecycle status transition (start/skip/todo/end).
    Status = 1,
    /// An infrastructure-level error not attributable to a single test.
    Error = 2,
    /// A terminal outcome for a test or describe block.
    Action = 3,
}

impl FrameKind {
    /// Recovers a `FrameKind` from its wire discriminant.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Log),
            1 => Some(Self::Status),
            2 => Some(Self::Error),
            3 => Some(Self::Action),
            _ => None,
        }
    }

    /// The wire discriminant for this frame kind.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, Some(FrameKind::Log))]
    #[test_case(1, Some(FrameKind::Status))]
    #[test_case(2, Some(FrameKind::Error))]
    #[test_case(3, Some(FrameKind::Action))]
    #[test_case(4, None)]
    #[test_case(255, None)]
    fn from_byte_matches_wire_contract(byte: u8, expected: Option<FrameKind>) {
        assert_eq!(FrameKind::from_byte(byte), expected);
    }

    #[test]
    fn round_trips_through_byte() {
        for kind in [FrameKind::Log, FrameKind::Status, FrameKind::Error, FrameKind::Action] {
            assert_eq!(FrameKind::from_byte(kind.as_byte()), Some(kind));
        }
    }
}
