//! Errors produced while decoding a wire frame, each mapped to a stable numeric code.
//!
//! The codes are part of the wire contract (they're what gets reported back inside an
//! ERROR frame), so the discriminants must not be renumbered once published.

use std::fmt::{Display, Formatter};

/// Structural and cryptographic failures surfaced while decoding a frame.
///
/// These are all [`CURRENT_ITERATION_ENDS`](crate::relay::middleman) conditions in the
/// relay: the request producer reports them to the originating connection and keeps reading.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The frame's structure could not be parsed (too short, missing type tag, etc).
    #[error("invalid frame")]
    InvalidFrame,
    /// The signature over the frame payload did not verify against the expected peer key.
    #[error("invalid frame signature")]
    InvalidFrameSignature,
    /// The payload's type tag is unknown, or the typed body failed to deserialize.
    #[error("invalid payload")]
    InvalidPayload,
    /// An escape sequence in the payload was malformed (dangling escape byte, or an
    /// unescaped occurrence of the separator).
    #[error("broken escaping in frame")]
    BrokenEscapingInFrame,
    /// The request id field could not be parsed as the expected integer type.
    #[error("request id has invalid type")]
    RequestIdInvalidType,
    /// Catch-all for conditions that don't fit the above, e.g. the upstream connection
    /// is gone and an ERROR frame must still be produced for the originator.
    #[error("unknown error")]
    Unknown,
}

/// The stable numeric code for a [`FrameError`], as carried inside an ERROR frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameErrorCode(pub u8);

impl FrameError {
    pub fn code(&self) -> FrameErrorCode {
        match self {
            FrameError::InvalidFrame => FrameErrorCode(1),
            FrameError::InvalidFrameSignature => FrameErrorCode(2),
            FrameError::InvalidPayload => FrameErrorCode(3),
            FrameError::BrokenEscapingInFrame => FrameErrorCode(4),
            FrameError::RequestIdInvalidType => FrameErrorCode(5),
            FrameError::Unknown => FrameErrorCode(0),
        }
    }

    /// Whether this error ends the current read iteration without being fatal to the
    /// connection — every variant here is recoverable at the relay layer.
    pub fn is_current_iteration_ends(&self) -> bool {
        true
    }
}

impl Display for FrameErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
