//! Wire frame codec for the MiddleMan relay.
//!
//! A frame is `payload_bytes || signature_bytes`, escape-encoded and terminated by a
//! single separator byte. `payload_bytes` is `type_tag (1 byte) || request_id (8 bytes,
//! big-endian) || body`. See [`encode_frame`]/[`decode_frame`] for the full contract.

pub mod error;

use alloy_primitives::{Address, Signature};
use alloy_signer::Signer;
use serde::{Deserialize, Serialize};

pub use error::{FrameError, FrameErrorCode};

/// Reserved byte that introduces an escape sequence.
const ESC: u8 = 0x1B;
/// Reserved byte that terminates a frame on the wire.
const SEP: u8 = 0x1E;
/// Public alias for the separator byte, used by the stream-I/O layer to find frame
/// boundaries before handing the bytes in between to [`decode_frame`].
pub const SEP_BYTE: u8 = SEP;
/// Escaped stand-in for a literal [`ESC`] byte inside the payload.
const ESC_ESCAPED: u8 = 0x01;
/// Escaped stand-in for a literal [`SEP`] byte inside the payload.
const SEP_ESCAPED: u8 = 0x02;

const SIGNATURE_LEN: usize = 65;
const REQUEST_ID_LEN: usize = 8;
const TYPE_TAG_LEN: usize = 1;

/// The typed payload a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    GolemMessage = 0,
    Error = 1,
    AuthenticationChallenge = 2,
    AuthenticationResponse = 3,
}

impl PayloadType {
    fn from_tag(tag: u8) -> Result<Self, FrameError> {
        match tag {
            0 => Ok(PayloadType::GolemMessage),
            1 => Ok(PayloadType::Error),
            2 => Ok(PayloadType::AuthenticationChallenge),
            3 => Ok(PayloadType::AuthenticationResponse),
            _ => Err(FrameError::InvalidPayload),
        }
    }
}

/// A decoded (or pre-encode) frame: a typed body addressed by a request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload_type: PayloadType,
    pub request_id: u64,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn golem_message(request_id: u64, body: Vec<u8>) -> Self {
        Frame {
            payload_type: PayloadType::GolemMessage,
            request_id,
            body,
        }
    }

    /// Builds an ERROR frame reporting `error` for `request_id`.
    pub fn error(request_id: u64, error: FrameError) -> Self {
        Frame {
            payload_type: PayloadType::Error,
            request_id,
            body: vec![error.code().0],
        }
    }

    fn to_unsigned_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TYPE_TAG_LEN + REQUEST_ID_LEN + self.body.len());
        out.push(self.payload_type as u8);
        out.extend_from_slice(&self.request_id.to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// A typed payload that can round-trip to a frame body via serde.
pub trait FramePayload: Serialize + for<'de> Deserialize<'de> + Sized {
    const PAYLOAD_TYPE: PayloadType;

    fn to_body(&self) -> Result<Vec<u8>, FrameError> {
        serde_json::to_vec(self).map_err(|_| FrameError::InvalidPayload)
    }

    fn from_body(body: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(body).map_err(|_| FrameError::InvalidPayload)
    }
}

fn escape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    for &byte in payload {
        match byte {
            ESC => {
                out.push(ESC);
                out.push(ESC_ESCAPED);
            }
            SEP => {
                out.push(ESC);
                out.push(SEP_ESCAPED);
            }
            other => out.push(other),
        }
    }
    out
}

fn unescape(escaped: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut iter = escaped.iter().copied();
    while let Some(byte) = iter.next() {
        if byte == ESC {
            match iter.next() {
                Some(ESC_ESCAPED) => out.push(ESC),
                Some(SEP_ESCAPED) => out.push(SEP),
                _ => return Err(FrameError::BrokenEscapingInFrame),
            }
        } else if byte == SEP {
            // An unescaped separator inside the frame body means the escaping was broken
            // upstream (the caller should have split on the first unescaped SEP already).
            return Err(FrameError::BrokenEscapingInFrame);
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

/// Signs and escape-encodes `frame`, appending the trailing frame separator.
///
/// The returned bytes are ready to write to the wire as-is; callers must not add their
/// own separator.
pub async fn encode_frame<S>(frame: &Frame, signer: &S) -> Result<Vec<u8>, FrameError>
where
    S: Signer + Sync,
{
    let unsigned = frame.to_unsigned_bytes();
    let signature = signer
        .sign_message(&unsigned)
        .await
        .map_err(|_| FrameError::InvalidFrameSignature)?;
    let mut signed = unsigned;
    signed.extend_from_slice(&signature.as_bytes());

    let mut out = escape(&signed);
    out.push(SEP);
    Ok(out)
}

/// Decodes `framed_bytes` (the bytes up to but not including the trailing separator),
/// recovering the signer's address without checking it against anything. Used during the
/// authentication handshake, where the peer's address isn't known yet — it's the thing
/// being established.
pub fn decode_frame_unverified(framed_bytes: &[u8]) -> Result<(Frame, Address), FrameError> {
    let signed = unescape(framed_bytes)?;
    if signed.len() < TYPE_TAG_LEN + REQUEST_ID_LEN + SIGNATURE_LEN {
        return Err(FrameError::InvalidFrame);
    }
    let (unsigned, signature_bytes) = signed.split_at(signed.len() - SIGNATURE_LEN);
    let signature_array: [u8; SIGNATURE_LEN] = signature_bytes
        .try_into()
        .map_err(|_| FrameError::InvalidFrame)?;
    let signature =
        Signature::from_raw_array(&signature_array).map_err(|_| FrameError::InvalidFrame)?;

    let recovered = signature
        .recover_address_from_msg(unsigned)
        .map_err(|_| FrameError::InvalidFrameSignature)?;

    let type_tag = unsigned[0];
    let payload_type = PayloadType::from_tag(type_tag)?;
    let request_id_bytes: [u8; REQUEST_ID_LEN] = unsigned[TYPE_TAG_LEN..TYPE_TAG_LEN + REQUEST_ID_LEN]
        .try_into()
        .map_err(|_| FrameError::RequestIdInvalidType)?;
    let request_id = u64::from_be_bytes(request_id_bytes);
    let body = unsigned[TYPE_TAG_LEN + REQUEST_ID_LEN..].to_vec();

    Ok((
        Frame {
            payload_type,
            request_id,
            body,
        },
        recovered,
    ))
}

/// Decodes `framed_bytes` and verifies the signature against `expected_peer_address`.
pub fn decode_frame(
    framed_bytes: &[u8],
    expected_peer_address: Address,
) -> Result<Frame, FrameError> {
    let (frame, recovered) = decode_frame_unverified(framed_bytes)?;
    if recovered != expected_peer_address {
        return Err(FrameError::InvalidFrameSignature);
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer_local::PrivateKeySigner;

    fn test_signer() -> PrivateKeySigner {
        PrivateKeySigner::random()
    }

    #[tokio::test]
    async fn round_trips_a_golem_message_frame() {
        let signer = test_signer();
        let address = signer.address();
        let frame = Frame::golem_message(7, b"hello".to_vec());

        let encoded = encode_frame(&frame, &signer).await.unwrap();
        assert_eq!(*encoded.last().unwrap(), SEP);

        let body = &encoded[..encoded.len() - 1];
        let decoded = decode_frame(body, address).unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn escapes_separator_and_escape_bytes_in_body() {
        let signer = test_signer();
        let address = signer.address();
        let frame = Frame::golem_message(1, vec![ESC, SEP, 0x41, ESC, SEP]);

        let encoded = encode_frame(&frame, &signer).await.unwrap();
        // The only unescaped SEP must be the trailing terminator.
        assert_eq!(encoded.iter().filter(|&&b| b == SEP).count(), 1);
        assert_eq!(*encoded.last().unwrap(), SEP);

        let body = &encoded[..encoded.len() - 1];
        let decoded = decode_frame(body, address).unwrap();
        assert_eq!(decoded.body, vec![ESC, SEP, 0x41, ESC, SEP]);
    }

    #[tokio::test]
    async fn rejects_signature_from_wrong_key() {
        let signer = test_signer();
        let other = test_signer();
        let frame = Frame::golem_message(1, b"x".to_vec());

        let encoded = encode_frame(&frame, &signer).await.unwrap();
        let body = &encoded[..encoded.len() - 1];
        let err = decode_frame(body, other.address()).unwrap_err();
        assert_eq!(err, FrameError::InvalidFrameSignature);
    }

    #[test]
    fn rejects_dangling_escape_byte() {
        let broken = vec![ESC];
        let err = unescape(&broken).unwrap_err();
        assert_eq!(err, FrameError::BrokenEscapingInFrame);
    }

    #[test]
    fn rejects_unknown_payload_type() {
        assert_eq!(PayloadType::from_tag(99).unwrap_err(), FrameError::InvalidPayload);
    }
}
