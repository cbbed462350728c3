//! Async stream I/O: read one frame / write one frame over a byte stream.
//!
//! Both operations suspend only at the underlying `AsyncRead`/`AsyncWrite` calls and hold
//! no lock across the suspension, per the concurrency model in §5 of the design.

use alloy_primitives::Address;
use alloy_signer::Signer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::frame::{self, Frame, FrameError};

/// Reads bytes up to (but not including) the next frame separator.
async fn read_framed_bytes<R>(reader: &mut R) -> Result<Vec<u8>, ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await.map_err(ReceiveError::Io)?;
        if n == 0 {
            return Err(ReceiveError::IncompleteRead);
        }
        if byte[0] == frame::SEP_BYTE {
            return Ok(buf);
        }
        buf.push(byte[0]);
    }
}

/// Reads bytes up to and including the next frame separator, then decodes and verifies
/// the frame against `expected_peer_address`.
///
/// Returns [`FrameError::Unknown`] wrapped in [`ReceiveError::IncompleteRead`] when the
/// stream closes before a separator is seen — the caller (the request producer) treats
/// this as a normal end-of-connection condition, not a decode failure.
pub async fn receive_frame<R>(
    reader: &mut R,
    expected_peer_address: Address,
) -> Result<Frame, ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let buf = read_framed_bytes(reader).await?;
    frame::decode_frame(&buf, expected_peer_address).map_err(ReceiveError::Decode)
}

/// Reads and decodes the next frame without checking its signer, returning the recovered
/// address alongside it. Used only by the authentication handshake, before an
/// `expected_peer_address` for the connection has been established.
pub async fn receive_frame_unverified<R>(reader: &mut R) -> Result<(Frame, Address), ReceiveError>
where
    R: AsyncRead + Unpin,
{
    let buf = read_framed_bytes(reader).await?;
    frame::decode_frame_unverified(&buf).map_err(ReceiveError::Decode)
}

/// Read-side failure classification. `IncompleteRead` means the stream closed before a
/// full frame arrived — the relay treats it as an orderly disconnect, never as an error
/// frame. Any other variant is a `CURRENT_ITERATION_ENDS` condition.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("stream closed before a full frame was read")]
    IncompleteRead,
    #[error("frame decode error: {0}")]
    Decode(#[from] FrameError),
    #[error("I/O error reading frame: {0}")]
    Io(std::io::Error),
}

/// Encodes and writes `frame` to `writer` in a single call, so no other write to the
/// same stream can interleave with it.
pub async fn send_frame<W, S>(frame: &Frame, writer: &mut W, signer: &S) -> Result<(), SendError>
where
    W: AsyncWrite + Unpin,
    S: Signer + Sync,
{
    let bytes = frame::encode_frame(frame, signer)
        .await
        .map_err(SendError::Encode)?;
    writer.write_all(&bytes).await.map_err(SendError::Io)?;
    writer.flush().await.map_err(SendError::Io)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("frame encode error: {0}")]
    Encode(FrameError),
    #[error("I/O error writing frame: {0}")]
    Io(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer_local::PrivateKeySigner;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_frame_over_a_duplex_stream() {
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        let (mut client, mut server) = duplex(4096);

        let frame = Frame::golem_message(42, b"payload".to_vec());
        send_frame(&frame, &mut client, &signer).await.unwrap();

        let received = receive_frame(&mut server, address).await.unwrap();
        assert_eq!(received, frame);
    }

    #[tokio::test]
    async fn reports_incomplete_read_on_early_close() {
        let (client, mut server) = duplex(4096);
        drop(client);
        let signer = PrivateKeySigner::random();
        let err = receive_frame(&mut server, signer.address()).await.unwrap_err();
        assert!(matches!(err, ReceiveError::IncompleteRead));
    }
}
