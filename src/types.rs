//! Core identifiers shared by the deposit-claim ledger, the oracle interface, and the
//! arbitration layer: raw public keys, Ethereum addresses, and transaction hashes.
//!
//! These mirror the fixed-length hex wrapper style used throughout the protocol types:
//! a thin newtype with custom [`Serialize`]/[`Deserialize`] that enforces the wire length
//! up front, so malformed addresses fail at the deserialization boundary rather than deep
//! inside Bankster.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

/// Length of a raw ECDSA public key on the curve this system signs with (uncompressed,
/// without the leading format byte).
pub const PUBLIC_KEY_LEN: usize = 64;

/// A raw ECDSA public key, used to identify a [`Client`](crate::store::models::Client)
/// and to verify frame signatures in the MiddleMan relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PublicKeyError> {
        let array: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| PublicKeyError(bytes.len()))?;
        Ok(PublicKey(array))
    }

    /// Derives the Ethereum address that signs on behalf of this public key: the low 20
    /// bytes of the Keccak-256 hash of the uncompressed key.
    pub fn to_ethereum_address(&self) -> EthereumAddress {
        let hash = alloy_primitives::keccak256(self.0);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        EthereumAddress(address)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("public key must be {PUBLIC_KEY_LEN} bytes, got {0}")]
pub struct PublicKeyError(usize);

impl Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| D::Error::custom("public key must be 0x-prefixed hex"))?;
        PublicKey::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

/// A 20-byte Ethereum address. When represented as hex it is `0x` + 40 hex chars (42 total),
/// per the data model's fixed-length invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthereumAddress(pub [u8; 20]);

impl EthereumAddress {
    pub const HEX_LEN: usize = 42;

    pub fn from_hex(s: &str) -> Result<Self, EthereumAddressError> {
        static ADDR_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));
        if !ADDR_REGEX.is_match(s) {
            return Err(EthereumAddressError(s.to_string()));
        }
        let bytes = hex::decode(&s[2..]).map_err(|_| EthereumAddressError(s.to_string()))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| EthereumAddressError(s.to_string()))?;
        Ok(EthereumAddress(array))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid Ethereum address: {0}")]
pub struct EthereumAddressError(String);

impl Display for EthereumAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for EthereumAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EthereumAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EthereumAddress::from_hex(&s).map_err(D::Error::custom)
    }
}

impl From<alloy_primitives::Address> for EthereumAddress {
    fn from(address: alloy_primitives::Address) -> Self {
        EthereumAddress(address.into_array())
    }
}

impl From<EthereumAddress> for alloy_primitives::Address {
    fn from(address: EthereumAddress) -> Self {
        alloy_primitives::Address::from(address.0)
    }
}

/// A 32-byte on-chain transaction hash. Once written to a [`DepositClaim`](crate::store::models::DepositClaim)
/// it is never rewritten — see `discard_claim` and `finalize_payment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHash(pub [u8; 32]);

impl TransactionHash {
    pub const HEX_LEN: usize = 66;

    /// Normalizes a hash returned by the oracle to the fixed wire length, left-padding
    /// with zero bytes if the oracle returned a shorter value.
    pub fn normalize(raw: &[u8]) -> Result<Self, TransactionHashError> {
        if raw.len() > 32 {
            return Err(TransactionHashError(raw.len()));
        }
        let mut array = [0u8; 32];
        array[32 - raw.len()..].copy_from_slice(raw);
        Ok(TransactionHash(array))
    }

    pub fn from_hex(s: &str) -> Result<Self, TransactionHashError> {
        let bytes =
            hex::decode(s.trim_start_matches("0x")).map_err(|_| TransactionHashError(s.len()))?;
        Self::normalize(&bytes)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid transaction hash (source length {0})")]
pub struct TransactionHashError(usize);

impl Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TransactionHash::from_hex(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethereum_address_round_trips() {
        let hex = "0x1111111111111111111111111111111111111111";
        let addr = EthereumAddress::from_hex(hex).unwrap();
        assert_eq!(addr.to_hex(), hex);
    }

    #[test]
    fn ethereum_address_rejects_wrong_length() {
        assert!(EthereumAddress::from_hex("0x1234").is_err());
    }

    #[test]
    fn transaction_hash_normalizes_short_hash() {
        let short = [0xAB; 4];
        let normalized = TransactionHash::normalize(&short).unwrap();
        assert_eq!(&normalized.0[28..], &short[..]);
        assert!(normalized.0[..28].iter().all(|b| *b == 0));
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        assert!(PublicKey::from_bytes(&[0u8; 10]).is_err());
    }
}
