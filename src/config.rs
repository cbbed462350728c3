//! Configuration for the Concent service: where the relay listens, where the upstream
//! Signing Service lives, the database, and the keys and economic parameters Bankster
//! needs.

use alloy_primitives::B256;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::bankster::BanksterConfig;
use crate::relay::DEFAULT_CONNECTION_COUNTER_LIMIT;
use crate::types::{EthereumAddress, PublicKey};

/// CLI arguments for the Concent service.
#[derive(Parser, Debug)]
#[command(name = "concent")]
#[command(about = "Trusted mediator relay and deposit-claim ledger")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Service configuration.
///
/// Fields use serde defaults that fall back to environment variables, then to
/// hardcoded defaults, the same layering the CLI args env fallback uses.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the relay binds to for front-end (Golem app) connections.
    #[serde(default = "config_defaults::default_host")]
    pub host: IpAddr,
    /// Port the relay binds to for front-end connections.
    #[serde(default = "config_defaults::default_port")]
    pub port: u16,
    /// Hostname of the upstream Signing Service the relay maintains one persistent
    /// connection to.
    pub signing_service_host: String,
    /// Port of the upstream Signing Service.
    pub signing_service_port: u16,
    /// Postgres connection string for the `control` store.
    pub database_url: LiteralOrEnv<String>,
    /// Concent's own message-signing keypair: the private half signs every frame this
    /// service emits, to either side.
    pub concent_private_key: LiteralOrEnv<EvmPrivateKey>,
    /// The public half of `concent_private_key`, kept alongside it for verification and
    /// for deriving the address front-end connections authenticate Concent against.
    pub concent_public_key: PublicKey,
    /// The Signing Service's public key. The relay refuses any frame from the upstream
    /// connection that doesn't recover to this address.
    pub signing_service_public_key: PublicKey,
    /// Concent's own Ethereum address, used as payee when a deposit claim is raised
    /// against Concent itself (the `ADDITIONAL_VERIFICATION_COST` claim).
    pub concent_ethereum_address: EthereumAddress,
    /// Flat cost, in wei, of routing a subtask to additional verification.
    #[serde(with = "amount")]
    pub additional_verification_cost: u128,
    /// Average block production time in seconds, used to translate a claim's oldest
    /// relevant timestamp into a block range for the oracle's event queries.
    pub average_block_time: u64,
    /// Wrap point for connection ids and Signing Service request ids.
    #[serde(default = "config_defaults::default_connection_counter_limit")]
    pub connection_counter_limit: u64,
}

impl Config {
    /// Builds the [`BanksterConfig`] this service's Bankster calls are parameterized by.
    pub fn bankster_config(&self) -> BanksterConfig {
        BanksterConfig {
            additional_verification_cost: self.additional_verification_cost,
            concent_ethereum_address: self.concent_ethereum_address,
            average_block_time: self.average_block_time,
        }
    }

    /// The Ethereum address front-end connections must prove control of when Concent
    /// signs toward them, and the address the Signing Service's own challenge checks
    /// Concent against.
    pub fn concent_ethereum_signing_address(&self) -> EthereumAddress {
        self.concent_public_key.to_ethereum_address()
    }

    /// The address the relay requires inbound frames from the Signing Service connection
    /// to recover to.
    pub fn signing_service_ethereum_address(&self) -> EthereumAddress {
        self.signing_service_public_key.to_ethereum_address()
    }

    /// Load configuration from CLI arguments and the JSON file they point at.
    ///
    /// The config file path is determined by `--config <path>` (env `CONFIG`), defaulting
    /// to `./config.json`. Values absent from the file fall back to environment variables
    /// or hardcoded defaults during deserialization.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

mod config_defaults {
    use std::net::IpAddr;

    const DEFAULT_PORT: u16 = 9434;
    const DEFAULT_HOST: &str = "0.0.0.0";

    /// `$PORT` env var, falling back to `DEFAULT_PORT`.
    pub fn default_port() -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// `$HOST` env var, falling back to `DEFAULT_HOST`.
    pub fn default_host() -> IpAddr {
        std::env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    pub fn default_connection_counter_limit() -> u64 {
        super::DEFAULT_CONNECTION_COUNTER_LIMIT
    }
}

/// Deserializes a decimal string into a `u128`, for wei-scale amounts too large for JSON's
/// native number precision to round-trip safely.
mod amount {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"postgres://concent@localhost/concent"`
/// - Simple env var: `"$DATABASE_URL"`
/// - Braced env var: `"${DATABASE_URL}"`
///
/// Implements `Deref`/`DerefMut` for transparent access to the inner type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    #[allow(dead_code)]
    pub fn inner(&self) -> &T {
        &self.0
    }

    #[allow(dead_code)]
    pub fn into_inner(self) -> T {
        self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if s.starts_with("${") && s.ends_with('}') {
            Some(s[2..s.len() - 1].to_string())
        } else if s.starts_with('$') && s.len() > 1 {
            let var_name = &s[1..];
            if var_name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(var_name.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?
        } else {
            s
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse value: {}", e)))?;

        Ok(LiteralOrEnv(parsed))
    }
}

impl<T> Serialize for LiteralOrEnv<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

// ============================================================================
// EVM Private Key
// ============================================================================

/// A validated EVM private key (32 bytes), used to build the [`alloy_signer_local::PrivateKeySigner`]
/// the relay signs every frame with.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EvmPrivateKey(B256);

impl EvmPrivateKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_ref()
    }
}

impl PartialEq for EvmPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl FromStr for EvmPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s)
            .map(Self)
            .map_err(|e| format!("invalid EVM private key: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_or_env_resolves_braced_reference() {
        unsafe {
            std::env::set_var("CONCENT_CONFIG_TEST_VAR", "42");
        }
        let parsed: LiteralOrEnv<u16> = serde_json::from_str("\"${CONCENT_CONFIG_TEST_VAR}\"")
            .expect("deserializes");
        assert_eq!(*parsed, 42);
    }

    #[test]
    fn literal_or_env_accepts_literal_values() {
        let parsed: LiteralOrEnv<u16> = serde_json::from_str("\"7\"").expect("deserializes");
        assert_eq!(*parsed, 7);
    }

    #[test]
    fn amount_round_trips_through_decimal_string() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper(#[serde(with = "amount")] u128);

        let value = Wrapper(340_282_366_920_938_463_463_374_607_431_768_211_455);
        let json = serde_json::to_string(&value).unwrap();
        let parsed: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.0, value.0);
    }

    #[test]
    fn evm_private_key_rejects_malformed_hex() {
        assert!(EvmPrivateKey::from_str("not-a-key").is_err());
    }
}
