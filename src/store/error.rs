use crate::types::{EthereumAddressError, PublicKeyError, TransactionHashError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed public key in row: {0}")]
    PublicKey(#[from] PublicKeyError),
    #[error("malformed ethereum address in row: {0}")]
    EthereumAddress(#[from] EthereumAddressError),
    #[error("malformed transaction hash in row: {0}")]
    TransactionHash(#[from] TransactionHashError),
    /// `get_or_create_safely` exhausted its retries against a unique-constraint race.
    #[error("get-or-create retries exhausted for {entity}")]
    RaceRetryExhausted { entity: &'static str },
    #[error("deposit claim {0} does not exist")]
    ClaimMissing(i64),
}
