//! Row types for the `control` logical store: clients, deposit accounts, deposit claims,
//! and the per-subtask arbitration summary.
//!
//! Columns that hold one of the crate's hex/byte newtypes are stored in their raw SQL
//! form (`bytea`/`text`) and converted with the corresponding `TryFrom` at the edge of the
//! store, rather than fought into `sqlx::FromRow`'s column-level `try_from`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{EthereumAddress, PublicKey, TransactionHash};

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ClientRow {
    pub id: i64,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: i64,
    pub public_key: PublicKey,
}

impl TryFrom<ClientRow> for Client {
    type Error = crate::types::PublicKeyError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        Ok(Client {
            id: row.id,
            public_key: PublicKey::from_bytes(&row.public_key)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DepositAccountRow {
    pub id: i64,
    pub client_id: i64,
    pub ethereum_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositAccount {
    pub id: i64,
    pub client_id: i64,
    pub ethereum_address: EthereumAddress,
}

impl TryFrom<DepositAccountRow> for DepositAccount {
    type Error = crate::types::EthereumAddressError;

    fn try_from(row: DepositAccountRow) -> Result<Self, Self::Error> {
        Ok(DepositAccount {
            id: row.id,
            client_id: row.client_id,
            ethereum_address: EthereumAddress::from_hex(&row.ethereum_address)?,
        })
    }
}

/// The use case a [`DepositClaim`] was raised under. Determines which Bankster operation
/// may create or finalize it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConcentUseCase {
    ForcedAcceptance,
    AdditionalVerification,
    ForcedPayment,
    ForcedTaskResult,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DepositClaimRow {
    pub id: i64,
    pub payer_deposit_account_id: i64,
    pub payee_ethereum_address: String,
    pub subtask_id: Option<String>,
    pub concent_use_case: ConcentUseCase,
    pub amount: Decimal,
    pub tx_hash: Option<String>,
    pub closure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositClaim {
    pub id: i64,
    pub payer_deposit_account_id: i64,
    pub payee_ethereum_address: EthereumAddress,
    pub subtask_id: Option<String>,
    pub concent_use_case: ConcentUseCase,
    pub amount: Decimal,
    pub tx_hash: Option<TransactionHash>,
    pub closure_time: Option<DateTime<Utc>>,
}

impl TryFrom<DepositClaimRow> for DepositClaim {
    type Error = crate::store::error::StoreError;

    fn try_from(row: DepositClaimRow) -> Result<Self, Self::Error> {
        let tx_hash = row
            .tx_hash
            .as_deref()
            .map(TransactionHash::from_hex)
            .transpose()?;
        Ok(DepositClaim {
            id: row.id,
            payer_deposit_account_id: row.payer_deposit_account_id,
            payee_ethereum_address: EthereumAddress::from_hex(&row.payee_ethereum_address)?,
            subtask_id: row.subtask_id,
            concent_use_case: row.concent_use_case,
            amount: row.amount,
            tx_hash,
            closure_time: row.closure_time,
        })
    }
}

/// Arbitration state for one subtask. Only the subset of fields Bankster reads is modeled
/// here; the message payloads themselves are opaque blobs to this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtaskState {
    Reported,
    ForcingAcceptance,
    Accepted,
    Rejected,
    ForcingResultTransfer,
    Failed,
    AdditionalVerification,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SubtaskRow {
    pub id: i64,
    pub subtask_id: String,
    pub state: SubtaskState,
    pub requestor_ethereum_address: String,
    pub provider_ethereum_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub id: i64,
    pub subtask_id: String,
    pub state: SubtaskState,
    pub requestor_ethereum_address: EthereumAddress,
    pub provider_ethereum_address: EthereumAddress,
}

impl TryFrom<SubtaskRow> for Subtask {
    type Error = crate::store::error::StoreError;

    fn try_from(row: SubtaskRow) -> Result<Self, Self::Error> {
        Ok(Subtask {
            id: row.id,
            subtask_id: row.subtask_id,
            state: row.state,
            requestor_ethereum_address: EthereumAddress::from_hex(
                &row.requestor_ethereum_address,
            )?,
            provider_ethereum_address: EthereumAddress::from_hex(
                &row.provider_ethereum_address,
            )?,
        })
    }
}
