//! Transactional access to the `control` store: clients, deposit accounts, deposit claims,
//! and subtask arbitration summaries. Every multi-row write Bankster performs goes through
//! a single `sqlx::Transaction` here, matching the "single transaction on `control`" rule.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use super::error::StoreError;
use super::models::{
    Client, ClientRow, ConcentUseCase, DepositAccount, DepositAccountRow, DepositClaim,
    DepositClaimRow, Subtask, SubtaskRow,
};
use crate::types::{EthereumAddress, PublicKey, TransactionHash};

/// Retries a get-or-create against a unique-constraint race this many times before giving up.
const GET_OR_CREATE_RETRIES: u32 = 3;

/// Finds or inserts a [`Client`] by public key, race-safe under concurrent callers: the
/// insert is attempted first, and a conflict falls back to a plain select, retried a
/// bounded number of times in case the concurrent inserter hasn't committed yet.
pub async fn get_or_create_client(
    tx: &mut Transaction<'_, Postgres>,
    public_key: &PublicKey,
) -> Result<Client, StoreError> {
    for _ in 0..GET_OR_CREATE_RETRIES {
        let inserted = sqlx::query_as::<_, ClientRow>(
            "INSERT INTO clients (public_key) VALUES ($1) \
             ON CONFLICT (public_key) DO NOTHING \
             RETURNING id, public_key",
        )
        .bind(public_key.0.as_slice())
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = inserted {
            return Ok(Client::try_from(row)?);
        }

        let existing = sqlx::query_as::<_, ClientRow>(
            "SELECT id, public_key FROM clients WHERE public_key = $1",
        )
        .bind(public_key.0.as_slice())
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = existing {
            return Ok(Client::try_from(row)?);
        }
    }
    Err(StoreError::RaceRetryExhausted { entity: "Client" })
}

/// Finds or inserts a [`DepositAccount`] for `(client_id, ethereum_address)`, with the same
/// race-safety as [`get_or_create_client`].
pub async fn get_or_create_deposit_account(
    tx: &mut Transaction<'_, Postgres>,
    client_id: i64,
    ethereum_address: &EthereumAddress,
) -> Result<DepositAccount, StoreError> {
    let address_hex = ethereum_address.to_hex();
    for _ in 0..GET_OR_CREATE_RETRIES {
        let inserted = sqlx::query_as::<_, DepositAccountRow>(
            "INSERT INTO deposit_accounts (client_id, ethereum_address) VALUES ($1, $2) \
             ON CONFLICT (client_id, ethereum_address) DO NOTHING \
             RETURNING id, client_id, ethereum_address",
        )
        .bind(client_id)
        .bind(&address_hex)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = inserted {
            return Ok(DepositAccount::try_from(row)?);
        }

        let existing = sqlx::query_as::<_, DepositAccountRow>(
            "SELECT id, client_id, ethereum_address FROM deposit_accounts \
             WHERE client_id = $1 AND ethereum_address = $2",
        )
        .bind(client_id)
        .bind(&address_hex)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = existing {
            return Ok(DepositAccount::try_from(row)?);
        }
    }
    Err(StoreError::RaceRetryExhausted {
        entity: "DepositAccount",
    })
}

/// Locks the `DepositAccount` row for the duration of the transaction. Every claim
/// admission/finalization decision brackets its read-sum-decide sequence with this lock.
///
/// A `DepositAccount` a claim references disappearing out from under a lock is an
/// invariant violation, not a recoverable condition — panics rather than returning an
/// error, matching the original's unhandled `DoesNotExist`.
pub async fn lock_deposit_account(
    tx: &mut Transaction<'_, Postgres>,
    deposit_account_id: i64,
) -> Result<(), StoreError> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM deposit_accounts WHERE id = $1 FOR UPDATE",
    )
    .bind(deposit_account_id)
    .fetch_optional(&mut **tx)
    .await?;
    found.expect("deposit account referenced by a claim no longer exists");
    Ok(())
}

/// Sums the `amount` of every claim with `payer_deposit_account_id`, zero if none exist.
pub async fn sum_claims_for_account(
    tx: &mut Transaction<'_, Postgres>,
    deposit_account_id: i64,
) -> Result<Decimal, StoreError> {
    let sum: Option<Decimal> = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM deposit_claims WHERE payer_deposit_account_id = $1",
    )
    .bind(deposit_account_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(sum.unwrap_or(Decimal::ZERO))
}

/// Same as [`sum_claims_for_account`] but excludes one claim id, for finalize's "sum of
/// all OTHER claims" step.
pub async fn sum_other_claims_for_account(
    tx: &mut Transaction<'_, Postgres>,
    deposit_account_id: i64,
    excluding_claim_id: i64,
) -> Result<Decimal, StoreError> {
    let sum: Option<Decimal> = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM deposit_claims \
         WHERE payer_deposit_account_id = $1 AND id != $2",
    )
    .bind(deposit_account_id)
    .bind(excluding_claim_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(sum.unwrap_or(Decimal::ZERO))
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_claim(
    tx: &mut Transaction<'_, Postgres>,
    payer_deposit_account_id: i64,
    payee_ethereum_address: &EthereumAddress,
    subtask_id: Option<&str>,
    concent_use_case: ConcentUseCase,
    amount: Decimal,
    tx_hash: Option<&TransactionHash>,
    closure_time: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<DepositClaim, StoreError> {
    let row = sqlx::query_as::<_, DepositClaimRow>(
        "INSERT INTO deposit_claims \
         (payer_deposit_account_id, payee_ethereum_address, subtask_id, concent_use_case, amount, tx_hash, closure_time) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id, payer_deposit_account_id, payee_ethereum_address, subtask_id, concent_use_case, amount, tx_hash, closure_time",
    )
    .bind(payer_deposit_account_id)
    .bind(payee_ethereum_address.to_hex())
    .bind(subtask_id)
    .bind(concent_use_case)
    .bind(amount)
    .bind(tx_hash.map(TransactionHash::to_hex))
    .bind(closure_time)
    .fetch_one(&mut **tx)
    .await?;
    Ok(DepositClaim::try_from(row)?)
}

pub async fn delete_claim(
    tx: &mut Transaction<'_, Postgres>,
    claim_id: i64,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM deposit_claims WHERE id = $1")
        .bind(claim_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Sets `amount` and/or `tx_hash` on an existing claim. `tx_hash` is write-once by
/// convention of the callers; nothing here re-checks that invariant at the SQL level.
pub async fn update_claim_amount_and_tx_hash(
    tx: &mut Transaction<'_, Postgres>,
    claim_id: i64,
    amount: Decimal,
    tx_hash: &TransactionHash,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE deposit_claims SET amount = $2, tx_hash = $3 WHERE id = $1")
        .bind(claim_id)
        .bind(amount)
        .bind(tx_hash.to_hex())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn find_subtask_by_subtask_id(
    pool: &PgPool,
    subtask_id: &str,
) -> Result<Option<Subtask>, StoreError> {
    let row = sqlx::query_as::<_, SubtaskRow>(
        "SELECT id, subtask_id, state, requestor_ethereum_address, provider_ethereum_address \
         FROM subtasks WHERE subtask_id = $1",
    )
    .bind(subtask_id)
    .fetch_optional(pool)
    .await?;
    row.map(Subtask::try_from).transpose()
}

pub async fn find_claim_by_id(
    pool: &PgPool,
    claim_id: i64,
) -> Result<DepositClaim, StoreError> {
    let row = sqlx::query_as::<_, DepositClaimRow>(
        "SELECT id, payer_deposit_account_id, payee_ethereum_address, subtask_id, \
                concent_use_case, amount, tx_hash, closure_time \
         FROM deposit_claims WHERE id = $1",
    )
    .bind(claim_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::ClaimMissing(claim_id))?;
    Ok(DepositClaim::try_from(row)?)
}

/// Panics if the account is missing — see [`lock_deposit_account`].
pub async fn find_deposit_account(
    pool: &PgPool,
    deposit_account_id: i64,
) -> Result<DepositAccount, StoreError> {
    let row = sqlx::query_as::<_, DepositAccountRow>(
        "SELECT id, client_id, ethereum_address FROM deposit_accounts WHERE id = $1",
    )
    .bind(deposit_account_id)
    .fetch_optional(pool)
    .await?
    .expect("deposit account referenced by a claim no longer exists");
    Ok(DepositAccount::try_from(row)?)
}
