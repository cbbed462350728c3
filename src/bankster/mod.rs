//! Bankster: the deposit-claim ledger. Decides whether a use case may reserve funds
//! against a deposit, finalizes reserved claims into on-chain transactions, and settles
//! overdue acceptances directly against the requestor's deposit.
//!
//! Every multi-row write runs inside one `sqlx::Transaction` on the `control` store, with
//! `SELECT ... FOR UPDATE` bracketing the read-sum-decide sequence so claims against the
//! same deposit account serialize while claims against different accounts proceed
//! independently (see the concurrency model this crate documents alongside it).

pub mod error;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;

pub use error::BanksterError;

use crate::messages::SubtaskResultsAccepted;
use crate::oracle::ChainOracle;
use crate::store::control;
use crate::store::models::ConcentUseCase;
use crate::store::{DepositClaim, StoreError};
use crate::timestamp::UnixTimestamp;
use crate::types::{EthereumAddress, PublicKey, TransactionHash};

/// Bankster's own configuration, constructed once at startup and passed explicitly to
/// every call rather than threaded through a global settings object.
#[derive(Debug, Clone, Copy)]
pub struct BanksterConfig {
    pub additional_verification_cost: u128,
    pub concent_ethereum_address: EthereumAddress,
    pub average_block_time: u64,
}

fn decimal_from_u128(amount: u128) -> Result<Decimal, BanksterError> {
    Decimal::try_from(amount).map_err(|_| BanksterError::AmountOutOfRange(amount))
}

fn u128_from_decimal(amount: Decimal) -> Result<u128, BanksterError> {
    amount
        .to_u128()
        .ok_or(BanksterError::AmountOutOfRange(0))
}

/// Reserves funds against the requestor's deposit (and, for `ADDITIONAL_VERIFICATION` with
/// a nonzero configured cost, against the provider's deposit too) for one subtask. Admits
/// a claim only if the current on-chain balance strictly exceeds the sum of prior claims.
#[tracing::instrument(skip(pool, oracle, config, requestor_public_key, provider_public_key))]
pub async fn claim_deposit<O: ChainOracle>(
    pool: &PgPool,
    oracle: &O,
    config: &BanksterConfig,
    subtask_id: &str,
    concent_use_case: ConcentUseCase,
    requestor_ethereum_address: EthereumAddress,
    provider_ethereum_address: EthereumAddress,
    subtask_cost: u128,
    requestor_public_key: PublicKey,
    provider_public_key: PublicKey,
) -> Result<(Option<DepositClaim>, Option<DepositClaim>), BanksterError> {
    assert!(matches!(
        concent_use_case,
        ConcentUseCase::ForcedAcceptance | ConcentUseCase::AdditionalVerification
    ));
    assert_ne!(requestor_ethereum_address, provider_ethereum_address);
    assert!(subtask_cost > 0);

    let claim_against_provider = concent_use_case == ConcentUseCase::AdditionalVerification
        && config.additional_verification_cost > 0;

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    let requestor_client = control::get_or_create_client(&mut tx, &requestor_public_key).await?;
    let requestor_account = control::get_or_create_deposit_account(
        &mut tx,
        requestor_client.id,
        &requestor_ethereum_address,
    )
    .await?;
    let provider_account = if claim_against_provider {
        let provider_client =
            control::get_or_create_client(&mut tx, &provider_public_key).await?;
        Some(
            control::get_or_create_deposit_account(
                &mut tx,
                provider_client.id,
                &provider_ethereum_address,
            )
            .await?,
        )
    } else {
        None
    };
    tx.commit().await.map_err(StoreError::from)?;

    let requestor_deposit = oracle
        .get_deposit_value(requestor_ethereum_address)
        .await
        .map_err(|e| BanksterError::Oracle(e.to_string()))?;
    let provider_deposit = if claim_against_provider {
        Some(
            oracle
                .get_deposit_value(provider_ethereum_address)
                .await
                .map_err(|e| BanksterError::Oracle(e.to_string()))?,
        )
    } else {
        None
    };

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    control::lock_deposit_account(&mut tx, requestor_account.id).await?;
    let sum_existing_requestor =
        control::sum_claims_for_account(&mut tx, requestor_account.id).await?;

    if decimal_from_u128(requestor_deposit)? <= sum_existing_requestor {
        return Ok((None, None));
    }

    let claim_against_requestor = control::insert_claim(
        &mut tx,
        requestor_account.id,
        &provider_ethereum_address,
        Some(subtask_id),
        concent_use_case,
        decimal_from_u128(subtask_cost)?,
        None,
        None,
    )
    .await?;

    let claim_against_provider_row = if claim_against_provider {
        let provider_account = provider_account.expect("computed above when claim_against_provider");
        control::lock_deposit_account(&mut tx, provider_account.id).await?;
        let sum_existing_provider =
            control::sum_claims_for_account(&mut tx, provider_account.id).await?;
        let additional_cost = decimal_from_u128(config.additional_verification_cost)?;
        let provider_deposit = provider_deposit.expect("computed above when claim_against_provider");

        if decimal_from_u128(provider_deposit)? <= sum_existing_provider + additional_cost {
            // Dropping `tx` without committing rolls back the requestor claim too.
            return Err(BanksterError::TooSmallProviderDeposit);
        }

        Some(
            control::insert_claim(
                &mut tx,
                provider_account.id,
                &config.concent_ethereum_address,
                Some(subtask_id),
                concent_use_case,
                additional_cost,
                None,
                None,
            )
            .await?,
        )
    } else {
        None
    };

    tx.commit().await.map_err(StoreError::from)?;
    Ok((Some(claim_against_requestor), claim_against_provider_row))
}

/// Dispatches a reserved claim to an on-chain transaction, clamping the amount to the
/// payer's actual remaining headroom if their balance has shrunk since the claim was made.
#[tracing::instrument(skip(pool, oracle, config))]
pub async fn finalize_payment<O: ChainOracle>(
    pool: &PgPool,
    oracle: &O,
    config: &BanksterConfig,
    claim_id: i64,
) -> Result<Option<TransactionHash>, BanksterError> {
    let claim = control::find_claim_by_id(pool, claim_id).await?;
    assert!(claim.tx_hash.is_none(), "finalize_payment called twice on the same claim");

    let payer_account = control::find_deposit_account(pool, claim.payer_deposit_account_id).await?;
    let balance = oracle
        .get_deposit_value(payer_account.ethereum_address)
        .await
        .map_err(|e| BanksterError::Oracle(e.to_string()))?;

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    control::lock_deposit_account(&mut tx, payer_account.id).await?;
    let sum_others =
        control::sum_other_claims_for_account(&mut tx, payer_account.id, claim.id).await?;
    let available = decimal_from_u128(balance)? - sum_others;

    if available <= Decimal::ZERO {
        control::delete_claim(&mut tx, claim.id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        return Ok(None);
    }
    let amount = if available < claim.amount {
        available
    } else {
        claim.amount
    };
    let amount_u128 = u128_from_decimal(amount)?;
    // Release the row lock before the on-chain dispatch call below; it is re-acquired
    // to record the resulting tx_hash.
    tx.commit().await.map_err(StoreError::from)?;

    let tx_hash = match claim.concent_use_case {
        ConcentUseCase::ForcedAcceptance => oracle
            .force_subtask_payment(
                payer_account.ethereum_address,
                claim.payee_ethereum_address,
                amount_u128,
                claim.subtask_id.as_deref().unwrap_or_default(),
            )
            .await
            .map_err(|e| BanksterError::Oracle(e.to_string()))?,
        ConcentUseCase::AdditionalVerification => {
            let subtask_id = claim
                .subtask_id
                .as_deref()
                .expect("ADDITIONAL_VERIFICATION claim has no subtask_id");
            let subtask = control::find_subtask_by_subtask_id(pool, subtask_id)
                .await?
                .expect("subtask referenced by claim does not exist");
            if subtask.requestor_ethereum_address == payer_account.ethereum_address {
                oracle
                    .force_subtask_payment(
                        payer_account.ethereum_address,
                        claim.payee_ethereum_address,
                        amount_u128,
                        subtask_id,
                    )
                    .await
                    .map_err(|e| BanksterError::Oracle(e.to_string()))?
            } else if subtask.provider_ethereum_address == payer_account.ethereum_address {
                oracle
                    .cover_additional_verification_cost(
                        payer_account.ethereum_address,
                        amount_u128,
                        subtask_id,
                    )
                    .await
                    .map_err(|e| BanksterError::Oracle(e.to_string()))?
            } else {
                panic!("deposit account is neither requestor nor provider for its own subtask");
            }
        }
        ConcentUseCase::ForcedPayment | ConcentUseCase::ForcedTaskResult => {
            unreachable!("finalize_payment only dispatches FORCED_ACCEPTANCE/ADDITIONAL_VERIFICATION claims")
        }
    };

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    control::lock_deposit_account(&mut tx, payer_account.id).await?;
    control::update_claim_amount_and_tx_hash(&mut tx, claim.id, amount, &tx_hash).await?;
    tx.commit().await.map_err(StoreError::from)?;

    oracle
        .call_on_confirmed_transaction(tx_hash, claim.id)
        .await
        .map_err(|e| BanksterError::Oracle(e.to_string()))?;

    Ok(Some(tx_hash))
}

/// Pays the provider directly out of the requestor's deposit for the amount owed across a
/// batch of overdue acceptances, net of whatever the oracle already reports as paid.
#[tracing::instrument(skip(pool, oracle, config, acceptances, requestor_public_key))]
#[allow(clippy::too_many_arguments)]
pub async fn settle_overdue_acceptances<O: ChainOracle>(
    pool: &PgPool,
    oracle: &O,
    config: &BanksterConfig,
    requestor_ethereum_address: EthereumAddress,
    provider_ethereum_address: EthereumAddress,
    acceptances: &[SubtaskResultsAccepted],
    requestor_public_key: PublicKey,
    current_block: u64,
    current_time: UnixTimestamp,
) -> Result<Option<DepositClaim>, BanksterError> {
    assert_ne!(requestor_ethereum_address, provider_ethereum_address);
    assert!(!acceptances.is_empty());

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    let requestor_client = control::get_or_create_client(&mut tx, &requestor_public_key).await?;
    tx.commit().await.map_err(StoreError::from)?;

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    let requestor_account = control::get_or_create_deposit_account(
        &mut tx,
        requestor_client.id,
        &requestor_ethereum_address,
    )
    .await?;
    tx.commit().await.map_err(StoreError::from)?;

    let requestor_deposit = oracle
        .get_deposit_value(requestor_ethereum_address)
        .await
        .map_err(|e| BanksterError::Oracle(e.to_string()))?;

    // First locking pass: bail out early if the requestor's deposit is already fully
    // claimed, without holding the row lock across the oracle calls that follow.
    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    control::lock_deposit_account(&mut tx, requestor_account.id).await?;
    let sum_existing = control::sum_claims_for_account(&mut tx, requestor_account.id).await?;
    tx.commit().await.map_err(StoreError::from)?;

    if decimal_from_u128(requestor_deposit)? <= sum_existing {
        return Ok(None);
    }

    let t0 = acceptances
        .iter()
        .map(|a| a.payment_ts)
        .min()
        .expect("checked non-empty above");
    let t2 = acceptances
        .iter()
        .map(|a| a.payment_ts)
        .max()
        .expect("checked non-empty above");
    let from_block = t0.blocks_before(config.average_block_time, current_block, current_time);

    let batch_transfers = oracle
        .get_batch_transfers(
            requestor_ethereum_address,
            provider_ethereum_address,
            from_block,
            current_block,
        )
        .await
        .map_err(|e| BanksterError::Oracle(e.to_string()))?;
    let forced_payments = oracle
        .get_forced_payments(
            requestor_ethereum_address,
            provider_ethereum_address,
            from_block,
            current_block,
        )
        .await
        .map_err(|e| BanksterError::Oracle(e.to_string()))?;

    let amount_paid: u128 = batch_transfers.iter().map(|e| e.amount).sum::<u128>()
        + forced_payments.iter().map(|e| e.amount).sum::<u128>();
    let subtasks_price: u128 = acceptances.iter().map(|a| a.price).sum();
    let amount_pending = subtasks_price.saturating_sub(amount_paid);

    let remaining_headroom = decimal_from_u128(requestor_deposit)? - sum_existing;
    let payable = std::cmp::min(decimal_from_u128(amount_pending)?, remaining_headroom);
    if payable <= Decimal::ZERO {
        return Ok(None);
    }
    let payable_u128 = u128_from_decimal(payable)?;

    let tx_hash = oracle
        .force_payment(
            requestor_ethereum_address,
            provider_ethereum_address,
            payable_u128,
            t2,
        )
        .await
        .map_err(|e| BanksterError::Oracle(e.to_string()))?;

    let closure_time = chrono::DateTime::from_timestamp(t2.seconds_since_epoch() as i64, 0)
        .expect("closure_time does not fit a chrono timestamp");

    // Second locking pass: the transaction was submitted on-chain without holding this
    // lock, so re-acquire it before recording the claim that reserves the funds for it.
    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    control::lock_deposit_account(&mut tx, requestor_account.id).await?;
    let claim = control::insert_claim(
        &mut tx,
        requestor_account.id,
        &provider_ethereum_address,
        None,
        ConcentUseCase::ForcedPayment,
        payable,
        Some(&tx_hash),
        Some(closure_time),
    )
    .await?;
    tx.commit().await.map_err(StoreError::from)?;

    Ok(Some(claim))
}

/// Releases the funds a claim reserved. A no-op (returns `false`) until the claim's
/// transaction has confirmed and `tx_hash` has been set.
#[tracing::instrument(skip(pool))]
pub async fn discard_claim(pool: &PgPool, claim_id: i64) -> Result<bool, BanksterError> {
    let claim = control::find_claim_by_id(pool, claim_id).await?;

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    control::lock_deposit_account(&mut tx, claim.payer_deposit_account_id).await?;

    if claim.tx_hash.is_none() {
        return Ok(false);
    }

    control::delete_claim(&mut tx, claim.id).await?;
    tx.commit().await.map_err(StoreError::from)?;
    Ok(true)
}
