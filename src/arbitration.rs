//! The arbitration state machine's boundary with Bankster: only the subtask transitions
//! that call into the deposit-claim ledger live here. Everything else about a subtask's
//! lifecycle (message validation, state storage) belongs to the layer that decodes and
//! verifies the signed business messages, which is out of this crate's scope.
//!
//! Bankster assumes a single writer per `subtask_id`; serializing per-subtask transitions
//! (so two transitions for the same subtask never race each other) is this layer's job,
//! not Bankster's.

use sqlx::PgPool;

use crate::bankster::{self, BanksterConfig, BanksterError};
use crate::messages::SubtaskResultsAccepted;
use crate::oracle::ChainOracle;
use crate::store::models::ConcentUseCase;
use crate::store::DepositClaim;
use crate::timestamp::UnixTimestamp;
use crate::types::{EthereumAddress, PublicKey};

/// The outcome of a provider's force-acceptance request.
#[derive(Debug)]
pub enum ForceAcceptanceOutcome {
    /// Both claims (or just the requestor's, if no provider-side claim applied) were
    /// admitted; the service proceeds.
    Admitted {
        claim_against_requestor: DepositClaim,
        claim_against_provider: Option<DepositClaim>,
    },
    /// `claim_deposit` returned `(None, None)`: the requestor's deposit can't cover it.
    InsufficientDeposit,
}

/// Provider force-acceptance: enter FORCING_ACCEPTANCE and ask Bankster to reserve funds.
#[allow(clippy::too_many_arguments)]
pub async fn enter_forcing_acceptance<O: ChainOracle>(
    pool: &PgPool,
    oracle: &O,
    config: &BanksterConfig,
    subtask_id: &str,
    requestor_ethereum_address: EthereumAddress,
    provider_ethereum_address: EthereumAddress,
    subtask_cost: u128,
    requestor_public_key: PublicKey,
    provider_public_key: PublicKey,
) -> Result<ForceAcceptanceOutcome, BanksterError> {
    let (requestor_claim, provider_claim) = bankster::claim_deposit(
        pool,
        oracle,
        config,
        subtask_id,
        ConcentUseCase::ForcedAcceptance,
        requestor_ethereum_address,
        provider_ethereum_address,
        subtask_cost,
        requestor_public_key,
        provider_public_key,
    )
    .await?;

    match requestor_claim {
        Some(claim_against_requestor) => Ok(ForceAcceptanceOutcome::Admitted {
            claim_against_requestor,
            claim_against_provider: provider_claim,
        }),
        None => Ok(ForceAcceptanceOutcome::InsufficientDeposit),
    }
}

/// Requestor settles-overdue: pay the provider directly out of the requestor's deposit
/// for whatever the oracle hasn't already credited.
#[allow(clippy::too_many_arguments)]
pub async fn settle_overdue(
    pool: &PgPool,
    oracle: &impl ChainOracle,
    config: &BanksterConfig,
    requestor_ethereum_address: EthereumAddress,
    provider_ethereum_address: EthereumAddress,
    acceptances: &[SubtaskResultsAccepted],
    requestor_public_key: PublicKey,
    current_block: u64,
    current_time: UnixTimestamp,
) -> Result<Option<DepositClaim>, BanksterError> {
    bankster::settle_overdue_acceptances(
        pool,
        oracle,
        config,
        requestor_ethereum_address,
        provider_ethereum_address,
        acceptances,
        requestor_public_key,
        current_block,
        current_time,
    )
    .await
}

/// Acceptance resolved (accepted or rejected) or timed out toward the provider: finalize
/// the matching requestor claim into an on-chain transaction.
pub async fn resolve_acceptance(
    pool: &PgPool,
    oracle: &impl ChainOracle,
    config: &BanksterConfig,
    claim_id: i64,
) -> Result<Option<crate::types::TransactionHash>, BanksterError> {
    bankster::finalize_payment(pool, oracle, config, claim_id).await
}
