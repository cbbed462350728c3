//! Abstract view of the on-chain smart-contract interface Bankster depends on.
//!
//! The real implementation lives outside this crate's scope (it talks to an Ethereum
//! client); this trait is the seam Bankster is written against, in the same style the
//! original facilitator trait exposed `verify`/`settle` over `impl Future` rather than
//! `async-trait`, so implementors keep zero-cost async without boxing.

use std::fmt::{Debug, Display};
use std::future::Future;

use crate::timestamp::UnixTimestamp;
use crate::types::{EthereumAddress, TransactionHash};

/// A confirmed ERC20-style batch transfer observed on-chain between a payer and a payee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTransferEvent {
    pub amount: u128,
    pub timestamp: UnixTimestamp,
}

/// A confirmed forced-payment transaction observed on-chain between a requestor and provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedPaymentEvent {
    pub amount: u128,
    pub timestamp: UnixTimestamp,
}

/// The abstract oracle interface, surfacing exactly the on-chain calls Bankster needs.
///
/// Implementors are expected to suspend only on network I/O and to hold no lock across
/// the `await` points these methods introduce — Bankster never calls the oracle while
/// holding a database row lock.
pub trait ChainOracle {
    type Error: Debug + Display + Send + Sync + 'static;

    /// Reads the current on-chain deposit balance for `address`.
    fn get_deposit_value(
        &self,
        address: EthereumAddress,
    ) -> impl Future<Output = Result<u128, Self::Error>> + Send;

    /// Lists batch transfer events between `payer` and `payee` within the given block window.
    fn get_batch_transfers(
        &self,
        payer: EthereumAddress,
        payee: EthereumAddress,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<BatchTransferEvent>, Self::Error>> + Send;

    /// Lists forced-payment events between `requestor` and `provider` within the given block window.
    fn get_forced_payments(
        &self,
        requestor: EthereumAddress,
        provider: EthereumAddress,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<ForcedPaymentEvent>, Self::Error>> + Send;

    /// Forces a payment from `requestor` to `provider` for a specific disputed subtask.
    fn force_subtask_payment(
        &self,
        requestor: EthereumAddress,
        provider: EthereumAddress,
        amount: u128,
        subtask_id: &str,
    ) -> impl Future<Output = Result<TransactionHash, Self::Error>> + Send;

    /// Pays the provider's additional-verification cost out of the provider's own deposit.
    fn cover_additional_verification_cost(
        &self,
        provider: EthereumAddress,
        amount: u128,
        subtask_id: &str,
    ) -> impl Future<Output = Result<TransactionHash, Self::Error>> + Send;

    /// Forces a batch payment from `requestor` to `provider` covering acceptances up to `closure_time`.
    fn force_payment(
        &self,
        requestor: EthereumAddress,
        provider: EthereumAddress,
        amount: u128,
        closure_time: UnixTimestamp,
    ) -> impl Future<Output = Result<TransactionHash, Self::Error>> + Send;

    /// Registers a callback to be invoked once `tx_hash` reaches confirmation depth.
    ///
    /// Implemented as a command-pattern handoff: the oracle retains only `(tx_hash, claim_id)`
    /// and looks the claim up fresh on confirmation, rather than holding a reference to a
    /// live `DepositClaim`, so the callback survives process restarts and claim mutation.
    fn call_on_confirmed_transaction(
        &self,
        tx_hash: TransactionHash,
        claim_id: i64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
