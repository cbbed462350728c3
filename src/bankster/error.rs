use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BanksterError {
    /// `claim_deposit`'s provider-side claim would exceed the provider's deposit; any
    /// claim already created against the requestor in the same attempt is rolled back.
    #[error("provider deposit too small to cover additional verification cost")]
    TooSmallProviderDeposit,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("oracle call failed: {0}")]
    Oracle(String),
    /// An on-chain amount did not fit the store's decimal column.
    #[error("amount {0} does not fit a database-representable decimal")]
    AmountOutOfRange(u128),
}
