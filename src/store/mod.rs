//! The `control` logical store: clients, deposit accounts, deposit claims, and subtask
//! arbitration summaries. Cross-store relations (to the `storage` store used by the
//! conductor's upload-report bookkeeping) are forbidden; this module never references it.

pub mod control;
pub mod error;
pub mod models;

pub use error::StoreError;
pub use models::{Client, ConcentUseCase, DepositAccount, DepositClaim, Subtask, SubtaskState};
