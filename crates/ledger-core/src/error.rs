use thiserror::Error;

use crate::TxId;

/// Why a submitted proof-of-work solution was turned down. The chain is left
/// untouched in every case and the miner may retry with fresh mining info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("solution targets a superseded chain head")]
    StaleChallenge,
    #[error("solution carries no transactions")]
    EmptyBlock,
    #[error("solution references a transaction that is not pending")]
    UnknownTransaction,
    #[error("solution hash does not match the block contents")]
    BadSolution,
    #[error("solution hash does not meet the difficulty target")]
    InsufficientWork,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transfer amount must be greater than zero")]
    InvalidAmount,

    #[error("signature does not verify against the sender")]
    InvalidSignature,

    #[error("transaction {0} is already known")]
    DuplicateTransaction(TxId),

    #[error("solution rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error("no block with index {index} (chain length {len})")]
    OutOfBounds { index: u64, len: u64 },

    #[error("storage failure: {0:#}")]
    StorageFailure(#[source] anyhow::Error),
}

impl LedgerError {
    /// Storage failures leave the ledger unchanged and may simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageFailure(_) | LedgerError::Rejected(_))
    }
}
