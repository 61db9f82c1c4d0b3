use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{block::genesis_previous_hash, Address, Block, BlockRef, SignatureVerifier, TxId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    /// Block sits at the wrong position.
    IndexMismatch { found: u64 },
    /// Stored hash differs from the recomputed digest.
    HashMismatch,
    /// A transaction no longer verifies against its sender.
    BadSignature { tx: TxId },
    /// A transaction is not marked as mined into this block.
    BadBlockRef { tx: TxId },
    /// `previous_hash` does not point at the preceding block.
    BrokenLink,
    /// Genesis is not the seeded, transaction-free block.
    MalformedGenesis,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::IndexMismatch { found } => write!(f, "block claims index {found}"),
            ValidationFailure::HashMismatch => write!(f, "hash does not match contents"),
            ValidationFailure::BadSignature { tx } => write!(f, "transaction {tx} has a bad signature"),
            ValidationFailure::BadBlockRef { tx } => {
                write!(f, "transaction {tx} does not point back at its block")
            }
            ValidationFailure::BrokenLink => write!(f, "previous hash does not match prior block"),
            ValidationFailure::MalformedGenesis => write!(f, "malformed genesis block"),
        }
    }
}

/// Outcome of a full-chain audit. A failure is tamper evidence, not an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationResult {
    Valid,
    Invalid { index: u64, reason: ValidationFailure },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Walks the chain from genesis and reports the first broken block. Pure:
/// it looks only at `chain`.
///
/// Per block: position, then recomputed hash, then every signature and
/// back-reference, then the link to the previous block. Genesis has no predecessor; instead its
/// previous hash must be the bootstrap seed digest and it must be empty.
pub fn validate_chain(
    chain: &[Block],
    verifier: &dyn SignatureVerifier,
    reward_source: &Address,
) -> ValidationResult {
    for (i, block) in chain.iter().enumerate() {
        let index = i as u64;
        let fail = |reason| ValidationResult::Invalid { index, reason };

        if block.index != index {
            return fail(ValidationFailure::IndexMismatch { found: block.index });
        }
        if block.hash != block.recompute_hash() {
            return fail(ValidationFailure::HashMismatch);
        }
        if let Some(tx) = block
            .transactions
            .iter()
            .find(|tx| !tx.verify(verifier, reward_source))
        {
            return fail(ValidationFailure::BadSignature { tx: tx.id() });
        }
        let block_ref = BlockRef {
            index,
            hash: block.hash,
        };
        if let Some(tx) = block
            .transactions
            .iter()
            .find(|tx| !tx.is_mined() || tx.block_ref() != Some(&block_ref))
        {
            return fail(ValidationFailure::BadBlockRef { tx: tx.id() });
        }
        match i.checked_sub(1).map(|prev| &chain[prev]) {
            Some(prev) if block.previous_hash != prev.hash => {
                return fail(ValidationFailure::BrokenLink);
            }
            None if block.previous_hash != genesis_previous_hash() || !block.transactions.is_empty() => {
                return fail(ValidationFailure::MalformedGenesis);
            }
            _ => {}
        }
    }
    ValidationResult::Valid
}
