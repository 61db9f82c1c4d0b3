use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{block::block_digest, pool::PendingPool, Address, Block, Hash, RejectReason, Transaction, TxSummary};

/// What a miner sends back once it has found a nonce for a challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionPackage {
    #[serde(with = "hex::serde")]
    pub solution_hash: Hash,
    pub transactions: Vec<TxSummary>,
    pub nonce: u64,
    pub miner: Address,
    pub timestamp: u64,
    #[serde(with = "hex::serde")]
    pub claimed_previous_hash: Hash,
}

pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}

/// `difficulty` is the number of leading zero bits required; 0 accepts any hash.
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    count_leading_zero_bits(hash) >= difficulty
}

/// Checks a solution against the current head and pending pool, stopping at
/// the first failed rule. On success returns the pending transactions the
/// package names, in package order.
pub fn verify_solution(
    package: &SolutionPackage,
    head: &Block,
    pending: &PendingPool,
    difficulty: u32,
) -> Result<Vec<Transaction>, RejectReason> {
    if package.claimed_previous_hash != head.hash {
        return Err(RejectReason::StaleChallenge);
    }
    if package.transactions.is_empty() {
        return Err(RejectReason::EmptyBlock);
    }

    let mut seen = HashSet::with_capacity(package.transactions.len());
    let mut selected = Vec::with_capacity(package.transactions.len());
    for summary in &package.transactions {
        if !seen.insert(summary.id) {
            debug!(id = %summary.id, "transaction listed twice in solution");
            return Err(RejectReason::UnknownTransaction);
        }
        // Match by id, then make sure the miner hashed what is actually pending.
        match pending.get(&summary.id) {
            Some(tx) if tx.basic_info() == *summary => selected.push(tx.clone()),
            _ => {
                debug!(id = %summary.id, "transaction not pending");
                return Err(RejectReason::UnknownTransaction);
            }
        }
    }

    let rebuilt = block_digest(
        &package.claimed_previous_hash,
        package.timestamp,
        &package.transactions,
        package.nonce,
    );
    if rebuilt != package.solution_hash {
        return Err(RejectReason::BadSolution);
    }
    if !meets_difficulty(&package.solution_hash, difficulty) {
        return Err(RejectReason::InsufficientWork);
    }
    Ok(selected)
}

/// Searches nonces in parallel until the digest has at least `difficulty`
/// leading zero bits. Returns the winning nonce and hash.
pub fn solve(previous_hash: &Hash, timestamp: u64, txs: &[TxSummary], difficulty: u32) -> (u64, Hash) {
    let nonce = (0u64..u64::MAX)
        .into_par_iter()
        .find_any(|nonce| meets_difficulty(&block_digest(previous_hash, timestamp, txs, *nonce), difficulty))
        .unwrap_or(u64::MAX);
    (nonce, block_digest(previous_hash, timestamp, txs, nonce))
}

/// Solves a challenge and assembles the package a miner would submit.
pub fn solve_package(
    previous_hash: Hash,
    transactions: Vec<TxSummary>,
    difficulty: u32,
    miner: Address,
    timestamp: u64,
) -> SolutionPackage {
    let (nonce, solution_hash) = solve(&previous_hash, timestamp, &transactions, difficulty);
    SolutionPackage {
        solution_hash,
        transactions,
        nonce,
        miner,
        timestamp,
        claimed_previous_hash: previous_hash,
    }
}
