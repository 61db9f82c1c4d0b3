use anyhow::{bail, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Block, Transaction, TxId};

/// A pending transaction together with its admission sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub seq: u64,
    pub tx: Transaction,
}

/// Everything a store needs to rebuild a ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    pub pending: Vec<PendingEntry>,
}

/// One atomic unit of ledger change. A store must apply all of it or none.
#[derive(Clone, Debug, Default)]
pub struct Commit {
    pub block: Option<Block>,
    pub admitted: Vec<PendingEntry>,
    pub cleared: Vec<TxId>,
}

/// Trait the storage backends implement for the ledger to persist itself.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait LedgerStore: Send + Sync {
    /// The persisted state, or `None` for a store that was never written.
    fn load(&self) -> Result<Option<LedgerSnapshot>>;
    fn commit(&self, commit: &Commit) -> Result<()>;
}

/// Volatile store, handy for tests and throwaway nodes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<LedgerSnapshot>>,
    fail_next: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail without writing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Option<LedgerSnapshot> {
        self.state.lock().clone()
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>> {
        Ok(self.snapshot())
    }

    fn commit(&self, commit: &Commit) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("injected commit failure");
        }
        let mut guard = self.state.lock();
        let state = guard.get_or_insert_with(LedgerSnapshot::default);
        if let Some(block) = &commit.block {
            state.chain.push(block.clone());
        }
        state.pending.retain(|e| !commit.cleared.contains(&e.tx.id()));
        state.pending.extend(commit.admitted.iter().cloned());
        Ok(())
    }
}
