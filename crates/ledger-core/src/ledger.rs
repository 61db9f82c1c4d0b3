use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::{
    pool::PendingPool, pow::verify_solution, validate_chain, Address, Amount, Balance, Block,
    BlockSummary, Commit, Hash, LedgerConfig, LedgerError, LedgerStore, SignatureVerifier,
    SolutionPackage, Transaction, TxId, TxSummary, ValidationResult,
};

/// Source of block timestamps, in milliseconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// The only thing external miners get to see. No signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningChallenge {
    #[serde(with = "hex::serde")]
    pub previous_hash: Hash,
    pub transactions: Vec<TxSummary>,
    pub difficulty: u32,
}

struct LedgerState {
    chain: Vec<Block>,
    pending: PendingPool,
    /// Derived from `chain`; refreshed on every accepted block.
    balances: HashMap<Address, Balance>,
    mined: HashSet<TxId>,
}

impl LedgerState {
    fn new(chain: Vec<Block>, pending: PendingPool) -> Self {
        let mut balances = HashMap::new();
        let mut mined = HashSet::new();
        for tx in chain.iter().flat_map(|b| &b.transactions) {
            apply_transfer(&mut balances, tx);
            mined.insert(tx.id());
        }
        Self {
            chain,
            pending,
            balances,
            mined,
        }
    }

    fn head(&self) -> &Block {
        self.chain.last().expect("ledger chain always holds genesis")
    }
}

fn apply_transfer(balances: &mut HashMap<Address, Balance>, tx: &Transaction) {
    let amount = Balance::from(tx.amount());
    *balances.entry(tx.from().clone()).or_default() -= amount;
    *balances.entry(tx.to().clone()).or_default() += amount;
}

/// The authoritative chain plus its pending pool.
///
/// Readers share a lock and always see whole blocks. Writers are serialized
/// end to end: verify, persist, then apply, so two solutions for the same head
/// can never both land and a failed commit changes nothing.
pub struct Ledger<S: LedgerStore> {
    config: LedgerConfig,
    store: Arc<S>,
    verifier: Arc<dyn SignatureVerifier>,
    state: RwLock<LedgerState>,
}

impl<S: LedgerStore> Ledger<S> {
    /// Loads the ledger from `store`, writing a genesis block first if the
    /// store holds no chain yet.
    pub fn bootstrap(
        config: LedgerConfig,
        store: Arc<S>,
        verifier: Arc<dyn SignatureVerifier>,
        clock: &dyn Clock,
    ) -> Result<Self, LedgerError> {
        let snapshot = store
            .load()
            .map_err(LedgerError::StorageFailure)?
            .unwrap_or_default();
        let pending = PendingPool::from_entries(snapshot.pending);

        let chain = if snapshot.chain.is_empty() {
            let genesis = Block::genesis(config.reward_source.clone(), clock.now());
            store
                .commit(&Commit {
                    block: Some(genesis.clone()),
                    ..Default::default()
                })
                .map_err(LedgerError::StorageFailure)?;
            info!(hash = %hex::encode(genesis.hash), "created genesis block");
            vec![genesis]
        } else {
            info!(
                blocks = snapshot.chain.len(),
                pending = pending.len(),
                "loaded ledger from store"
            );
            snapshot.chain
        };

        Ok(Self {
            config,
            store,
            verifier,
            state: RwLock::new(LedgerState::new(chain, pending)),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn get_mining_info(&self) -> MiningChallenge {
        let state = self.state.read();
        MiningChallenge {
            previous_hash: state.head().hash,
            transactions: state.pending.ordered().into_iter().map(Transaction::basic_info).collect(),
            difficulty: self.config.difficulty,
        }
    }

    /// Admits a signed transfer to the pending pool. The transaction is
    /// rebuilt from its transfer fields, so ids and mined flags supplied by the
    /// caller are never trusted.
    pub fn add_transaction(&self, tx: Transaction) -> Result<TxId, LedgerError> {
        self.add_transfer(tx.from, tx.to, tx.amount, tx.timestamp, tx.signature)
    }

    /// Builds and admits a transfer from its raw fields, checking the
    /// signature once with the ledger's verifier.
    pub fn add_transfer(
        &self,
        from: Address,
        to: Address,
        amount: Amount,
        timestamp: u64,
        signature: Vec<u8>,
    ) -> Result<TxId, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if from == self.config.reward_source {
            warn!(%to, "refusing transfer that claims the reward source");
            return Err(LedgerError::InvalidSignature);
        }
        let tx = Transaction::create(from, to, amount, timestamp, signature, self.verifier.as_ref())?;
        let id = tx.id();

        let mut state = self.state.write();
        if state.pending.contains(&id) || state.mined.contains(&id) {
            return Err(LedgerError::DuplicateTransaction(id));
        }
        let entry = state.pending.stage(tx);
        self.store
            .commit(&Commit {
                admitted: vec![entry.clone()],
                ..Default::default()
            })
            .map_err(LedgerError::StorageFailure)?;
        state.pending.insert(entry);
        debug!(%id, pending = state.pending.len(), "transaction admitted");
        Ok(id)
    }

    /// Accepts a proof-of-work solution: appends the block, settles its
    /// transfers and queues the miner's reward for the next block.
    pub fn submit_solution(&self, package: SolutionPackage) -> Result<BlockSummary, LedgerError> {
        let mut state = self.state.write();

        let selected = verify_solution(&package, state.head(), &state.pending, self.config.difficulty)
            .inspect_err(|reason| {
                warn!(miner = %package.miner, %reason, "solution rejected");
            })?;

        let block = Block::create(
            state.chain.len() as u64,
            package.claimed_previous_hash,
            selected,
            package.nonce,
            package.miner.clone(),
            package.timestamp,
        );
        debug_assert_eq!(block.hash, package.solution_hash);

        let mut admitted = Vec::new();
        if self.config.mining_reward > 0 {
            let reward = Transaction::reward(
                self.config.reward_source.clone(),
                package.miner.clone(),
                self.config.mining_reward,
                &block.hash,
                package.timestamp,
            );
            admitted.push(state.pending.stage(reward));
        }
        let commit = Commit {
            block: Some(block.clone()),
            admitted,
            cleared: block.transactions.iter().map(Transaction::id).collect(),
        };
        self.store.commit(&commit).map_err(|e| {
            warn!(index = block.index, error = %e, "block commit failed, ledger unchanged");
            LedgerError::StorageFailure(e)
        })?;

        state.pending.remove_all(&commit.cleared);
        for tx in &block.transactions {
            apply_transfer(&mut state.balances, tx);
            state.mined.insert(tx.id());
        }
        for entry in commit.admitted {
            state.pending.insert(entry);
        }
        let summary = block.summary();
        state.chain.push(block);

        info!(
            index = summary.index,
            hash = %hex::encode(summary.hash),
            txs = summary.transactions.len(),
            miner = %summary.mined_by,
            "block accepted"
        );
        Ok(summary)
    }

    /// Balance from the cache kept in step with the chain.
    pub fn get_balance(&self, address: &Address) -> Balance {
        self.state.read().balances.get(address).copied().unwrap_or(0)
    }

    /// Balance folded from every mined transaction; the source of truth the
    /// cache must agree with.
    pub fn recompute_balance(&self, address: &Address) -> Balance {
        let state = self.state.read();
        state
            .chain
            .iter()
            .flat_map(|b| &b.transactions)
            .fold(0, |mut balance, tx| {
                let amount = Balance::from(tx.amount());
                if tx.to() == address {
                    balance += amount;
                }
                if tx.from() == address {
                    balance -= amount;
                }
                balance
            })
    }

    /// Sum of the address's transfers still waiting in the pool.
    pub fn pending_outgoing(&self, address: &Address) -> Amount {
        self.state.read().pending.outgoing(address)
    }

    pub fn get_block(&self, index: u64) -> Result<Block, LedgerError> {
        let state = self.state.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| state.chain.get(i))
            .cloned()
            .ok_or(LedgerError::OutOfBounds {
                index,
                len: state.chain.len() as u64,
            })
    }

    pub fn head(&self) -> Block {
        self.state.read().head().clone()
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> u64 {
        self.state.read().chain.len() as u64
    }

    /// Always false: the chain starts with genesis.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn chain(&self) -> Vec<Block> {
        self.state.read().chain.clone()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.state.read().pending.ordered().into_iter().cloned().collect()
    }

    /// Audits a snapshot of the chain; the lock is released before hashing.
    pub fn is_chain_valid(&self) -> ValidationResult {
        let chain = self.chain();
        let result = validate_chain(&chain, self.verifier.as_ref(), &self.config.reward_source);
        if let ValidationResult::Invalid { index, reason } = &result {
            warn!(index, %reason, "chain failed validation");
        }
        result
    }
}
