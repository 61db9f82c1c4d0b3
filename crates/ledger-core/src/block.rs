use serde::{Deserialize, Serialize};

use crate::{constants::GENESIS_SEED, sha256, put_bytes, Address, Hash, Transaction, TxId, TxSummary};

/// Canonical digest over a block's contents. Miners search `nonce` until this
/// satisfies the difficulty predicate; the accepted block's hash is the same
/// value.
///
/// Layout: `previous_hash ‖ timestamp ‖ count ‖ (id ‖ from ‖ to ‖ amount)* ‖ nonce`,
/// integers little-endian, strings length-prefixed.
pub fn block_digest(previous_hash: &Hash, timestamp: u64, txs: &[TxSummary], nonce: u64) -> Hash {
    sha256(&hash_bytes(previous_hash, timestamp, txs, nonce))
}

pub fn hash_bytes(previous_hash: &Hash, timestamp: u64, txs: &[TxSummary], nonce: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32 + 8 + 8 + txs.len() * 128 + 8);
    bytes.extend_from_slice(previous_hash);
    bytes.extend_from_slice(&timestamp.to_le_bytes());
    bytes.extend_from_slice(&(txs.len() as u64).to_le_bytes());
    for tx in txs {
        bytes.extend_from_slice(&tx.id.0);
        put_bytes(&mut bytes, tx.from.as_str().as_bytes());
        put_bytes(&mut bytes, tx.to.as_str().as_bytes());
        bytes.extend_from_slice(&tx.amount.to_le_bytes());
    }
    bytes.extend_from_slice(&nonce.to_le_bytes());
    bytes
}

/// Back-reference from a mined transaction to the block holding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub index: u64,
    #[serde(with = "hex::serde")]
    pub hash: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    #[serde(with = "hex::serde")]
    pub previous_hash: Hash,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub mined_by: Address,
    pub mined_at: u64,
    /// Stored for lookup only; validation always recomputes it.
    #[serde(with = "hex::serde")]
    pub hash: Hash,
}

impl Block {
    /// Seals `transactions` into a block at `index`. Each transaction is
    /// stamped as mined and pointed back at the new block.
    pub fn create(
        index: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        nonce: u64,
        mined_by: Address,
        mined_at: u64,
    ) -> Self {
        let mut block = Self {
            index,
            previous_hash,
            transactions,
            nonce,
            mined_by,
            mined_at,
            hash: [0u8; 32],
        };
        block.hash = block.recompute_hash();
        let block_ref = BlockRef {
            index,
            hash: block.hash,
        };
        for tx in &mut block.transactions {
            tx.mark_mined(block_ref);
        }
        block
    }

    /// A transaction-free block at index 0 whose previous hash is derived from
    /// the bootstrap seed rather than a prior block.
    pub fn genesis(mined_by: Address, mined_at: u64) -> Self {
        Self::create(0, genesis_previous_hash(), Vec::new(), 0, mined_by, mined_at)
    }

    pub fn recompute_hash(&self) -> Hash {
        block_digest(&self.previous_hash, self.mined_at, &self.summaries(), self.nonce)
    }

    pub fn summaries(&self) -> Vec<TxSummary> {
        self.transactions.iter().map(Transaction::basic_info).collect()
    }

    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            index: self.index,
            hash: self.hash,
            previous_hash: self.previous_hash,
            transactions: self.transactions.iter().map(Transaction::id).collect(),
            nonce: self.nonce,
            mined_by: self.mined_by.clone(),
            mined_at: self.mined_at,
        }
    }
}

pub fn genesis_previous_hash() -> Hash {
    sha256(GENESIS_SEED)
}

/// What a caller gets back for an accepted solution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub index: u64,
    #[serde(with = "hex::serde")]
    pub hash: Hash,
    #[serde(with = "hex::serde")]
    pub previous_hash: Hash,
    pub transactions: Vec<TxId>,
    pub nonce: u64,
    pub mined_by: Address,
    pub mined_at: u64,
}
