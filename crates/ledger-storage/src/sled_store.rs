use anyhow::{anyhow, Context, Result};
use ledger_core::{Block, Commit, Hash, LedgerSnapshot, LedgerStore, PendingEntry};
use sled::transaction::TransactionError;
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const TREE_PENDING: &str = "pending";
const TREE_META: &str = "meta";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

/// Blocks keyed by big-endian index so iteration follows chain order; pending
/// entries keyed by transaction id.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
  pending: Tree,
  meta: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("open sled db at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS).context("open blocks tree")?;
    let pending = db.open_tree(TREE_PENDING).context("open pending tree")?;
    let meta = db.open_tree(TREE_META).context("open meta tree")?;
    info!(path = %path.display(), blocks = blocks.len(), "sled store opened");
    Ok(Self {
      db,
      blocks,
      pending,
      meta,
    })
  }

  pub fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(index.to_be_bytes())?
      .map(|bytes| bincode::deserialize(&bytes).with_context(|| format!("decode block {index}")))
      .transpose()
  }

  pub fn tip_height(&self) -> Result<Option<u64>> {
    Ok(self.meta.get(KEY_TIP_HEIGHT)?.and_then(|v| {
      let arr: [u8; 8] = v.as_ref().try_into().ok()?;
      Some(u64::from_be_bytes(arr))
    }))
  }

  pub fn tip_hash(&self) -> Result<Option<Hash>> {
    Ok(
      self
        .meta
        .get(KEY_TIP_HASH)?
        .and_then(|v| v.as_ref().try_into().ok()),
    )
  }

  /// Drops every record. The store then loads as never written.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.pending.clear()?;
    self.meta.clear()?;
    self.db.flush()?;
    Ok(())
  }
}

impl LedgerStore for SledStore {
  fn load(&self) -> Result<Option<LedgerSnapshot>> {
    if self.blocks.is_empty() && self.pending.is_empty() {
      return Ok(None);
    }
    let chain = self
      .blocks
      .iter()
      .values()
      .map(|v| -> Result<Block> { bincode::deserialize(&v?).context("decode block") })
      .collect::<Result<Vec<_>>>()?;
    let mut pending = self
      .pending
      .iter()
      .values()
      .map(|v| -> Result<PendingEntry> {
        bincode::deserialize(&v?).context("decode pending entry")
      })
      .collect::<Result<Vec<_>>>()?;
    pending.sort_by_key(|e| e.seq);
    Ok(Some(LedgerSnapshot { chain, pending }))
  }

  fn commit(&self, commit: &Commit) -> Result<()> {
    // Encode outside the transaction: the closure may run more than once.
    let block = commit
      .block
      .as_ref()
      .map(|b| -> Result<_> { Ok((b.index.to_be_bytes(), bincode::serialize(b)?, b.hash)) })
      .transpose()?;
    let admitted = commit
      .admitted
      .iter()
      .map(|e| -> Result<_> { Ok((e.tx.id().0, bincode::serialize(e)?)) })
      .collect::<Result<Vec<_>>>()?;

    (&self.blocks, &self.pending, &self.meta)
      .transaction(|(blocks, pending, meta)| {
        if let Some((key, bytes, hash)) = &block {
          blocks.insert(&key[..], bytes.as_slice())?;
          meta.insert(KEY_TIP_HEIGHT, &key[..])?;
          meta.insert(KEY_TIP_HASH, &hash[..])?;
        }
        for id in &commit.cleared {
          pending.remove(&id.0[..])?;
        }
        for (key, bytes) in &admitted {
          pending.insert(&key[..], bytes.as_slice())?;
        }
        Ok(())
      })
      .map_err(|e: TransactionError<()>| match e {
        TransactionError::Storage(err) => anyhow::Error::new(err).context("ledger commit"),
        TransactionError::Abort(()) => anyhow!("ledger commit aborted"),
      })?;

    self.db.flush()?;
    debug!(
      block = ?commit.block.as_ref().map(|b| b.index),
      admitted = commit.admitted.len(),
      cleared = commit.cleared.len(),
      "commit flushed"
    );
    Ok(())
  }
}
