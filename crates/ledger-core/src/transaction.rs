use serde::{Deserialize, Serialize};

use crate::{put_bytes, sha256, Address, Amount, BlockRef, Hash, LedgerError, SignatureVerifier, TxId};

const TRANSFER_TAG: &[u8] = b"ledger/transfer/v1";
const REWARD_TAG: &[u8] = b"ledger/reward/v1";

/// A monetary transfer. Once `mined` is set the transfer fields never change;
/// only the ledger's append protocol flips that flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) id: TxId,
    pub(crate) from: Address,
    pub(crate) to: Address,
    pub(crate) amount: Amount,
    pub(crate) timestamp: u64,
    #[serde(with = "hex::serde")]
    pub(crate) signature: Vec<u8>,
    pub(crate) mined: bool,
    pub(crate) block_ref: Option<BlockRef>,
}

/// The redacted view handed to miners; it never carries the signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub id: TxId,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

/// The bytes a sender signs to authorize a transfer.
pub fn signing_payload(from: &Address, to: &Address, amount: Amount, timestamp: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TRANSFER_TAG.len() + 64 + 64 + 16 + 16);
    buf.extend_from_slice(TRANSFER_TAG);
    put_bytes(&mut buf, from.as_str().as_bytes());
    put_bytes(&mut buf, to.as_str().as_bytes());
    buf.extend_from_slice(&amount.to_le_bytes());
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf
}

impl Transaction {
    /// Builds a pending transfer, checking the amount and then the signature.
    pub fn create(
        from: Address,
        to: Address,
        amount: Amount,
        timestamp: u64,
        signature: Vec<u8>,
        verifier: &dyn SignatureVerifier,
    ) -> Result<Self, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let payload = signing_payload(&from, &to, amount, timestamp);
        if !verifier.verify(&from, &payload, &signature) {
            return Err(LedgerError::InvalidSignature);
        }
        let mut preimage = payload;
        put_bytes(&mut preimage, &signature);
        Ok(Self {
            id: TxId(sha256(&preimage)),
            from,
            to,
            amount,
            timestamp,
            signature,
            mined: false,
            block_ref: None,
        })
    }

    /// Mints the payout for the block whose hash is `block_hash`. Reward
    /// transactions are unsigned; only the ledger originates them.
    pub(crate) fn reward(
        source: Address,
        miner: Address,
        amount: Amount,
        block_hash: &Hash,
        timestamp: u64,
    ) -> Self {
        let mut preimage = Vec::with_capacity(REWARD_TAG.len() + 32 + 64 + 8);
        preimage.extend_from_slice(REWARD_TAG);
        preimage.extend_from_slice(block_hash);
        put_bytes(&mut preimage, miner.as_str().as_bytes());
        preimage.extend_from_slice(&amount.to_le_bytes());
        Self {
            id: TxId(sha256(&preimage)),
            from: source,
            to: miner,
            amount,
            timestamp,
            signature: Vec::new(),
            mined: false,
            block_ref: None,
        }
    }

    /// Re-checks the transfer against its sender. Transfers from
    /// `reward_source` carry no signature and are accepted as minted.
    pub fn verify(&self, verifier: &dyn SignatureVerifier, reward_source: &Address) -> bool {
        if &self.from == reward_source {
            return self.signature.is_empty();
        }
        let payload = signing_payload(&self.from, &self.to, self.amount, self.timestamp);
        verifier.verify(&self.from, &payload, &self.signature)
    }

    pub fn basic_info(&self) -> TxSummary {
        TxSummary {
            id: self.id,
            from: self.from.clone(),
            to: self.to.clone(),
            amount: self.amount,
        }
    }

    pub(crate) fn mark_mined(&mut self, block_ref: BlockRef) {
        debug_assert!(!self.mined, "transaction {} mined twice", self.id);
        self.mined = true;
        self.block_ref = Some(block_ref);
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn from(&self) -> &Address {
        &self.from
    }

    pub fn to(&self) -> &Address {
        &self.to
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn is_mined(&self) -> bool {
        self.mined
    }

    pub fn block_ref(&self) -> Option<&BlockRef> {
        self.block_ref.as_ref()
    }
}
