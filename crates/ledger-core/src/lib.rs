//! Core of a single-chain proof-of-work ledger: transactions, blocks, the
//! solution verifier, the chain validator and the [`Ledger`] state machine
//! that ties them together.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod block;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod pool;
pub mod pow;
pub mod signature;
pub mod store;
pub mod transaction;
pub mod validate;

pub use block::{Block, BlockRef, BlockSummary};
pub use config::LedgerConfig;
pub use error::{LedgerError, RejectReason};
pub use ledger::{Clock, Ledger, MiningChallenge, SystemClock};
pub use pow::SolutionPackage;
pub use signature::{Ed25519Verifier, SignatureVerifier};
pub use store::{Commit, LedgerSnapshot, LedgerStore, MemoryStore, PendingEntry};
pub use transaction::{Transaction, TxSummary};
pub use validate::{validate_chain, ValidationFailure, ValidationResult};

pub type Hash = [u8; constants::HASH_SIZE];
pub type Amount = u64;
/// Balances may go below zero: transfers are not checked against funds.
pub type Balance = i128;

pub fn sha256(bytes: &[u8]) -> Hash {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Appends a length-prefixed byte string, so adjacent fields can't bleed into
/// each other when hashed.
pub(crate) fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Transaction identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(#[serde(with = "hex::serde")] pub Hash);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// An account address. Client addresses are hex-encoded ed25519 public keys;
/// [`Address::system`] is the minting identity and never decodes to a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn system() -> Self {
        Self(constants::SYSTEM_ADDRESS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}
