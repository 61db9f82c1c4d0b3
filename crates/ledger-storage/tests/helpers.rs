#![allow(dead_code)]

use std::fs;
use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use ledger_core::{
    pow::solve_package, signature::address_of, transaction::signing_payload, Address, Clock,
    Ed25519Verifier, Ledger, LedgerConfig, SolutionPackage, Transaction,
};
use ledger_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub const DIFFICULTY: u32 = 4;

pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

pub struct Account {
    pub key: SigningKey,
    pub address: Address,
}

pub fn account(seed: u8) -> Account {
    let key = SigningKey::from_bytes(&[seed; 32]);
    let address = address_of(&key.verifying_key());
    Account { key, address }
}

pub fn transfer(from: &Account, to: &Address, amount: u64, timestamp: u64) -> Transaction {
    let payload = signing_payload(&from.address, to, amount, timestamp);
    let signature = from.key.sign(&payload).to_bytes().to_vec();
    Transaction::create(
        from.address.clone(),
        to.clone(),
        amount,
        timestamp,
        signature,
        &Ed25519Verifier,
    )
    .expect("valid transfer")
}

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(db_path).expect("Failed to open SledStore"),
    )
}

pub fn open_ledger(store: Arc<SledStore>) -> Ledger<SledStore> {
    Ledger::bootstrap(
        LedgerConfig::default().with_difficulty(DIFFICULTY),
        store,
        Arc::new(Ed25519Verifier),
        &FixedClock(1_600_000_000_000),
    )
    .expect("bootstrap ledger")
}

pub fn mine(ledger: &Ledger<SledStore>, miner: &Address, timestamp: u64) -> SolutionPackage {
    let info = ledger.get_mining_info();
    solve_package(
        info.previous_hash,
        info.transactions,
        info.difficulty,
        miner.clone(),
        timestamp,
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}
