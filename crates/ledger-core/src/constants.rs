pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Leading zero bits a solution hash needs by default (three hex zeros).
pub const DEFAULT_DIFFICULTY: u32 = 12;
pub const DEFAULT_MINING_REWARD: u64 = 100;
pub const SYSTEM_ADDRESS: &str = "system";

/// Seed the genesis block's previous hash is derived from.
pub const GENESIS_SEED: &[u8] = b"ledger-core genesis";
