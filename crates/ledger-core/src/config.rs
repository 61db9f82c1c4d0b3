use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD},
    Address, Amount,
};

/// Ledger parameters fixed for the lifetime of a [`crate::Ledger`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero bits a solution hash must have.
    pub difficulty: u32,
    pub mining_reward: Amount,
    /// Identity that originates reward transactions. It holds no key.
    pub reward_source: Address,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            reward_source: Address::system(),
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_mining_reward(mut self, mining_reward: Amount) -> Self {
        self.mining_reward = mining_reward;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.difficulty, 12);
        assert_eq!(config.mining_reward, 100);
        assert_eq!(config.reward_source, Address::system());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: LedgerConfig = serde_json::from_str(r#"{"difficulty":4}"#).unwrap();
        assert_eq!(config, LedgerConfig::default().with_difficulty(4));
    }
}
