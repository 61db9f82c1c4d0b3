//! Durable backends for [`ledger_core::LedgerStore`].

pub mod sled_store;

pub use sled_store::SledStore;
