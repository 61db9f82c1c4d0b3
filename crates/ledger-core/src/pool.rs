use std::collections::HashMap;

use crate::{Address, Amount, PendingEntry, Transaction, TxId};

/// Transactions waiting for a block, keyed by id. Insertion order is kept
/// only so listings are stable.
#[derive(Clone, Debug, Default)]
pub struct PendingPool {
    next_seq: u64,
    entries: HashMap<TxId, PendingEntry>,
}

impl PendingPool {
    pub fn from_entries(entries: Vec<PendingEntry>) -> Self {
        let next_seq = entries.iter().map(|e| e.seq + 1).max().unwrap_or(0);
        let entries = entries.into_iter().map(|e| (e.tx.id(), e)).collect();
        Self { next_seq, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &TxId) -> Option<&Transaction> {
        self.entries.get(id).map(|e| &e.tx)
    }

    /// Wraps `tx` with the next sequence number without inserting it.
    pub fn stage(&self, tx: Transaction) -> PendingEntry {
        PendingEntry {
            seq: self.next_seq,
            tx,
        }
    }

    pub fn insert(&mut self, entry: PendingEntry) {
        self.next_seq = self.next_seq.max(entry.seq + 1);
        self.entries.insert(entry.tx.id(), entry);
    }

    /// Set difference: drops every id in `ids`, ignoring ones not present.
    pub fn remove_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a TxId>) {
        for id in ids {
            self.entries.remove(id);
        }
    }

    /// Pending transactions in insertion order.
    pub fn ordered(&self) -> Vec<&Transaction> {
        let mut entries: Vec<&PendingEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| &e.tx).collect()
    }

    /// Saturates at `Amount::MAX`: funds are never checked, so the pool can
    /// hold more than any balance.
    pub fn outgoing(&self, address: &Address) -> Amount {
        self.entries
            .values()
            .filter(|e| e.tx.from() == address)
            .fold(0, |total: Amount, e| total.saturating_add(e.tx.amount()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{account, transfer};

    #[test]
    fn ordered_follows_insertion() {
        let alice = account(1);
        let bob = account(2);
        let mut pool = PendingPool::default();
        let txs: Vec<_> = (0..5).map(|i| transfer(&alice, &bob.address, 1, 100 - i)).collect();
        for tx in &txs {
            let entry = pool.stage(tx.clone());
            pool.insert(entry);
        }
        let ids: Vec<_> = pool.ordered().iter().map(|t| t.id()).collect();
        let expected: Vec<_> = txs.iter().map(|t| t.id()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn remove_all_is_set_difference() {
        let alice = account(1);
        let bob = account(2);
        let mut pool = PendingPool::default();
        let txs: Vec<_> = (0..4).map(|i| transfer(&alice, &bob.address, 1, i)).collect();
        for tx in &txs {
            let entry = pool.stage(tx.clone());
            pool.insert(entry);
        }
        let gone = [txs[0].id(), txs[2].id(), TxId([0xee; 32])];
        pool.remove_all(gone.iter());
        let left: Vec<_> = pool.ordered().iter().map(|t| t.id()).collect();
        assert_eq!(left, vec![txs[1].id(), txs[3].id()]);
    }

    #[test]
    fn from_entries_resumes_sequence() {
        let alice = account(1);
        let bob = account(2);
        let entries = vec![
            PendingEntry { seq: 4, tx: transfer(&alice, &bob.address, 1, 1) },
            PendingEntry { seq: 9, tx: transfer(&alice, &bob.address, 1, 2) },
        ];
        let pool = PendingPool::from_entries(entries);
        let next = pool.stage(transfer(&alice, &bob.address, 1, 3));
        assert_eq!(next.seq, 10);
    }

    #[test]
    fn outgoing_sums_pending_debits() {
        let alice = account(1);
        let bob = account(2);
        let mut pool = PendingPool::default();
        for tx in [
            transfer(&alice, &bob.address, 10, 1),
            transfer(&alice, &bob.address, 5, 2),
            transfer(&bob, &alice.address, 7, 3),
        ] {
            let entry = pool.stage(tx);
            pool.insert(entry);
        }
        assert_eq!(pool.outgoing(&alice.address), 15);
        assert_eq!(pool.outgoing(&bob.address), 7);
        assert_eq!(pool.outgoing(&Address::from("nobody")), 0);
    }

    #[test]
    fn outgoing_saturates_on_huge_transfers() {
        let alice = account(1);
        let bob = account(2);
        let mut pool = PendingPool::default();
        for ts in 0..2 {
            let entry = pool.stage(transfer(&alice, &bob.address, Amount::MAX, ts));
            pool.insert(entry);
        }
        assert_eq!(pool.outgoing(&alice.address), Amount::MAX);
    }
}
