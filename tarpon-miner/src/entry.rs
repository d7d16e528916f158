//! Mempool entries as the template builder sees them.

use std::collections::HashMap;
use std::sync::Arc;

use tarpon_chain::amount::Amount;
use tarpon_chain::transaction::{self, Transaction};

/// One mempool transaction, with the figures the mempool already computed
/// for it.
///
/// The builder trusts these numbers: fee and sigop cost were established
/// when the transaction entered the pool, and priority (the classic
/// coin-age metric) is maintained by the pool as the chain advances.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub tx: Arc<Transaction>,
    pub fee: Amount,
    pub priority: f64,
    pub sigops_cost: usize,
    weight: usize,
}

impl MempoolEntry {
    pub fn new(tx: Arc<Transaction>, fee: Amount, priority: f64, sigops_cost: usize) -> MempoolEntry {
        let weight = tx.weight();
        MempoolEntry {
            tx,
            fee,
            priority,
            sigops_cost,
            weight,
        }
    }

    pub fn hash(&self) -> transaction::Hash {
        self.tx.hash()
    }

    pub fn weight(&self) -> usize {
        self.weight
    }

    /// Fee rate in satoshis per kilo-weight-unit; the fee-phase comparator.
    pub fn fee_rate(&self) -> u64 {
        if self.weight == 0 {
            return 0;
        }
        (self.fee.sat() as u64).saturating_mul(1000) / self.weight as u64
    }

    /// Does the entry pay any fee at all?
    pub fn is_free(&self) -> bool {
        self.fee == Amount::ZERO
    }
}

/// An immutable view of the mempool at one instant.
///
/// The builder reads it and nothing else; the live mempool keeps churning
/// underneath without affecting an in-progress template.
#[derive(Clone, Debug, Default)]
pub struct MempoolSnapshot {
    entries: HashMap<transaction::Hash, MempoolEntry>,
}

impl MempoolSnapshot {
    pub fn new(entries: Vec<MempoolEntry>) -> MempoolSnapshot {
        MempoolSnapshot {
            entries: entries
                .into_iter()
                .map(|entry| (entry.hash(), entry))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &transaction::Hash) -> Option<&MempoolEntry> {
        self.entries.get(hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.entries.values()
    }

    /// The in-snapshot parents of `entry`: spends of confirmed coins do
    /// not constrain ordering, spends of other pool members do.
    pub fn parents_of(&self, entry: &MempoolEntry) -> Vec<transaction::Hash> {
        let mut parents: Vec<transaction::Hash> = entry
            .tx
            .inputs
            .iter()
            .filter_map(|input| input.outpoint())
            .map(|outpoint| outpoint.hash)
            .filter(|hash| self.entries.contains_key(hash))
            .collect();
        parents.sort_by_key(|hash| hash.0);
        parents.dedup();
        parents
    }
}
