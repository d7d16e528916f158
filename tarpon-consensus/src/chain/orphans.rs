//! Out-of-order block storage.

use std::collections::HashMap;
use std::sync::Arc;

use tarpon_chain::block::{self, Block};

/// One stored orphan block.
#[derive(Clone, Debug)]
pub struct Orphan {
    pub block: Arc<Block>,
    pub size: usize,
}

/// Blocks whose parents have not arrived yet.
///
/// Stored once by their own hash and indexed by their parent's hash, so a
/// freshly connected block can pull in the orphan waiting on it in O(1).
/// Bounded by accumulated byte size; when the bound is exceeded, orphans
/// with the lowest claimed coinbase heights are evicted first, keeping the
/// highest one as the likely hint of where the peer's tip is.
#[derive(Debug, Default)]
pub struct OrphanStore {
    by_hash: HashMap<block::Hash, Orphan>,
    /// parent hash → orphan hash
    by_prev: HashMap<block::Hash, block::Hash>,
    total_size: usize,
    limit: usize,
}

impl OrphanStore {
    pub fn new(limit: usize) -> OrphanStore {
        OrphanStore {
            limit,
            ..OrphanStore::default()
        }
    }

    pub fn contains(&self, hash: &block::Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Store `block` as an orphan. A newer orphan claiming the same parent
    /// replaces the older one.
    pub fn insert(&mut self, block: Arc<Block>) {
        let hash = block.hash();
        if self.by_hash.contains_key(&hash) {
            return;
        }
        let parent = block.header.previous_block_hash;

        if let Some(previous) = self.by_prev.insert(parent, hash) {
            self.remove(&previous);
        }

        let size = block.size();
        self.total_size += size;
        self.by_hash.insert(hash, Orphan { block, size });
    }

    /// Remove and return the orphan waiting on `parent`.
    pub fn take_by_parent(&mut self, parent: &block::Hash) -> Option<Arc<Block>> {
        let hash = self.by_prev.remove(parent)?;
        let orphan = self.by_hash.remove(&hash)?;
        self.total_size -= orphan.size;
        Some(orphan.block)
    }

    fn remove(&mut self, hash: &block::Hash) {
        if let Some(orphan) = self.by_hash.remove(hash) {
            self.total_size -= orphan.size;
            self.by_prev
                .remove(&orphan.block.header.previous_block_hash);
        }
    }

    /// Drop everything (checkpoint divergence does this).
    pub fn clear(&mut self) -> usize {
        let count = self.by_hash.len();
        self.by_hash.clear();
        self.by_prev.clear();
        self.total_size = 0;
        count
    }

    /// Evict until back under the byte limit. Returns `(count, bytes)`
    /// evicted.
    ///
    /// This is DoS mitigation, not consensus: any policy that bounds memory
    /// is admissible. Ours keeps the orphan claiming the highest coinbase
    /// height alive longest, since that one most plausibly extends the
    /// chain a peer is about to give us.
    pub fn prune(&mut self) -> (usize, usize) {
        if self.total_size <= self.limit {
            return (0, 0);
        }

        let mut ranked: Vec<(block::Hash, u32)> = self
            .by_hash
            .iter()
            .map(|(hash, orphan)| {
                let height = orphan
                    .block
                    .coinbase_height()
                    .map(|height| height.0)
                    .unwrap_or(0);
                (*hash, height)
            })
            .collect();
        ranked.sort_by_key(|(_, height)| *height);

        let mut evicted = 0;
        let mut evicted_bytes = 0;
        for (hash, _) in ranked {
            if self.total_size <= self.limit {
                break;
            }
            if let Some(orphan) = self.by_hash.get(&hash) {
                evicted_bytes += orphan.size;
                evicted += 1;
                self.remove(&hash);
            }
        }
        (evicted, evicted_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    use chrono::{TimeZone, Utc};
    use tarpon_chain::amount::Amount;
    use tarpon_chain::block::{merkle, Header, Height};
    use tarpon_chain::transaction::{LockTime, Transaction, SEQUENCE_FINAL};
    use tarpon_chain::transparent::{CoinbaseData, Input, Output, Script, Witness};
    use tarpon_chain::work::difficulty::CompactDifficulty;

    fn orphan_block(parent_tag: u8, height: Height) -> Arc<Block> {
        let coinbase = Transaction::new(
            1,
            vec![Input::Coinbase {
                data: CoinbaseData(CoinbaseData::height_push(height)),
                sequence: SEQUENCE_FINAL,
                witness: Witness::empty(),
            }],
            vec![Output {
                value: Amount::from_sat(50).unwrap(),
                lock_script: Script::new(vec![0x51]),
            }],
            LockTime::unlocked(),
        );
        let transactions = vec![std::sync::Arc::new(coinbase)];
        Arc::new(Block {
            header: Header::new(
                1,
                block::Hash([parent_tag; 32]),
                merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash())),
                Utc.timestamp(1_296_688_602, 0),
                CompactDifficulty(0x207f_ffff),
                0,
            ),
            transactions,
        })
    }

    #[test]
    fn stores_and_resolves_by_parent() {
        tarpon_test::init();

        let mut store = OrphanStore::new(1 << 20);
        let block = orphan_block(1, Height(7));
        let hash = block.hash();
        let parent = block.header.previous_block_hash;

        store.insert(block);
        assert!(store.contains(&hash));

        let resolved = store.take_by_parent(&parent).unwrap();
        assert_eq!(resolved.hash(), hash);
        assert!(!store.contains(&hash));
        assert_eq!(store.total_size(), 0);
    }

    #[test]
    fn pruning_keeps_the_highest_coinbase_height() {
        tarpon_test::init();

        // A limit small enough that three orphans cannot all stay.
        let one_size = orphan_block(0, Height(1)).size();
        let mut store = OrphanStore::new(one_size + one_size / 2);

        store.insert(orphan_block(1, Height(10)));
        store.insert(orphan_block(2, Height(900)));
        store.insert(orphan_block(3, Height(40)));

        let (evicted, bytes) = store.prune();
        assert!(evicted >= 1);
        assert!(bytes > 0);
        assert!(store.total_size() <= one_size + one_size / 2);

        // The highest-height orphan survived.
        let best = orphan_block(2, Height(900));
        assert!(store.contains(&best.hash()));
    }
}
