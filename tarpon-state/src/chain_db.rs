//! The abstract database the validator runs against.

use std::sync::Arc;

use tarpon_chain::block::{self, Block, Height};
use tarpon_chain::parameters::{Network, ThresholdState};
use tarpon_chain::transaction::{self, Transaction};
use tarpon_chain::transparent::OutPoint;

use crate::{
    entry::skip_height, BoxError, ChainEntry, Coin, CoinView, HashOrHeight, UndoCoins,
};

/// Persistent chain state: the block index, block bodies, the coin set, and
/// the versionbits state cache.
///
/// The validator mutates the database only through the batch-shaped methods
/// (`save`, `reconnect`, `disconnect`, `reset`); each call is atomic from
/// the perspective of readers. Implementations are always initialized with
/// their network's genesis block, so `tip` is total.
pub trait ChainDB: Send {
    /// The network this database belongs to.
    fn network(&self) -> Network;

    /// The entry with the most cumulative work on the main chain.
    fn tip(&self) -> Arc<ChainEntry>;

    /// Look up an entry by hash, or by main-chain height.
    fn get_entry(&self, location: HashOrHeight) -> Option<Arc<ChainEntry>>;

    /// Is there an entry for `hash` on any chain?
    fn has_entry(&self, hash: &block::Hash) -> bool {
        self.get_entry(HashOrHeight::Hash(*hash)).is_some()
    }

    /// Load a block body.
    fn get_block(&self, hash: &block::Hash) -> Option<Arc<Block>>;

    /// Is `entry` on the main chain?
    fn is_main_chain(&self, entry: &ChainEntry) -> bool;

    /// Does any *unspent* output of the transaction with id `txid` exist?
    ///
    /// This is the BIP 30 question: a new transaction may not shadow an
    /// existing txid that still has spendable coins.
    fn has_coins(&self, txid: &transaction::Hash) -> bool;

    /// Look up one unspent coin.
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;

    /// Build the view a block's verification will spend through, prefetching
    /// the coins `tx` references where the backend benefits from it.
    ///
    /// The in-memory store has nothing to prefetch; disk-backed stores batch
    /// their reads here.
    fn get_coin_view(&self, _tx: &Transaction) -> CoinView {
        CoinView::new()
    }

    /// Persist `entry` and `block`; with a view, also connect the block:
    /// apply its coin delta, extend the main chain, and advance the tip.
    /// One atomic batch.
    fn save(
        &mut self,
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
        view: Option<CoinView>,
    ) -> Result<(), BoxError>;

    /// Re-connect a previously saved side-chain block during a
    /// reorganization: apply `view`, extend the main chain, advance the tip.
    fn reconnect(
        &mut self,
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
        view: CoinView,
    ) -> Result<(), BoxError>;

    /// Disconnect the tip block: reverse its coin delta from stored undo
    /// data, shrink the main chain, move the tip to its parent. Returns the
    /// applied reversal view.
    fn disconnect(&mut self, entry: &ChainEntry, block: &Block) -> Result<CoinView, BoxError>;

    /// Roll the main chain back so `location` becomes the tip.
    fn reset(&mut self, location: HashOrHeight) -> Result<Arc<ChainEntry>, BoxError>;

    /// Walk main-chain blocks from `start` (genesis when `None`), visiting
    /// every block `filter` matches. SPV rescans are built on this.
    fn scan(
        &self,
        start: Option<HashOrHeight>,
        filter: &dyn Fn(&Block) -> bool,
        visit: &mut dyn FnMut(&ChainEntry, &Block),
    ) -> Result<(), BoxError>;

    /// Read a memoized BIP 9 threshold state.
    fn state_cache_get(&self, bit: u8, hash: &block::Hash) -> Option<ThresholdState>;

    /// Memoize a BIP 9 threshold state. Transitions are monotonic, so the
    /// cache is append-only per key.
    fn state_cache_set(&mut self, bit: u8, hash: block::Hash, state: ThresholdState);

    /// Load the undo data recorded when `hash` was connected.
    fn get_undo(&self, hash: &block::Hash) -> Option<UndoCoins>;

    /// The ancestor of `entry` at `height`, following skip pointers.
    ///
    /// O(log n) in the distance thanks to the skip pointers each entry
    /// carries; a skip is taken whenever it does not overshoot the target.
    fn ancestor(&self, entry: &ChainEntry, height: Height) -> Option<Arc<ChainEntry>> {
        if height > entry.height {
            return None;
        }
        let mut current = self.get_entry(HashOrHeight::Hash(entry.hash))?;
        while current.height > height {
            let skip = skip_height(current.height.0);
            current = if skip >= height.0 && skip < current.height.0 {
                self.get_entry(HashOrHeight::Hash(current.skip))?
            } else {
                self.get_entry(HashOrHeight::Hash(current.previous_block_hash))?
            };
        }
        Some(current)
    }

    /// The median of the last 11 blocks' timestamps, ending at `entry`.
    ///
    /// The reference clock for lock times (BIP 113) and versionbits windows.
    fn median_time_past(&self, entry: &ChainEntry) -> i64 {
        let mut times = Vec::with_capacity(11);
        times.push(entry.time.timestamp());
        let mut hash = entry.previous_block_hash;
        for _ in 0..10 {
            match self.get_entry(HashOrHeight::Hash(hash)) {
                Some(ancestor) => {
                    times.push(ancestor.time.timestamp());
                    hash = ancestor.previous_block_hash;
                }
                None => break,
            }
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Build the index entry for `block` on top of `parent`, resolving the
    /// skip pointer.
    ///
    /// Returns `None` when the header's difficulty encoding is invalid.
    fn create_entry(&self, block: &Block, parent: &ChainEntry) -> Option<ChainEntry> {
        let height = parent.height.next();
        let skip = self
            .ancestor(parent, Height(skip_height(height.0)))
            .map(|entry| entry.hash)
            .unwrap_or(block::Hash::ZERO);
        ChainEntry::from_block(block, parent, skip)
    }
}
