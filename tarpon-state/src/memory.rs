//! The in-memory reference implementation of [`ChainDB`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::trace;

use tarpon_chain::block::{self, Block};
use tarpon_chain::parameters::{genesis_block, Network, ThresholdState};
use tarpon_chain::transaction;
use tarpon_chain::transparent::OutPoint;

use crate::{
    BoxError, ChainDB, ChainEntry, Coin, CoinView, HashOrHeight, StateError, UndoCoins,
};

/// The complete chain state, held in maps.
///
/// The batch methods apply their whole delta under `&mut self`, so readers
/// holding `&self` never observe a half-applied block; that is the property
/// disk-backed implementations reproduce with write batches.
pub struct MemoryChainDB {
    network: Network,

    entries: HashMap<block::Hash, Arc<ChainEntry>>,
    blocks: HashMap<block::Hash, Arc<Block>>,
    /// Height to hash, for the main chain only.
    main_chain: BTreeMap<u32, block::Hash>,
    tip: Arc<ChainEntry>,

    coins: HashMap<OutPoint, Coin>,
    /// The number of unspent outputs per txid, maintained so the BIP 30
    /// question is O(1).
    coin_counts: HashMap<transaction::Hash, u32>,
    undo_data: HashMap<block::Hash, UndoCoins>,

    state_cache: HashMap<(u8, block::Hash), ThresholdState>,
}

impl MemoryChainDB {
    /// Open a fresh state seeded with `network`'s genesis block.
    ///
    /// Following bitcoind, the genesis coinbase is *not* entered into the
    /// coin set; its output is unspendable.
    pub fn new(network: Network) -> MemoryChainDB {
        let genesis = Arc::new(genesis_block(network).clone());
        let entry = Arc::new(ChainEntry::genesis(&genesis));

        let mut entries = HashMap::new();
        entries.insert(entry.hash, entry.clone());
        let mut blocks = HashMap::new();
        blocks.insert(entry.hash, genesis);
        let mut main_chain = BTreeMap::new();
        main_chain.insert(0, entry.hash);

        MemoryChainDB {
            network,
            entries,
            blocks,
            main_chain,
            tip: entry,
            coins: HashMap::new(),
            coin_counts: HashMap::new(),
            undo_data: HashMap::new(),
            state_cache: HashMap::new(),
        }
    }

    fn apply_changes(&mut self, created: Vec<(OutPoint, Coin)>, deleted: Vec<OutPoint>) {
        for outpoint in deleted {
            if self.coins.remove(&outpoint).is_some() {
                if let Some(count) = self.coin_counts.get_mut(&outpoint.hash) {
                    *count -= 1;
                    if *count == 0 {
                        self.coin_counts.remove(&outpoint.hash);
                    }
                }
            }
        }
        for (outpoint, coin) in created {
            if self.coins.insert(outpoint, coin).is_none() {
                *self.coin_counts.entry(outpoint.hash).or_insert(0) += 1;
            }
        }
    }

    fn apply_view(&mut self, hash: block::Hash, view: CoinView) {
        let (created, deleted, undo) = view.into_changes();
        self.apply_changes(created, deleted);
        self.undo_data.insert(hash, undo);
    }

    fn connect(
        &mut self,
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
        view: CoinView,
    ) -> Result<(), BoxError> {
        self.entries.insert(entry.hash, entry.clone());
        self.blocks.insert(entry.hash, block);
        self.apply_view(entry.hash, view);
        self.main_chain.insert(entry.height.0, entry.hash);
        self.tip = entry;

        metrics::gauge!("state.tip.height", self.tip.height.0 as i64);
        metrics::counter!("state.connected.block.count", 1);
        Ok(())
    }
}

impl ChainDB for MemoryChainDB {
    fn network(&self) -> Network {
        self.network
    }

    fn tip(&self) -> Arc<ChainEntry> {
        self.tip.clone()
    }

    fn get_entry(&self, location: HashOrHeight) -> Option<Arc<ChainEntry>> {
        match location {
            HashOrHeight::Hash(hash) => self.entries.get(&hash).cloned(),
            HashOrHeight::Height(height) => {
                let hash = self.main_chain.get(&height.0)?;
                self.entries.get(hash).cloned()
            }
        }
    }

    fn get_block(&self, hash: &block::Hash) -> Option<Arc<Block>> {
        self.blocks.get(hash).cloned()
    }

    fn is_main_chain(&self, entry: &ChainEntry) -> bool {
        self.main_chain.get(&entry.height.0) == Some(&entry.hash)
    }

    fn has_coins(&self, txid: &transaction::Hash) -> bool {
        self.coin_counts.contains_key(txid)
    }

    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).cloned()
    }

    fn save(
        &mut self,
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
        view: Option<CoinView>,
    ) -> Result<(), BoxError> {
        match view {
            Some(view) => self.connect(entry, block, view),
            None => {
                // Side-chain save: index the block without touching the
                // coin set or the main chain.
                trace!(hash = %entry.hash, height = entry.height.0, "saving side-chain block");
                self.entries.insert(entry.hash, entry.clone());
                self.blocks.insert(entry.hash, block);
                Ok(())
            }
        }
    }

    fn reconnect(
        &mut self,
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
        view: CoinView,
    ) -> Result<(), BoxError> {
        self.connect(entry, block, view)
    }

    fn disconnect(&mut self, entry: &ChainEntry, block: &Block) -> Result<CoinView, BoxError> {
        if entry.is_genesis() {
            return Err(StateError::DisconnectGenesis.into());
        }
        if !self.is_main_chain(entry) {
            return Err(StateError::NotMainChain(entry.hash).into());
        }
        let undo = self
            .undo_data
            .remove(&entry.hash)
            .ok_or(StateError::MissingUndo(entry.hash))?;
        let parent = self
            .get_entry(HashOrHeight::Hash(entry.previous_block_hash))
            .ok_or(StateError::MissingBlock(entry.previous_block_hash))?;

        let mut view = CoinView::new();
        view.undo(self, block, &undo);

        let (created, deleted, _) = view.clone().into_changes();
        self.apply_changes(created, deleted);

        self.main_chain.remove(&entry.height.0);
        self.tip = parent;

        metrics::gauge!("state.tip.height", self.tip.height.0 as i64);
        metrics::counter!("state.disconnected.block.count", 1);
        Ok(view)
    }

    fn reset(&mut self, location: HashOrHeight) -> Result<Arc<ChainEntry>, BoxError> {
        let target = self
            .get_entry(location)
            .ok_or(StateError::ResetTargetNotFound)?;
        if !self.is_main_chain(&target) {
            return Err(StateError::NotMainChain(target.hash).into());
        }

        while self.tip.height > target.height {
            let entry = self.tip();
            let block = self
                .get_block(&entry.hash)
                .ok_or(StateError::MissingBlock(entry.hash))?;
            self.disconnect(&entry, &block)?;
        }
        Ok(self.tip())
    }

    fn scan(
        &self,
        start: Option<HashOrHeight>,
        filter: &dyn Fn(&Block) -> bool,
        visit: &mut dyn FnMut(&ChainEntry, &Block),
    ) -> Result<(), BoxError> {
        let start_height = match start {
            Some(location) => {
                self.get_entry(location)
                    .ok_or(StateError::ResetTargetNotFound)?
                    .height
                    .0
            }
            None => 0,
        };

        for (_, hash) in self.main_chain.range(start_height..) {
            let entry = match self.entries.get(hash) {
                Some(entry) => entry,
                None => continue,
            };
            let block = self
                .get_block(hash)
                .ok_or(StateError::MissingBlock(*hash))?;
            if filter(&block) {
                visit(entry, &block);
            }
        }
        Ok(())
    }

    fn state_cache_get(&self, bit: u8, hash: &block::Hash) -> Option<ThresholdState> {
        self.state_cache.get(&(bit, *hash)).copied()
    }

    fn state_cache_set(&mut self, bit: u8, hash: block::Hash, state: ThresholdState) {
        self.state_cache.insert((bit, hash), state);
    }

    fn get_undo(&self, hash: &block::Hash) -> Option<UndoCoins> {
        self.undo_data.get(hash).cloned()
    }
}
