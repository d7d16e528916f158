//! The unspent-coin set viewed through a block's eyes.

use std::collections::{hash_map::Entry, HashMap};

use serde::{Deserialize, Serialize};

use tarpon_chain::amount::Amount;
use tarpon_chain::block::{Block, Height};
use tarpon_chain::transaction::Transaction;
use tarpon_chain::transparent::{OutPoint, Script};

use crate::ChainDB;

/// A single unspent transaction output.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// The output's value.
    pub value: Amount,
    /// The script that must be satisfied to spend the output.
    pub lock_script: Script,
    /// The height of the block that created the output.
    pub height: Height,
    /// Whether the creating transaction was a coinbase; such coins are
    /// unspendable until they mature.
    pub coinbase: bool,
}

/// The coins a block's spends removed, in spend order, so a disconnect can
/// restore them.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UndoCoins(pub Vec<(OutPoint, Coin)>);

/// The pending fate of one outpoint inside a [`CoinView`].
#[derive(Clone, Debug)]
enum CoinState {
    /// Created by this view; will be inserted on write.
    ///
    /// Also the state of a coin *restored* by an undo view.
    Fresh(Coin),
    /// Spent by this view; will be deleted on write. The coin itself is
    /// retained so lock heights stay queryable mid-block.
    Spent(Coin),
}

/// An in-memory delta over the persistent coin set, accumulated while a
/// block's transactions are applied (or reversed) and flushed to the
/// database in one batch.
#[derive(Clone, Debug, Default)]
pub struct CoinView {
    map: HashMap<OutPoint, CoinState>,
    undo: UndoCoins,
}

impl CoinView {
    pub fn new() -> CoinView {
        CoinView::default()
    }

    /// Look up a spendable coin, checking the delta before the database.
    pub fn get<D: ChainDB + ?Sized>(&self, db: &D, outpoint: &OutPoint) -> Option<Coin> {
        match self.map.get(outpoint) {
            Some(CoinState::Fresh(coin)) => Some(coin.clone()),
            Some(CoinState::Spent(_)) => None,
            None => db.get_coin(outpoint),
        }
    }

    /// The creation height of the coin at `outpoint`, or `-1` if the view
    /// has never seen it.
    ///
    /// Coins spent earlier in the same block still answer; BIP 68 lock
    /// calculations run after the spend is recorded.
    pub fn coin_height<D: ChainDB + ?Sized>(&self, db: &D, outpoint: &OutPoint) -> i32 {
        match self.map.get(outpoint) {
            Some(CoinState::Fresh(coin)) | Some(CoinState::Spent(coin)) => coin.height.0 as i32,
            None => db
                .get_coin(outpoint)
                .map(|coin| coin.height.0 as i32)
                .unwrap_or(-1),
        }
    }

    /// Spend every input of `tx`, recording undo data.
    ///
    /// On success, returns the spent coins in input order (the validator
    /// checks values, maturity, and scripts against them). Returns `None` if
    /// any referenced coin is missing or already spent; the view is left
    /// with the partial spends recorded, so a failed block must discard the
    /// whole view (it always does).
    pub fn spend<D: ChainDB + ?Sized>(&mut self, db: &D, tx: &Transaction) -> Option<Vec<Coin>> {
        let mut spent = Vec::with_capacity(tx.inputs.len());
        for input in tx.inputs.iter() {
            let outpoint = match input.outpoint() {
                Some(outpoint) => outpoint,
                None => continue,
            };
            let coin = self.get(db, &outpoint)?;
            self.undo.0.push((outpoint, coin.clone()));
            self.map.insert(outpoint, CoinState::Spent(coin.clone()));
            spent.push(coin);
        }
        Some(spent)
    }

    /// Add every output of `tx` as a fresh coin created at `height`.
    pub fn add_tx(&mut self, tx: &Transaction, height: Height) {
        let txid = tx.hash();
        let coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint {
                hash: txid,
                index: index as u32,
            };
            self.map.insert(
                outpoint,
                CoinState::Fresh(Coin {
                    value: output.value,
                    lock_script: output.lock_script.clone(),
                    height,
                    coinbase,
                }),
            );
        }
    }

    /// Turn this view into the reversal of `block`: every output the block
    /// created is deleted, every coin its spends removed is restored from
    /// `undo`.
    ///
    /// Transactions are processed newest-first, restoring each one's inputs
    /// only after deleting its outputs; a coin created and consumed inside
    /// the block is first restored by its spender's undo records and then
    /// deleted by its creator, leaving no trace.
    pub fn undo<D: ChainDB + ?Sized>(&mut self, db: &D, block: &Block, undo: &UndoCoins) {
        let mut undo_pos = undo.0.len();
        for tx in block.transactions.iter().rev() {
            let txid = tx.hash();
            for index in (0..tx.outputs.len()).rev() {
                let outpoint = OutPoint {
                    hash: txid,
                    index: index as u32,
                };
                match self.map.entry(outpoint) {
                    // Restored by a later spender in this same block: the
                    // creation and the spend cancel out.
                    Entry::Occupied(entry) => {
                        entry.remove();
                    }
                    Entry::Vacant(entry) => {
                        if let Some(coin) = db.get_coin(&outpoint) {
                            entry.insert(CoinState::Spent(coin));
                        }
                    }
                }
            }

            let spend_count = tx
                .inputs
                .iter()
                .filter(|input| input.outpoint().is_some())
                .count();
            for _ in 0..spend_count {
                undo_pos = undo_pos.saturating_sub(1);
                if let Some((outpoint, coin)) = undo.0.get(undo_pos) {
                    self.map.insert(*outpoint, CoinState::Fresh(coin.clone()));
                }
            }
        }
    }

    /// The undo data accumulated by [`spend`](Self::spend).
    pub fn undo_coins(&self) -> &UndoCoins {
        &self.undo
    }

    /// Drain the view into `(created, deleted)` lists for a database batch.
    pub fn into_changes(self) -> (Vec<(OutPoint, Coin)>, Vec<OutPoint>, UndoCoins) {
        let mut created = Vec::new();
        let mut deleted = Vec::new();
        for (outpoint, state) in self.map {
            match state {
                CoinState::Fresh(coin) => created.push((outpoint, coin)),
                CoinState::Spent(_) => deleted.push(outpoint),
            }
        }
        (created, deleted, self.undo)
    }
}
