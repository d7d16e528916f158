//! The chain state: the block index, the unspent-coin set, and the abstract
//! database the validator runs against.
//!
//! Everything here is bookkeeping; no consensus rules live in this crate.
//! The [`ChainDB`] trait is the boundary the validator depends on, and
//! [`MemoryChainDB`] is its reference implementation. Disk-backed stores
//! implement the same trait.

mod chain_db;
mod coins;
mod entry;
mod memory;

#[cfg(test)]
mod tests;

use thiserror::Error;

use tarpon_chain::block;

pub use chain_db::ChainDB;
pub use coins::{Coin, CoinView, UndoCoins};
pub use entry::{skip_height, ChainEntry};
pub use memory::MemoryChainDB;

/// A boxed error for state operations, following the database convention of
/// erasing backend-specific error types at the trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Identifies a block by hash or, for main-chain blocks, by height.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashOrHeight {
    /// A block identified by hash.
    Hash(block::Hash),
    /// A main-chain block identified by height.
    Height(block::Height),
}

impl From<block::Hash> for HashOrHeight {
    fn from(hash: block::Hash) -> Self {
        HashOrHeight::Hash(hash)
    }
}

impl From<block::Height> for HashOrHeight {
    fn from(height: block::Height) -> Self {
        HashOrHeight::Height(height)
    }
}

/// Bookkeeping failures surfaced by state implementations.
#[derive(Error, Debug)]
pub enum StateError {
    /// The body of a block the index refers to is gone.
    #[error("block {0} is not in the database")]
    MissingBlock(block::Hash),
    /// A connected block has no stored undo data.
    #[error("no undo data for block {0}")]
    MissingUndo(block::Hash),
    /// An operation that requires a main-chain block got a side-chain one.
    #[error("block {0} is not on the main chain")]
    NotMainChain(block::Hash),
    /// The target of a reset does not exist.
    #[error("reset target not found")]
    ResetTargetNotFound,
    /// The genesis block cannot be disconnected.
    #[error("cannot disconnect the genesis block")]
    DisconnectGenesis,
}
