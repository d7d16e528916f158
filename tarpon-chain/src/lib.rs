//! Core Bitcoin data structures: blocks, headers, transactions, amounts,
//! difficulty arithmetic, and the consensus parameters for each network.
//!
//! This crate holds everything the validator, state layer, and miner agree
//! on but none of the validation logic itself; consensus rules live in
//! `tarpon-consensus`.

#![allow(clippy::unit_arg)]

pub mod amount;
pub mod block;
pub mod compactsize;
pub mod memoized;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub(crate) mod fmt;

pub use serialization::{WireDeserialize, WireDeserializeInto, WireError, WireSerialize};

/// The state of the ledger at some tip, used to parameterize proptest
/// strategies so that generated data is consistent with a chain position.
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerState {
    /// The height of the current chain tip.
    pub tip_height: block::Height,
    /// Whether the next generated transaction should be a coinbase.
    pub is_coinbase: bool,
    /// The network the chain is on.
    pub network: parameters::Network,
}
