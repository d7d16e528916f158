//! The chain's event stream.
//!
//! Consumers subscribe through [`Chain::subscribe`](crate::Chain::subscribe)
//! and observe tip transitions in a total order: during a reorganization,
//! `Disconnect` events newest-first, then `Connect` events oldest-first,
//! then the final `Connect` for the block that triggered it.

use std::sync::Arc;

use tarpon_chain::block::{self, Block, Height};
use tarpon_state::ChainEntry;

use crate::error::VerifyError;

/// Everything the chain announces.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// The main chain has a new tip.
    Tip(Arc<ChainEntry>),
    /// A block was fully validated and stored.
    Block {
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
    },
    /// A block was connected to the main chain.
    Connect {
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
    },
    /// A block was disconnected from the main chain during a reorganization.
    Disconnect {
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
    },
    /// A previously side-chained block was reconnected during a
    /// reorganization. Followed by its `Connect`.
    Reconnect {
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
    },
    /// A heavier competing branch replaced the main chain.
    Reorganize {
        old_tip: Arc<ChainEntry>,
        new_tip: Arc<ChainEntry>,
    },
    /// A valid block was stored on a side chain without enough work to win.
    Competitor {
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
    },
    /// A stored orphan's parent arrived; the orphan re-enters validation.
    Resolved { hash: block::Hash },
    /// A block with an unknown parent was stored as an orphan.
    Orphan { hash: block::Hash },
    /// A block the chain already knows was submitted again.
    Exists { hash: block::Hash },
    /// A block failed verification.
    Invalid {
        hash: block::Hash,
        error: VerifyError,
    },
    /// A block contradicted a hard-coded checkpoint.
    Checkpoint {
        height: Height,
        expected: block::Hash,
        received: block::Hash,
    },
    /// A fork was observed (checkpoint divergence).
    Fork {
        hash: block::Hash,
        height: Height,
    },
    /// Orphans were evicted under memory pressure.
    Purge { count: usize, size: usize },
    /// The node reached the synced state for the first time.
    Full,
    /// A non-verification failure the chain could not attribute to a block.
    Error { reason: String },
    /// The chain was explicitly rolled back to an earlier block.
    Reset(Arc<ChainEntry>),
}
