//! Block-template assembly on top of a mempool snapshot.
//!
//! The miner core never talks to the network and never mutates the mempool:
//! given the chain tip and an immutable [`MempoolSnapshot`], it assembles a
//! candidate block that maximizes collected fees under the weight and sigop
//! limits, honoring in-snapshot dependencies. Solving the header is the
//! caller's business (external mining hardware, or a test loop).

mod entry;
mod template;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use tarpon_chain::transparent::Script;
use tarpon_state::{ChainDB, ChainEntry};

pub use entry::{MempoolEntry, MempoolSnapshot};
pub use template::{BlockTemplate, TemplateItem, TemplateOptions};

/// The template producer.
///
/// Long-running callers (a `getblocktemplate` loop, a CPU miner) share the
/// `stopping` flag: it is checked between attempts, so dropping or stopping
/// a miner cancels future work without interrupting a template mid-build.
pub struct Miner {
    options: TemplateOptions,
    stopping: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(options: TemplateOptions) -> Miner {
        Miner {
            options,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A convenience constructor paying to `payout_script` with default
    /// limits.
    pub fn pay_to(payout_script: Script) -> Miner {
        Miner::new(TemplateOptions::new(payout_script))
    }

    /// Signal any loop driving this miner to wind down.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// A clone of the stop flag, for loops living elsewhere.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stopping.clone()
    }

    /// Assemble a candidate block on `tip` from `snapshot`.
    pub fn create_block<D: ChainDB + ?Sized>(
        &self,
        db: &mut D,
        tip: &ChainEntry,
        snapshot: &MempoolSnapshot,
        now: DateTime<Utc>,
    ) -> BlockTemplate {
        template::build_template(db, tip, snapshot, &self.options, now)
    }
}
