//! BIP 68 relative lock times.

use tarpon_chain::block::Height;
use tarpon_chain::transaction::{
    Transaction, SEQUENCE_DISABLE_FLAG, SEQUENCE_GRANULARITY, SEQUENCE_MASK, SEQUENCE_TYPE_FLAG,
};
use tarpon_state::{ChainDB, ChainEntry, CoinView};

use crate::versionbits::LockFlags;

/// The earliest chain position at which a transaction's relative locks are
/// all satisfied. `-1` components mean "no constraint".
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequenceLocks {
    /// The transaction may be included in a block whose height exceeds this.
    pub min_height: i32,
    /// The transaction may be included once median time past exceeds this.
    pub min_time: i64,
}

impl SequenceLocks {
    fn unconstrained() -> SequenceLocks {
        SequenceLocks {
            min_height: -1,
            min_time: -1,
        }
    }
}

/// Compute the BIP 68 locks of `tx` for inclusion in the block after
/// `prev`, reading coin heights through `view`.
///
/// Relative locks only bind version-2+ transactions, only when the
/// deployment is active (`VERIFY_SEQUENCE`), and only inputs that leave the
/// disable bit unset. Height-type locks count blocks from the spent coin's
/// creation; time-type locks count `2^9`-second units from the median time
/// past of the block *before* the coin's creation.
pub fn get_locks<D: ChainDB + ?Sized>(
    db: &D,
    view: &CoinView,
    tx: &Transaction,
    prev: &ChainEntry,
    flags: LockFlags,
) -> SequenceLocks {
    let mut locks = SequenceLocks::unconstrained();

    if !flags.contains(LockFlags::VERIFY_SEQUENCE) || tx.is_coinbase() || tx.version < 2 {
        return locks;
    }

    for input in tx.inputs.iter() {
        let sequence = input.sequence();
        if sequence & SEQUENCE_DISABLE_FLAG != 0 {
            continue;
        }
        let outpoint = match input.outpoint() {
            Some(outpoint) => outpoint,
            None => continue,
        };

        // Coins created in the block under validation count from its own
        // height.
        let mut coin_height = view.coin_height(db, &outpoint);
        if coin_height == -1 {
            coin_height = prev.height.0 as i32 + 1;
        }

        let value = (sequence & SEQUENCE_MASK) as i32;
        if sequence & SEQUENCE_TYPE_FLAG == 0 {
            let height = coin_height + value - 1;
            locks.min_height = locks.min_height.max(height);
        } else {
            let reference_height = Height((coin_height - 1).max(0) as u32);
            let time = db
                .ancestor(prev, reference_height)
                .map(|entry| db.median_time_past(&entry))
                .unwrap_or(0);
            let time = time + ((i64::from(value as u32)) << SEQUENCE_GRANULARITY) - 1;
            locks.min_time = locks.min_time.max(time);
        }
    }

    locks
}

/// Are `locks` satisfied for the block after `prev`?
pub fn verify_locks<D: ChainDB + ?Sized>(
    db: &D,
    prev: &ChainEntry,
    locks: &SequenceLocks,
) -> bool {
    if locks.min_height != -1 && locks.min_height >= prev.height.0 as i32 + 1 {
        return false;
    }
    if locks.min_time != -1 && locks.min_time >= db.median_time_past(prev) {
        return false;
    }
    true
}
