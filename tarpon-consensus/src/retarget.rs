//! Difficulty retargeting.

use chrono::{DateTime, Utc};
use primitive_types::U256;

use tarpon_chain::block::Height;
use tarpon_chain::parameters::Network;
use tarpon_chain::work::difficulty::{CompactDifficulty, ExpandedDifficulty};
use tarpon_state::{ChainDB, ChainEntry, HashOrHeight};

/// The target required of a block with timestamp `time` whose parent is
/// `prev` (`None` for the genesis block itself).
///
/// Off retarget boundaries the parent's target carries over, except on
/// networks with `reset_target` (testnet), where a block more than two
/// spacings late may use the minimum difficulty and later blocks must look
/// back past such min-difficulty blocks for the real target. On a boundary,
/// the classic adjustment runs against the first block of the closing
/// interval.
pub fn get_target<D: ChainDB + ?Sized>(
    db: &D,
    network: Network,
    time: DateTime<Utc>,
    prev: Option<&ChainEntry>,
) -> CompactDifficulty {
    let limit = network.pow_limit_compact();

    let prev = match prev {
        Some(prev) => prev,
        None => return limit,
    };

    if network.no_retargeting() {
        return prev.bits;
    }

    let interval = network.retarget_interval();
    if (prev.height.0 + 1) % interval != 0 {
        if network.reset_target() {
            // If the chain stalled for two spacings, allow a minimum
            // difficulty block.
            let reset_cutoff = prev.time + network.target_spacing() * 2;
            if time > reset_cutoff {
                return limit;
            }
            // Otherwise find the last real target, skipping over any
            // min-difficulty blocks since the last boundary.
            let mut current = match db.get_entry(HashOrHeight::Hash(prev.hash)) {
                Some(entry) => entry,
                None => return limit,
            };
            while current.height.0 % interval != 0
                && current.bits == limit
            {
                match db.get_entry(HashOrHeight::Hash(current.previous_block_hash)) {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
            return current.bits;
        }
        return prev.bits;
    }

    let first = match db.ancestor(prev, Height(prev.height.0 + 1 - interval)) {
        Some(first) => first,
        None => return limit,
    };
    retarget(network, prev, &first)
}

/// One difficulty adjustment: scale the closing interval's target by the
/// ratio of actual to intended timespan, clamped to a factor of four in
/// either direction and capped at the network minimum.
pub fn retarget(network: Network, prev: &ChainEntry, first: &ChainEntry) -> CompactDifficulty {
    let limit = network.pow_limit_compact();
    let limit_expanded = ExpandedDifficulty::target_difficulty_limit(network);

    let target_timespan = network.target_timespan().num_seconds();
    let mut actual = prev.time.timestamp() - first.time.timestamp();
    if actual < target_timespan / 4 {
        actual = target_timespan / 4;
    }
    if actual > target_timespan * 4 {
        actual = target_timespan * 4;
    }

    let old_target = match prev.bits.to_expanded() {
        Some(target) => target.to_u256(),
        None => return limit,
    };

    let new_target = match old_target.checked_mul(U256::from(actual as u64)) {
        Some(scaled) => scaled / U256::from(target_timespan as u64),
        None => return limit,
    };

    let new_target = ExpandedDifficulty::from_u256(new_target);
    if new_target > limit_expanded {
        return limit;
    }
    new_target.to_compact()
}
