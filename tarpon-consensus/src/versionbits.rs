//! BIP 9 versionbits tracking and the per-height deployment state.
//!
//! Two kinds of rule activation feed the [`DeploymentState`]: height- or
//! time-gated rules (BIP 16 by timestamp; BIPs 34, 66, 65 by height) and
//! bit-voted deployments evaluated by the BIP 9 threshold state machine
//! over `miner_window`-sized windows.

use std::sync::Arc;

use bitflags::bitflags;

use tarpon_chain::block::Height;
use tarpon_chain::parameters::{Deployment, ThresholdState, VERSION_TOP_BITS};
use tarpon_state::{ChainDB, ChainEntry, HashOrHeight};

bitflags! {
    /// Script-verification flags derived from the active rule set.
    pub struct VerifyFlags: u32 {
        /// Evaluate pay-to-script-hash. (BIP 16)
        const P2SH = 1 << 0;
        /// Enforce strict DER signatures. (BIP 66)
        const DERSIG = 1 << 1;
        /// Enforce `OP_CHECKLOCKTIMEVERIFY`. (BIP 65)
        const CHECKLOCKTIMEVERIFY = 1 << 2;
        /// Enforce `OP_CHECKSEQUENCEVERIFY`. (BIP 112)
        const CHECKSEQUENCEVERIFY = 1 << 3;
        /// Evaluate witness programs. (BIP 141)
        const WITNESS = 1 << 4;
        /// Require the CHECKMULTISIG dummy element to be null. (BIP 147)
        const NULLDUMMY = 1 << 5;
    }
}

bitflags! {
    /// Lock-time verification flags derived from the active rule set.
    pub struct LockFlags: u32 {
        /// Enforce BIP 68 relative lock times.
        const VERIFY_SEQUENCE = 1 << 0;
        /// Measure lock times against median time past. (BIP 113)
        const MEDIAN_TIME_PAST = 1 << 1;
    }
}

/// Everything rule-activation determines about the next block: script
/// flags, lock flags, and whether coinbases must commit to their height.
///
/// A pure function of the chain position; the chain caches the tip's state
/// and promotes it on every commit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeploymentState {
    pub flags: VerifyFlags,
    pub lock_flags: LockFlags,
    /// Coinbase height commitment required. (BIP 34)
    pub bip34: bool,
}

impl Default for DeploymentState {
    fn default() -> DeploymentState {
        DeploymentState {
            flags: VerifyFlags::empty(),
            lock_flags: LockFlags::empty(),
            bip34: false,
        }
    }
}

impl DeploymentState {
    pub fn has_p2sh(&self) -> bool {
        self.flags.contains(VerifyFlags::P2SH)
    }

    pub fn has_csv(&self) -> bool {
        self.flags.contains(VerifyFlags::CHECKSEQUENCEVERIFY)
    }

    pub fn has_witness(&self) -> bool {
        self.flags.contains(VerifyFlags::WITNESS)
    }

    pub fn has_mtp(&self) -> bool {
        self.lock_flags.contains(LockFlags::MEDIAN_TIME_PAST)
    }
}

/// Evaluate the BIP 9 threshold state of `deployment` for a block whose
/// parent is `prev`.
///
/// States only change at window boundaries, so the walk first steps back to
/// the last block of the previous window, then follows boundary entries
/// toward genesis until it finds a memoized state (or bottoms out in
/// `Defined`), and finally folds forward over the uncached boundaries,
/// memoizing each as it goes. The cache is consulted and filled through the
/// database, so it survives restarts.
pub fn threshold_state<D: ChainDB + ?Sized>(
    db: &mut D,
    prev: &ChainEntry,
    deployment: &Deployment,
) -> ThresholdState {
    let network = db.network();
    let window = i64::from(network.miner_window());
    let threshold = network.activation_threshold();

    let mut state = ThresholdState::Defined;
    let mut compute: Vec<Arc<ChainEntry>> = Vec::new();

    // The last block of the window before the one `prev.height + 1` is in.
    let boundary = i64::from(prev.height.0) - ((i64::from(prev.height.0) + 1) % window);
    let mut entry = if boundary < 0 {
        None
    } else {
        db.ancestor(prev, Height(boundary as u32))
    };

    while let Some(current) = entry.take() {
        if let Some(cached) = db.state_cache_get(deployment.bit, &current.hash) {
            state = cached;
            break;
        }
        if db.median_time_past(&current) < deployment.start_time {
            // Definitively Defined this far back; everything earlier is too.
            db.state_cache_set(deployment.bit, current.hash, ThresholdState::Defined);
            break;
        }
        let earlier = i64::from(current.height.0) - window;
        let next = if earlier < 0 {
            None
        } else {
            db.ancestor(&current, Height(earlier as u32))
        };
        compute.push(current);
        entry = next;
    }

    while let Some(current) = compute.pop() {
        match state {
            ThresholdState::Defined => {
                let time = db.median_time_past(&current);
                if time >= deployment.timeout {
                    state = ThresholdState::Failed;
                } else if time >= deployment.start_time {
                    state = ThresholdState::Started;
                }
            }
            ThresholdState::Started => {
                let time = db.median_time_past(&current);
                if time >= deployment.timeout {
                    state = ThresholdState::Failed;
                } else {
                    let mut count = 0u32;
                    let mut walk = Some(current.clone());
                    for _ in 0..window {
                        match walk {
                            Some(block) => {
                                if deployment.signalled_by(block.version) {
                                    count += 1;
                                }
                                walk = db.get_entry(HashOrHeight::Hash(
                                    block.previous_block_hash,
                                ));
                            }
                            None => break,
                        }
                    }
                    if count >= threshold {
                        state = ThresholdState::LockedIn;
                    }
                }
            }
            ThresholdState::LockedIn => state = ThresholdState::Active,
            ThresholdState::Active | ThresholdState::Failed => {}
        }
        db.state_cache_set(deployment.bit, current.hash, state);
    }

    state
}

/// Compute the [`DeploymentState`] governing a block with timestamp `time`
/// whose parent is `prev`.
pub fn deployment_state<D: ChainDB + ?Sized>(
    db: &mut D,
    time: i64,
    prev: &ChainEntry,
) -> DeploymentState {
    let network = db.network();
    let height = prev.height.next();

    let mut state = DeploymentState::default();

    if time >= network.bip16_time() {
        state.flags |= VerifyFlags::P2SH;
    }
    if height >= network.bip34_height() {
        state.bip34 = true;
    }
    if height >= network.bip66_height() {
        state.flags |= VerifyFlags::DERSIG;
    }
    if height >= network.bip65_height() {
        state.flags |= VerifyFlags::CHECKLOCKTIMEVERIFY;
    }

    if let Some(csv) = network.deployment("csv") {
        if threshold_state(db, prev, csv).is_active() {
            state.flags |= VerifyFlags::CHECKSEQUENCEVERIFY;
            state.lock_flags |= LockFlags::VERIFY_SEQUENCE | LockFlags::MEDIAN_TIME_PAST;
        }
    }
    if let Some(segwit) = network.deployment("segwit") {
        if threshold_state(db, prev, segwit).is_active() {
            state.flags |= VerifyFlags::WITNESS | VerifyFlags::NULLDUMMY;
        }
    }

    state
}

/// The version a miner should stamp on the next block: the BIP 9 pattern
/// with a signal bit for every deployment still collecting votes.
pub fn compute_block_version<D: ChainDB + ?Sized>(db: &mut D, prev: &ChainEntry) -> u32 {
    let mut version = VERSION_TOP_BITS;
    for deployment in db.network().deployments() {
        match threshold_state(db, prev, deployment) {
            ThresholdState::Started | ThresholdState::LockedIn => {
                version |= 1 << deployment.bit;
            }
            _ => {}
        }
    }
    version
}
