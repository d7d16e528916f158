//! BIP 9 versionbits deployment parameters and threshold states.

use serde::{Deserialize, Serialize};

use super::Network;

/// Blocks signal readiness for a deployment through the version field; the
/// top three bits must match this pattern for the remaining bits to be read
/// as signals. (BIP 9)
pub const VERSION_TOP_BITS: u32 = 0x2000_0000;

/// The mask selecting the version bits that carry the BIP 9 pattern.
pub const VERSION_TOP_MASK: u32 = 0xe000_0000;

/// A soft fork deployed by miner signalling. (BIP 9)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Deployment {
    /// The canonical deployment name.
    pub name: &'static str,
    /// The version bit miners set to signal readiness.
    pub bit: u8,
    /// Signal counting starts at the first window boundary whose median
    /// time past reaches this timestamp.
    pub start_time: i64,
    /// The deployment fails if not locked in before a window boundary whose
    /// median time past reaches this timestamp.
    pub timeout: i64,
}

impl Deployment {
    /// Does `version` signal readiness for this deployment?
    pub fn signalled_by(&self, version: u32) -> bool {
        (version & VERSION_TOP_MASK) == VERSION_TOP_BITS && (version >> self.bit) & 1 == 1
    }
}

/// The BIP 9 threshold state of one deployment at one window boundary.
///
/// Transitions are evaluated once per signalling window and are monotonic:
/// `Defined → Started → LockedIn → Active`, with `Failed` reachable from
/// `Defined` and `Started` on timeout. `Active` and `Failed` are terminal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

impl ThresholdState {
    pub fn is_active(self) -> bool {
        matches!(self, ThresholdState::Active)
    }
}

const MAINNET_DEPLOYMENTS: &[Deployment] = &[
    Deployment {
        name: "csv",
        bit: 0,
        start_time: 1_462_060_800, // May 1 2016
        timeout: 1_493_596_800,    // May 1 2017
    },
    Deployment {
        name: "segwit",
        bit: 1,
        start_time: 1_479_168_000, // Nov 15 2016
        timeout: 1_510_704_000,    // Nov 15 2017
    },
];

const TESTNET_DEPLOYMENTS: &[Deployment] = &[
    Deployment {
        name: "csv",
        bit: 0,
        start_time: 1_456_790_400, // Mar 1 2016
        timeout: 1_493_596_800,    // May 1 2017
    },
    Deployment {
        name: "segwit",
        bit: 1,
        start_time: 1_462_060_800, // May 1 2016
        timeout: 1_493_596_800,    // May 1 2017
    },
];

/// Regtest deployments are always available and never expire, so tests can
/// drive activation purely by signalling.
const REGTEST_DEPLOYMENTS: &[Deployment] = &[
    Deployment {
        name: "csv",
        bit: 0,
        start_time: 0,
        timeout: std::i64::MAX,
    },
    Deployment {
        name: "segwit",
        bit: 1,
        start_time: 0,
        timeout: std::i64::MAX,
    },
];

pub(super) fn deployments(network: Network) -> &'static [Deployment] {
    match network {
        Network::Mainnet => MAINNET_DEPLOYMENTS,
        Network::Testnet => TESTNET_DEPLOYMENTS,
        Network::Regtest => REGTEST_DEPLOYMENTS,
    }
}
