//! Consensus parameters for each Bitcoin network.

mod deployments;
mod genesis;

pub use deployments::{Deployment, ThresholdState, VERSION_TOP_BITS, VERSION_TOP_MASK};
pub use genesis::{genesis_block, genesis_hash, GENESIS_PREVIOUS_BLOCK_HASH};

use std::collections::HashMap;

use chrono::Duration;
use lazy_static::lazy_static;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::block;
use crate::work::difficulty::{CompactDifficulty, Work};

/// A Bitcoin network.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The public test network.
    Testnet,
    /// The local regression-test network: trivial proof of work, no
    /// retargeting, short deployment windows.
    Regtest,
}

impl Default for Network {
    fn default() -> Network {
        Network::Mainnet
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
impl proptest::arbitrary::Arbitrary for Network {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        prop_oneof![
            Just(Network::Mainnet),
            Just(Network::Testnet),
            Just(Network::Regtest)
        ]
        .boxed()
    }

    type Strategy = proptest::strategy::BoxedStrategy<Self>;
}

/// Mainnet checkpoint blocks.
///
/// Hashes of blocks buried deep enough that reorganizing across them is
/// inconceivable; candidate blocks at these heights must match. From
/// `bitcoin-cli getblockhash <height>`.
const MAINNET_CHECKPOINTS: &[(u32, &str)] = &[
    (
        11111,
        "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d",
    ),
    (
        33333,
        "000000002dd5588a74784eaa7ab0507a18ad16a236e7b1ce69f00d7ddfb5d0a6",
    ),
    (
        105000,
        "00000000000291ce28027faea320c8d2b054b2e0fe44a773f3eefb151d6bdc97",
    ),
    (
        134444,
        "00000000000005b12ffd4cd315cd34ffd4a594f430ac814c91184a0d42d2b0fe",
    ),
    (
        168000,
        "000000000000099e61ea72015e79632f216fe6cb33d7899acb35b75c8303b763",
    ),
    (
        210000,
        "000000000000048b95347e83192f69cf0366076336c639f9b7228e9ba171342e",
    ),
    (
        250000,
        "000000000000003887df1f29024b06fc2200b55f8af8f35453d7be294df2d214",
    ),
    (
        295000,
        "00000000000000004d9b4ef50f0f9d686fd69db2e03af35a100370c64632a983",
    ),
];

/// Testnet checkpoint blocks.
const TESTNET_CHECKPOINTS: &[(u32, &str)] = &[(
    546,
    "000000002a936ca763904c3c35fce2f3556c559c0214345d31b1bcebf76acb70",
)];

/// Heights of the two mainnet blocks that duplicated an earlier, unspent
/// coinbase before BIP 30 banned the practice, with the duplicating block's
/// hash. These are exempt from the BIP 30 check.
const MAINNET_BIP30_EXCEPTIONS: &[(u32, &str)] = &[
    (
        91842,
        "00000000000a4d0a398161ffc163c503763b1f4360639393e0e4c8e300e0caec",
    ),
    (
        91880,
        "00000000000743f190a18c5577a3c2d2a1f610ae9601ac046a38084ccb7cd721",
    ),
];

lazy_static! {
    static ref MAINNET_CHECKPOINT_MAP: HashMap<u32, block::Hash> =
        parse_hash_table(MAINNET_CHECKPOINTS);
    static ref TESTNET_CHECKPOINT_MAP: HashMap<u32, block::Hash> =
        parse_hash_table(TESTNET_CHECKPOINTS);
    static ref MAINNET_BIP30_MAP: HashMap<u32, block::Hash> =
        parse_hash_table(MAINNET_BIP30_EXCEPTIONS);
}

fn parse_hash_table(table: &[(u32, &str)]) -> HashMap<u32, block::Hash> {
    table
        .iter()
        .map(|(height, hash)| (*height, hash.parse().expect("hard-coded hash parses")))
        .collect()
}

impl Network {
    /// The easiest permitted target, in compact form.
    pub fn pow_limit_compact(self) -> CompactDifficulty {
        match self {
            Network::Mainnet | Network::Testnet => CompactDifficulty(0x1d00_ffff),
            Network::Regtest => CompactDifficulty(0x207f_ffff),
        }
    }

    /// The number of blocks between difficulty adjustments.
    pub fn retarget_interval(self) -> u32 {
        2016
    }

    /// The intended wall-clock span of one retarget interval.
    pub fn target_timespan(self) -> Duration {
        Duration::days(14)
    }

    /// The intended spacing between blocks.
    pub fn target_spacing(self) -> Duration {
        Duration::seconds(10 * 60)
    }

    /// Whether difficulty adjustment is disabled entirely (regtest).
    pub fn no_retargeting(self) -> bool {
        matches!(self, Network::Regtest)
    }

    /// Whether a block more than two spacings late may drop to the minimum
    /// difficulty (the testnet "20-minute rule").
    pub fn reset_target(self) -> bool {
        matches!(self, Network::Testnet)
    }

    /// The timestamp at which BIP 16 (P2SH) activated.
    pub fn bip16_time(self) -> i64 {
        // Apr 1 2012
        1_333_238_400
    }

    /// The height from which coinbases must commit to their block height.
    /// (BIP 34)
    pub fn bip34_height(self) -> block::Height {
        match self {
            Network::Mainnet => block::Height(227_931),
            Network::Testnet => block::Height(21_111),
            Network::Regtest => block::Height(500),
        }
    }

    /// The height from which signatures must be strict DER. (BIP 66)
    pub fn bip66_height(self) -> block::Height {
        match self {
            Network::Mainnet => block::Height(363_725),
            Network::Testnet => block::Height(330_776),
            Network::Regtest => block::Height(1_251),
        }
    }

    /// The height from which `OP_CHECKLOCKTIMEVERIFY` is enforced. (BIP 65)
    pub fn bip65_height(self) -> block::Height {
        match self {
            Network::Mainnet => block::Height(388_381),
            Network::Testnet => block::Height(581_885),
            Network::Regtest => block::Height(1_351),
        }
    }

    /// Is `(height, hash)` one of the historical duplicate-coinbase blocks
    /// exempt from BIP 30?
    pub fn is_bip30_exception(self, height: block::Height, hash: &block::Hash) -> bool {
        match self {
            Network::Mainnet => MAINNET_BIP30_MAP.get(&height.0) == Some(hash),
            Network::Testnet | Network::Regtest => false,
        }
    }

    /// The BIP 9 deployments for this network.
    pub fn deployments(self) -> &'static [Deployment] {
        deployments::deployments(self)
    }

    /// Look up a BIP 9 deployment by name.
    pub fn deployment(self, name: &str) -> Option<&'static Deployment> {
        self.deployments()
            .iter()
            .find(|deployment| deployment.name == name)
    }

    /// The BIP 9 signalling window size, in blocks.
    pub fn miner_window(self) -> u32 {
        match self {
            Network::Mainnet | Network::Testnet => 2016,
            Network::Regtest => 144,
        }
    }

    /// The number of signalling blocks per window required to lock a
    /// deployment in.
    pub fn activation_threshold(self) -> u32 {
        match self {
            Network::Mainnet => 1916,
            Network::Testnet => 1512,
            Network::Regtest => 108,
        }
    }

    /// The checkpoint hash for `height`, if one is recorded.
    pub fn checkpoint(self, height: block::Height) -> Option<block::Hash> {
        match self {
            Network::Mainnet => MAINNET_CHECKPOINT_MAP.get(&height.0).copied(),
            Network::Testnet => TESTNET_CHECKPOINT_MAP.get(&height.0).copied(),
            Network::Regtest => None,
        }
    }

    /// The height of the last recorded checkpoint.
    pub fn last_checkpoint(self) -> block::Height {
        match self {
            Network::Mainnet => block::Height(295_000),
            Network::Testnet => block::Height(546),
            Network::Regtest => block::Height(0),
        }
    }

    /// The minimum cumulative work a chain must carry before this node
    /// considers itself synced. Updated at release time.
    pub fn minimum_chain_work(self) -> Work {
        match self {
            Network::Mainnet => Work(
                U256::from_big_endian(
                    &hex::decode(
                        "00000000000000000000000000000000000000001533efd8d716a517fe2c5008",
                    )
                    .expect("hard-coded chain work parses"),
                ),
            ),
            Network::Testnet => Work(U256::from(1u64) << 40),
            Network::Regtest => Work::zero(),
        }
    }

    /// How stale the tip may be while the node still counts as synced.
    pub fn max_tip_age(self) -> Duration {
        match self {
            Network::Mainnet | Network::Testnet => Duration::hours(24),
            // Regtest chains sit idle between test blocks.
            Network::Regtest => Duration::weeks(52 * 100),
        }
    }

    /// The number of blocks between block-subsidy halvings.
    pub fn halving_interval(self) -> u32 {
        match self {
            Network::Mainnet | Network::Testnet => 210_000,
            Network::Regtest => 150,
        }
    }

    /// The number of confirmations before a coinbase output may be spent.
    pub fn coinbase_maturity(self) -> u32 {
        100
    }
}
