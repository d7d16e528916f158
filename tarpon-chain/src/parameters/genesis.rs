//! Genesis blocks for each Bitcoin network.
//!
//! All three networks share one coinbase (the famous Times headline); they
//! differ only in the header's time, bits, and nonce. The blocks are built
//! here rather than parsed from hex so the genesis hash constants can never
//! drift from the serializer.

use std::iter::FromIterator;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use lazy_static::lazy_static;

use crate::amount::{Amount, COIN};
use crate::block::{self, merkle, Block, Header};
use crate::parameters::Network;
use crate::transaction::{LockTime, Transaction, SEQUENCE_FINAL};
use crate::transparent::{CoinbaseData, Input, Output, Script, Witness};
use crate::work::difficulty::CompactDifficulty;

/// The previous block hash for the genesis block.
///
/// All networks use the `null` value for the parent of the genesis block.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// `The Times 03/Jan/2009 Chancellor on brink of second bailout for banks`,
/// wrapped in the original client's script pushes: the compact target
/// `0x1d00ffff`, the constant `4`, then the headline.
const GENESIS_COINBASE_DATA: &str =
    "04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e20\
     6272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73";

/// The uncompressed public key the genesis reward was paid to, wrapped in a
/// pay-to-pubkey script.
const GENESIS_OUTPUT_SCRIPT: &str =
    "4104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f355\
     04e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac";

fn genesis_coinbase() -> Transaction {
    let data = hex::decode(GENESIS_COINBASE_DATA).expect("hard-coded coinbase data parses");
    let script = hex::decode(GENESIS_OUTPUT_SCRIPT).expect("hard-coded output script parses");

    Transaction::new(
        1,
        vec![Input::Coinbase {
            data: CoinbaseData(data),
            sequence: SEQUENCE_FINAL,
            witness: Witness::empty(),
        }],
        vec![Output {
            value: Amount::from_sat(50 * COIN).expect("genesis subsidy is in range"),
            lock_script: Script::new(script),
        }],
        LockTime::unlocked(),
    )
}

fn build_genesis(time: i64, bits: u32, nonce: u32) -> Block {
    let coinbase = genesis_coinbase();
    let merkle_root = merkle::Root::from_iter(std::iter::once(coinbase.hash()));

    Block {
        header: Header::new(
            1,
            GENESIS_PREVIOUS_BLOCK_HASH,
            merkle_root,
            Utc.timestamp(time, 0),
            CompactDifficulty(bits),
            nonce,
        ),
        transactions: vec![Arc::new(coinbase)],
    }
}

lazy_static! {
    static ref MAINNET_GENESIS: Block = build_genesis(1_231_006_505, 0x1d00_ffff, 2_083_236_893);
    static ref TESTNET_GENESIS: Block = build_genesis(1_296_688_602, 0x1d00_ffff, 414_098_458);
    static ref REGTEST_GENESIS: Block = build_genesis(1_296_688_602, 0x207f_ffff, 2);
}

/// Returns the genesis block for `network`.
pub fn genesis_block(network: Network) -> &'static Block {
    match network {
        Network::Mainnet => &MAINNET_GENESIS,
        Network::Testnet => &TESTNET_GENESIS,
        Network::Regtest => &REGTEST_GENESIS,
    }
}

/// Returns the hash of the genesis block for `network`.
pub fn genesis_hash(network: Network) -> block::Hash {
    genesis_block(network).hash()
}
