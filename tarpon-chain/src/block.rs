//! Blocks and block-related structures (heights, headers, etc.)
#![allow(clippy::unit_arg)]

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tarpon_wire_derive::WireSerialize;

pub use hash::Hash;
pub use header::{CountedHeader, Header};
pub use height::Height;
pub use serialize::{
    MAX_BLOCK_SIGOPS, MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_SIZE, MAX_BLOCK_WEIGHT,
    WITNESS_SCALE_FACTOR,
};

use crate::serialization::SizeWriter;
use crate::{fmt::DisplayToDebug, transaction::Transaction, transparent, WireSerialize};

/// The script prefix that marks a coinbase output as the witness
/// commitment: `OP_RETURN PUSH36 0xaa21a9ed`. (BIP 141)
pub const WITNESS_COMMITMENT_PREFIX: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

/// A Bitcoin block, containing a header and a list of transactions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, WireSerialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions.
    pub transactions: Vec<Arc<Transaction>>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fmter = f.debug_struct("Block");
        if let Some(height) = self.coinbase_height() {
            fmter.field("height", &height);
        }

        fmter.field("hash", &DisplayToDebug(self.hash())).finish()
    }
}

impl Block {
    /// Return the block height reported in the coinbase transaction, if any.
    ///
    /// Before BIP 34 activation miners were not required to include the
    /// height, so its absence is only an error in a contextual check.
    pub fn coinbase_height(&self) -> Option<Height> {
        self.transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| match input {
                transparent::Input::Coinbase { ref data, .. } => data.claimed_height(),
                _ => None,
            })
    }

    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The serialized size in bytes, witness included.
    pub fn size(&self) -> usize {
        let mut counter = SizeWriter::default();
        self.wire_serialize(&mut counter)
            .expect("SizeWriter is infallible");
        counter.0
    }

    /// The serialized size in bytes with all witness data stripped.
    pub fn stripped_size(&self) -> usize {
        let mut counter = SizeWriter::default();
        self.header
            .wire_serialize(&mut counter)
            .expect("SizeWriter is infallible");
        counter.0 += crate::compactsize::CompactSize::size(self.transactions.len());
        for tx in self.transactions.iter() {
            counter.0 += tx.stripped_size();
        }
        counter.0
    }

    /// The BIP 141 block weight: witness bytes count once, everything else
    /// four times. Limited by [`MAX_BLOCK_WEIGHT`].
    pub fn weight(&self) -> usize {
        3 * self.stripped_size() + self.size()
    }

    /// Does any transaction in this block carry witness data?
    pub fn has_witness(&self) -> bool {
        self.transactions.iter().any(|tx| tx.has_witness())
    }

    /// The witness commitment carried by the coinbase, if any: the payload
    /// of the last coinbase output whose script starts with the
    /// [`WITNESS_COMMITMENT_PREFIX`]. (BIP 141)
    pub fn witness_commitment(&self) -> Option<[u8; 32]> {
        let coinbase = self.transactions.get(0)?;
        for output in coinbase.outputs.iter().rev() {
            let script = output.lock_script.as_bytes();
            if script.len() >= 38 && script[0..6] == WITNESS_COMMITMENT_PREFIX {
                let mut commitment = [0u8; 32];
                commitment.copy_from_slice(&script[6..38]);
                return Some(commitment);
            }
        }
        None
    }

    /// The witness nonce: the single 32-byte item of the coinbase input's
    /// witness stack. (BIP 141)
    pub fn witness_nonce(&self) -> Option<[u8; 32]> {
        self.transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| input.witness().sole_item_32())
    }

    /// The root of this block's transaction Merkle tree, with the
    /// CVE-2012-2459 mutation flag.
    pub fn merkle_root_with_mutation(&self) -> (merkle::Root, bool) {
        let hashes: Vec<_> = self.transactions.iter().map(|tx| tx.hash()).collect();
        merkle::root_with_mutation(&hashes)
    }

    /// The root of this block's witness-id Merkle tree, with the coinbase
    /// slot zeroed. (BIP 141)
    pub fn witness_root(&self) -> merkle::Root {
        let hashes: Vec<_> = self
            .transactions
            .iter()
            .map(|tx| tx.witness_hash())
            .collect();
        merkle::witness_root(&hashes)
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        block.header.hash()
    }
}
