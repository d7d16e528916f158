use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tarpon_wire_derive::WireSerialize;

use crate::memoized::Memoized;
use crate::serialization::{sha256d, WireDeserialize, WireError, WireSerialize};
use crate::work::difficulty::{CompactDifficulty, ExpandedDifficulty};

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// How are blocks chained together? They are chained together via the
/// backwards reference (previous header hash) present in the block
/// header. Each block points backwards to its parent, all the way
/// back to the genesis block (the first block in the blockchain).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, WireSerialize)]
pub struct Header {
    /// The block's version field.
    ///
    /// Interpreted as a signed 32-bit integer by the protocol, but all
    /// version arithmetic (versionbits signalling in particular) treats it
    /// as a bag of bits, so it is stored unsigned.
    pub version: u32,

    /// The hash of the previous block, used to create a chain of blocks back
    /// to the genesis block.
    ///
    /// This ensures no previous block can be changed without also changing
    /// this block's header.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the block header to
    /// the transactions in the block.
    pub merkle_root: merkle::Root,

    /// The block timestamp is a Unix epoch time (UTC) when the miner
    /// started hashing the header (according to the miner).
    pub time: DateTime<Utc>,

    /// An encoded version of the target threshold this block's header
    /// hash must be less than or equal to, in the same nBits format
    /// used by Bitcoin.
    pub bits: CompactDifficulty,

    /// An arbitrary field that miners can change to modify the header
    /// hash in order to produce a hash less than or equal to the
    /// target threshold.
    pub nonce: u32,

    /// The hash of this header, cached at parse time.
    ///
    /// Parsed headers are immutable, so the cache is filled exactly once;
    /// hand-built headers stay mutable and re-hash on every call. Not part
    /// of the consensus serialization.
    hash: Memoized<Hash>,
}

impl Header {
    /// The length of the serialized header in bytes.
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: DateTime<Utc>,
        bits: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            bits,
            nonce,
            hash: Memoized::new(),
        }
    }

    /// Compute the hash of this header, reusing the parse-time cache when
    /// one is present.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Check the header's proof of work: the hash, interpreted as a 256-bit
    /// little-endian integer, must not exceed the target encoded in `bits`.
    ///
    /// Returns `false` for unexpandable `bits` encodings; whether the target
    /// is one this chain position *permits* is a contextual question answered
    /// by the retarget check.
    pub fn verify_pow(&self) -> bool {
        let target = match self.bits.to_expanded() {
            Some(target) => target,
            None => return false,
        };
        ExpandedDifficulty::from_hash(&self.hash()) <= target
    }
}

impl WireDeserialize for Header {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<Self, WireError> {
        // Read the full 80 bytes up front so the hash comes for free,
        // instead of reserializing later.
        let mut raw = [0u8; 80];
        reader.read_exact(&mut raw)?;
        let own_hash = Hash(sha256d::digest(&raw));

        let mut cursor = io::Cursor::new(&raw[..]);
        Ok(Header {
            version: u32::wire_deserialize(&mut cursor)?,
            previous_block_hash: Hash::wire_deserialize(&mut cursor)?,
            merkle_root: merkle::Root::wire_deserialize(&mut cursor)?,
            time: <DateTime<Utc>>::wire_deserialize(&mut cursor)?,
            bits: CompactDifficulty::wire_deserialize(&mut cursor)?,
            nonce: u32::wire_deserialize(&mut cursor)?,
            hash: Memoized::from(own_hash),
        })
    }
}

/// A header with a count of the number of transactions in its block.
///
/// This structure is used in the `headers` network message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedHeader {
    pub header: Header,
    pub transaction_count: usize,
}
