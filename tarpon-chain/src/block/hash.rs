use std::{fmt, io};

use serde::{Deserialize, Serialize};
use tarpon_wire_derive::WireSerialize;

use crate::serialization::{sha256d, WireDeserialize, WireError, WireSerialize};
#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use super::Header;

/// A hash of a block, used to identify blocks and link blocks into a chain. ⛓️
///
/// Technically, this is the double-SHA-256 hash of a block *header*, but since
/// the block header includes the Merkle root of the transaction Merkle tree,
/// it binds the entire contents of the block and is used to identify entire
/// blocks.
///
/// Internally the bytes are in wire order (little-endian); the display form
/// follows the u256 convention set by bitcoind and is byte-reversed.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, WireSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used as the "previous block hash" of the genesis
    /// block.
    pub const ZERO: Hash = Hash([0; 32]);

    pub fn from_bytes_exact(bytes: [u8; 32]) -> Hash {
        Hash(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.write_str(&hex::encode(&reversed_bytes))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("block::Hash")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl WireDeserialize for Hash {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<Self, WireError> {
        Ok(Hash(<[u8; 32]>::wire_deserialize(&mut reader)?))
    }
}

impl<'a> From<&'a Header> for Hash {
    fn from(block_header: &'a Header) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        block_header
            .wire_serialize(&mut hash_writer)
            .expect("sha256d::Writer is infallible");
        Self(hash_writer.finish())
    }
}

impl std::str::FromStr for Hash {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(WireError::Parse("hex decoding error"))
        } else {
            bytes.reverse();
            Ok(Hash(bytes))
        }
    }
}
