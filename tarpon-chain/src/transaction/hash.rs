use std::fmt;

use serde::{Deserialize, Serialize};
use tarpon_wire_derive::WireSerialize;

use crate::serialization::{sha256d, WireDeserialize, WireError, WireSerialize};
#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use super::Transaction;

/// A transaction id: the double-SHA-256 of the transaction's *stripped*
/// (witness-free) serialization.
///
/// The same type doubles as the witness transaction id (wtxid), which hashes
/// the full serialization; see [`Transaction::witness_hash`].
///
/// Displayed byte-reversed, following the convention set by bitcoind.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, WireSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

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
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl WireDeserialize for Hash {
    fn wire_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, WireError> {
        Ok(Hash(<[u8; 32]>::wire_deserialize(&mut reader)?))
    }
}

impl<'a> From<&'a Transaction> for Hash {
    fn from(transaction: &'a Transaction) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        transaction
            .wire_serialize_stripped(&mut hash_writer)
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
