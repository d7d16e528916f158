//! Transactions and transaction-related structures.

use serde::{Deserialize, Serialize};

use crate::memoized::Memoized;
use crate::serialization::{self, sha256d};
use crate::{amount, amount::Amount, block, transparent, WireSerialize};

mod hash;
mod lock_time;
mod serialize;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

pub use hash::Hash;
pub use lock_time::LockTime;
pub use serialize::MAX_TX_SIZE;

/// The sequence value that opts an input out of lock-time enforcement.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// If set, the input's sequence number imposes no relative lock. (BIP 68)
pub const SEQUENCE_DISABLE_FLAG: u32 = 1 << 31;

/// If set, the input's relative lock is time-based; otherwise height-based.
/// (BIP 68)
pub const SEQUENCE_TYPE_FLAG: u32 = 1 << 22;

/// The bits of a sequence number that carry the relative lock value. (BIP 68)
pub const SEQUENCE_MASK: u32 = 0x0000_ffff;

/// Time-based relative locks count in units of `2^GRANULARITY` seconds.
/// (BIP 68)
pub const SEQUENCE_GRANULARITY: u32 = 9;

/// A Bitcoin transaction.
///
/// A transaction is an encoded data structure that facilitates the transfer
/// of value between public key addresses. Everything is designed to ensure
/// that transactions can be created, propagated on the network, validated,
/// and finally added to the global ledger of transactions (the blockchain).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The transaction version. Versions of 2 and above opt in to BIP 68
    /// relative lock times.
    pub version: i32,
    /// The transaction inputs.
    pub inputs: Vec<transparent::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transparent::Output>,
    /// The transaction lock time.
    pub lock_time: LockTime,
    hash: Memoized<Hash>,
    witness_hash: Memoized<Hash>,
}

impl Transaction {
    pub fn new(
        version: i32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        lock_time: LockTime,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Memoized::new(),
            witness_hash: Memoized::new(),
        }
    }

    /// Get the id of this transaction: the hash of its stripped encoding.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Get the witness id of this transaction: the hash of its full
    /// encoding.
    ///
    /// Equal to [`hash`](Self::hash) when no input carries a witness.
    pub fn witness_hash(&self) -> Hash {
        if let Some(hash) = self.witness_hash.value() {
            return hash;
        }
        if !self.has_witness() {
            return self.hash();
        }
        let mut hash_writer = sha256d::Writer::default();
        self.wire_serialize(&mut hash_writer)
            .expect("sha256d::Writer is infallible");
        Hash(hash_writer.finish())
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, transparent::Input::Coinbase { .. }))
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && matches!(
                self.inputs.get(0),
                Some(transparent::Input::Coinbase { .. })
            )
    }

    /// Does any input carry witness data?
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness().is_empty())
    }

    /// The serialized size in bytes, witness included. (BIP 144)
    pub fn size(&self) -> usize {
        let mut counter = serialization::SizeWriter::default();
        self.wire_serialize(&mut counter)
            .expect("SizeWriter is infallible");
        counter.0
    }

    /// The serialized size in bytes of the stripped (witness-free) encoding.
    pub fn stripped_size(&self) -> usize {
        let mut counter = serialization::SizeWriter::default();
        self.wire_serialize_stripped(&mut counter)
            .expect("SizeWriter is infallible");
        counter.0
    }

    /// The BIP 141 transaction weight: witness bytes count once, everything
    /// else four times.
    pub fn weight(&self) -> usize {
        3 * self.stripped_size() + self.size()
    }

    /// Is this transaction final at the given chain position?
    ///
    /// `time` is the reference clock mandated by the active deployment
    /// state: the block time before BIP 113, the previous block's median
    /// time past after.
    pub fn is_final(&self, height: block::Height, time: i64) -> bool {
        if self.lock_time.raw() == 0 {
            return true;
        }
        if self.lock_time.is_satisfied_by(height, time) {
            return true;
        }
        // A lock time is void if every input opted out.
        self.inputs
            .iter()
            .all(|input| input.sequence() == SEQUENCE_FINAL)
    }

    /// Count legacy signature operations: the opcode scan over every unlock
    /// and lock script, without BIP 16 redeem-script refinement.
    pub fn legacy_sigops(&self) -> usize {
        let mut count = 0;
        for input in self.inputs.iter() {
            if let Some(unlock_script) = input.unlock_script() {
                count += unlock_script.sigops(false);
            }
        }
        for output in self.outputs.iter() {
            count += output.lock_script.sigops(false);
        }
        count
    }

    /// The sum of this transaction's output values.
    pub fn output_value(&self) -> Result<Amount, amount::Error> {
        self.outputs
            .iter()
            .try_fold(Amount::ZERO, |sum, output| sum.checked_add(output.value))
    }
}
