//! Wire impls for transactions: the legacy layout, and the BIP 144 layout
//! when any input carries a witness.

use std::io;

use crate::compactsize::CompactSize;
use crate::memoized::Memoized;
use crate::serialization::{WireDeserialize, WireError, WireSerialize};
use crate::transparent::{Input, Output, Witness};

use super::{Hash, LockTime, Transaction};

/// The maximum stripped size of a transaction, in bytes: a transaction can
/// at most fill a block.
pub const MAX_TX_SIZE: u64 = 1_000_000;

/// The BIP 144 marker byte: a zero where the input count would be in the
/// legacy layout.
const SEGWIT_MARKER: u8 = 0x00;

/// The BIP 144 flag byte. Only `0x01` is currently assigned.
const SEGWIT_FLAG: u8 = 0x01;

impl Transaction {
    /// Serialize without witness data, in the legacy layout.
    ///
    /// This is the encoding the transaction id commits to.
    pub fn wire_serialize_stripped<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.version.wire_serialize(&mut target)?;
        self.inputs.wire_serialize(&mut target)?;
        self.outputs.wire_serialize(&mut target)?;
        self.lock_time.wire_serialize(&mut target)
    }
}

impl WireSerialize for Transaction {
    fn wire_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        if !self.has_witness() {
            return self.wire_serialize_stripped(target);
        }

        self.version.wire_serialize(&mut target)?;
        target.write_all(&[SEGWIT_MARKER, SEGWIT_FLAG])?;
        self.inputs.wire_serialize(&mut target)?;
        self.outputs.wire_serialize(&mut target)?;
        for input in self.inputs.iter() {
            input.witness().wire_serialize(&mut target)?;
        }
        self.lock_time.wire_serialize(&mut target)
    }
}

/// Deserializes a transaction, calculating and caching its txid and wtxid.
impl WireDeserialize for Transaction {
    fn wire_deserialize<R: io::Read>(src: R) -> Result<Self, WireError> {
        // Bound what a single transaction may consume to protect against
        // memory exhaustion; the witness discount means the full encoding
        // can legitimately exceed the stripped maximum by the scale factor.
        let mut src = src.take(4 * MAX_TX_SIZE);

        let version = i32::wire_deserialize(&mut src)?;

        // The next byte is either the input count or the SegWit marker;
        // they are only distinguishable after reading it.
        let first = u8::wire_deserialize(&mut src)?;
        let segwit = first == SEGWIT_MARKER;
        let input_count = if segwit {
            let flag = u8::wire_deserialize(&mut src)?;
            if flag != SEGWIT_FLAG {
                return Err(WireError::Parse("unknown segwit flag"));
            }
            CompactSize::wire_deserialize(&mut src)?
        } else {
            CompactSize::wire_deserialize_tail(first, &mut src)?
        };

        let input_count = input_count.value() as usize;
        let mut inputs = Vec::with_capacity(std::cmp::min(input_count, 1024));
        for _ in 0..input_count {
            inputs.push(Input::wire_deserialize(&mut src)?);
        }

        let outputs = Vec::<Output>::wire_deserialize(&mut src)?;

        if segwit {
            for input in inputs.iter_mut() {
                input.set_witness(Witness::wire_deserialize(&mut src)?);
            }
        }

        let lock_time = LockTime::wire_deserialize(&mut src)?;

        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Memoized::new(),
            witness_hash: Memoized::new(),
        };

        if segwit && !tx.has_witness() {
            // Nothing actually used the extended layout; accepting this
            // would let the same transaction have two distinct encodings.
            return Err(WireError::Parse("superfluous witness flag"));
        }

        // Calculate and cache the ids.
        let own_hash = tx.hash();
        let own_witness_hash = tx.witness_hash();
        tx.hash = Memoized::from(own_hash);
        tx.witness_hash = Memoized::from(own_witness_hash);
        Ok(tx)
    }
}
