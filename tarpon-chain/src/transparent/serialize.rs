//! Wire impls for inputs.
//!
//! Inputs are the one transparent type that cannot derive its encoding: the
//! coinbase's null previous-output reference is a wire-level convention,
//! not a field, and witness stacks are serialized out-of-line by the
//! transaction (BIP 144), never by the input itself.

use std::io;

use crate::serialization::{WireDeserialize, WireError, WireSerialize};

use super::{CoinbaseData, Input, OutPoint, Script, Witness};

impl WireSerialize for Input {
    fn wire_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
                witness: _,
            } => {
                outpoint.wire_serialize(&mut target)?;
                unlock_script.wire_serialize(&mut target)?;
                sequence.wire_serialize(&mut target)
            }
            Input::Coinbase {
                data,
                sequence,
                witness: _,
            } => {
                OutPoint::null().wire_serialize(&mut target)?;
                data.wire_serialize(&mut target)?;
                sequence.wire_serialize(&mut target)
            }
        }
    }
}

impl WireDeserialize for Input {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<Self, WireError> {
        let outpoint = OutPoint::wire_deserialize(&mut reader)?;
        if outpoint.is_null() {
            Ok(Input::Coinbase {
                data: CoinbaseData::wire_deserialize(&mut reader)?,
                sequence: u32::wire_deserialize(&mut reader)?,
                witness: Witness::empty(),
            })
        } else {
            Ok(Input::PrevOut {
                outpoint,
                unlock_script: Script::wire_deserialize(&mut reader)?,
                sequence: u32::wire_deserialize(&mut reader)?,
                witness: Witness::empty(),
            })
        }
    }
}
