//! Transaction inputs, outputs, and the scripts that lock them.
#![allow(clippy::unit_arg)]

mod script;
mod serialize;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;

pub use script::Script;

use serde::{Deserialize, Serialize};
use tarpon_wire_derive::{WireDeserialize, WireSerialize};

use crate::compactsize::CompactSize;
use crate::serialization::{WireDeserialize, WireError, WireSerialize};
use crate::{amount::Amount, block, transaction};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// Arbitrary data inserted by miners into a coinbase transaction.
///
/// After BIP 34, the first push must be the block height; the rest is free
/// space that miners use for extra nonces and vanity tags.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct CoinbaseData(pub Vec<u8>);

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl CoinbaseData {
    pub fn serialized_size(&self) -> usize {
        CompactSize::size(self.0.len()) + self.0.len()
    }

    /// The block height claimed by the leading script push, if there is one.
    ///
    /// BIP 34 requires the first push of the coinbase script to be the block
    /// height as a minimally-encoded script number. Small heights use the
    /// one-byte `OP_0`/`OP_1..OP_16` opcodes; everything else is a direct
    /// push of little-endian bytes with a sign-avoidance pad.
    pub fn claimed_height(&self) -> Option<block::Height> {
        let bytes = &self.0;
        let first = *bytes.first()?;
        match first {
            0x00 => Some(block::Height(0)),
            0x51..=0x60 => Some(block::Height((first - 0x50) as u32)),
            1..=8 => {
                let len = first as usize;
                if bytes.len() < 1 + len {
                    return None;
                }
                // The top byte's high bit is a script-number sign bit;
                // negative heights do not exist.
                if bytes[len] & 0x80 != 0 {
                    return None;
                }
                let mut value: u64 = 0;
                for (position, byte) in bytes[1..=len].iter().enumerate() {
                    value |= (*byte as u64) << (8 * position);
                }
                if value > block::Height::MAX.0 as u64 {
                    return None;
                }
                Some(block::Height(value as u32))
            }
            _ => None,
        }
    }

    /// The minimal script push encoding `height`, for building coinbases.
    pub fn height_push(height: block::Height) -> Vec<u8> {
        let h = height.0;
        if h == 0 {
            return vec![0x00];
        }
        if h <= 16 {
            return vec![0x50 + h as u8];
        }
        let mut bytes: Vec<u8> = h.to_le_bytes().to_vec();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        if bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
            bytes.push(0x00);
        }
        let mut push = Vec::with_capacity(1 + bytes.len());
        push.push(bytes.len() as u8);
        push.extend_from_slice(&bytes);
        push
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0
                .iter()
                .cloned()
                .flat_map(std::ascii::escape_default)
                .collect(),
        )
        .expect("ascii::escape_default produces utf8");
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// OutPoint
///
/// A particular transaction output reference.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, WireSerialize,
    WireDeserialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct OutPoint {
    /// References the transaction that contains the UTXO being spent.
    pub hash: transaction::Hash,

    /// Identifies which UTXO from that transaction is referenced; the
    /// first output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    #[inline]
    pub const fn len() -> usize {
        36
    }

    /// The null reference that coinbase inputs carry in place of a previous
    /// output.
    pub const fn null() -> OutPoint {
        OutPoint {
            hash: transaction::Hash([0; 32]),
            index: std::u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        *self == OutPoint::null()
    }
}

/// The witness stack attached to an input: a list of raw byte vectors
/// consumed by SegWit script execution.
///
/// Serialized out-of-line by the transaction (BIP 144), never by the input
/// that carries it.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, WireSerialize, WireDeserialize,
)]
pub struct Witness(pub Vec<Vec<u8>>);

impl Witness {
    pub const fn empty() -> Witness {
        Witness(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The sole 32-byte stack item, if the witness has exactly that shape.
    ///
    /// This is the shape BIP 141 requires of the coinbase witness, whose
    /// single item is the witness commitment nonce.
    pub fn sole_item_32(&self) -> Option<[u8; 32]> {
        match self.0.as_slice() {
            [item] if item.len() == 32 => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(item);
                Some(bytes)
            }
            _ => None,
        }
    }
}

/// A transparent input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output transaction reference.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock_script: Script,
        /// The sequence number for the input.
        sequence: u32,
        /// The SegWit witness stack, empty for non-witness spends.
        witness: Witness,
    },
    /// New coins created by the block reward.
    Coinbase {
        /// Free data inserted by miners.
        /// Includes the block height post BIP 34.
        data: CoinbaseData,
        /// The sequence number for the input.
        sequence: u32,
        /// The witness stack; after SegWit activation it carries exactly the
        /// 32-byte witness commitment nonce.
        witness: Witness,
    },
}

impl Input {
    pub fn sequence(&self) -> u32 {
        match self {
            Input::PrevOut { sequence, .. } => *sequence,
            Input::Coinbase { sequence, .. } => *sequence,
        }
    }

    pub fn witness(&self) -> &Witness {
        match self {
            Input::PrevOut { witness, .. } => witness,
            Input::Coinbase { witness, .. } => witness,
        }
    }

    pub fn set_witness(&mut self, new: Witness) {
        match self {
            Input::PrevOut { witness, .. } => *witness = new,
            Input::Coinbase { witness, .. } => *witness = new,
        }
    }

    pub fn outpoint(&self) -> Option<OutPoint> {
        match self {
            Input::PrevOut { outpoint, .. } => Some(*outpoint),
            Input::Coinbase { .. } => None,
        }
    }

    pub fn unlock_script(&self) -> Option<&Script> {
        match self {
            Input::PrevOut { unlock_script, .. } => Some(unlock_script),
            Input::Coinbase { .. } => None,
        }
    }
}

/// A transparent output from a transaction.
///
/// The most fundamental building block of a transaction is a transaction
/// output -- the coins you "own" are in fact a subset of the unspent
/// transaction outputs (or "UTXO"s) of the global UTXO set.
///
/// UTXOs are indivisible, discrete units of value which can only be consumed
/// in their entirety.
#[derive(
    Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, WireSerialize, WireDeserialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Output {
    /// Transaction value.
    // At https://en.bitcoin.it/wiki/Protocol_documentation#tx, this is an i64.
    pub value: Amount,

    /// The lock script defines the conditions under which this output can be
    /// spent.
    pub lock_script: Script,
}

impl Output {
    /// Returns the serialized length (in bytes) of this Output.
    pub fn len(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }
}
