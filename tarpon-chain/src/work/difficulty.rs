//! Block difficulty data structures and calculations.
//!
//! The block difficulty "target" is a 256-bit upper bound on the block
//! header hash: the hash, interpreted as a little-endian 256-bit integer,
//! must be less than or equal to the target. Headers carry the target in
//! the 32-bit floating-point-style "compact" (`nBits`) form.
//!
//! Note: the comparisons here are u256 integer comparisons, like bitcoind.
//! Greater values represent *less* work.

use std::{fmt, iter::Sum, ops::Add, ops::AddAssign};

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tarpon_wire_derive::{WireDeserialize, WireSerialize};

use crate::{block, parameters::Network, WireDeserialize, WireError, WireSerialize};

/// A difficulty target in the compact (`nBits`) format.
///
/// The compact format is a custom 32-bit floating point encoding:
/// the high byte is a base-256 exponent, bit 23 is a sign bit (always
/// invalid in a target), and the low 23 bits are the mantissa.
#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, WireSerialize, WireDeserialize,
)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct CompactDifficulty(pub u32);

/// A difficulty target expanded to its full 256-bit form.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExpandedDifficulty(U256);

/// A measure of how much proof-of-work a block, or a chain of blocks,
/// represents.
///
/// `Work(target) = floor(2^256 / (target + 1))`; the work of a chain is the
/// sum over its blocks, and "best chain" means greatest cumulative work.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Work(pub U256);

/// The mantissa sign bit; a compact target with this bit set encodes a
/// negative number and is invalid.
const SIGN_BIT: u32 = 0x0080_0000;

const MANTISSA_MASK: u32 = 0x007f_ffff;

impl CompactDifficulty {
    /// Expand to the full 256-bit target.
    ///
    /// Returns `None` for encodings that are negative, zero, or overflow
    /// 256 bits; such headers can never validate.
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        let exponent = self.0 >> 24;
        let mantissa = self.0 & MANTISSA_MASK;

        if self.0 & SIGN_BIT != 0 || mantissa == 0 {
            return None;
        }
        // Overflow: the mantissa's top byte would be shifted past bit 255.
        if exponent > 34
            || (exponent == 34 && mantissa > 0xff)
            || (exponent == 33 && mantissa > 0xffff)
        {
            return None;
        }

        let target = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent)))
        } else {
            U256::from(mantissa) << (8 * (exponent - 3))
        };

        if target.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(target))
        }
    }

    /// The amount of work this target represents, if the encoding is valid.
    pub fn to_work(self) -> Option<Work> {
        self.to_expanded().map(ExpandedDifficulty::to_work)
    }
}

impl ExpandedDifficulty {
    /// The easiest target any block on `network` may use.
    pub fn target_difficulty_limit(network: Network) -> ExpandedDifficulty {
        network
            .pow_limit_compact()
            .to_expanded()
            .expect("pow limit constants are valid compact encodings")
    }

    /// Interpret a block hash as a 256-bit little-endian integer, the form
    /// used for target comparisons.
    pub fn from_hash(hash: &block::Hash) -> ExpandedDifficulty {
        ExpandedDifficulty(U256::from_little_endian(&hash.0))
    }

    /// Build from a raw 256-bit value.
    pub fn from_u256(value: U256) -> ExpandedDifficulty {
        ExpandedDifficulty(value)
    }

    /// The raw 256-bit target.
    pub fn to_u256(self) -> U256 {
        self.0
    }

    /// Truncate back down to the compact form.
    ///
    /// Expansion of the result gives a value less than or equal to `self`:
    /// compression drops the low bits that do not fit in the mantissa.
    pub fn to_compact(self) -> CompactDifficulty {
        let mut size = (self.0.bits() + 7) / 8;
        let mut mantissa = if size <= 3 {
            (self.0.low_u64() << (8 * (3 - size))) as u32
        } else {
            ((self.0 >> (8 * (size - 3))).low_u64()) as u32
        };

        // If the mantissa's own top bit is set, the encoding would read as
        // negative; shift it down a byte and bump the exponent instead.
        if mantissa & SIGN_BIT != 0 {
            mantissa >>= 8;
            size += 1;
        }

        CompactDifficulty(((size as u32) << 24) | mantissa)
    }

    /// `floor(2^256 / (target + 1))`, computed without 512-bit arithmetic as
    /// `(!target / (target + 1)) + 1`.
    pub fn to_work(self) -> Work {
        let target = self.0;
        Work((!target / (target + 1)) + 1)
    }
}

impl Work {
    /// Zero work; the value below every real chain.
    pub fn zero() -> Work {
        Work(U256::zero())
    }
}

impl Add for Work {
    type Output = Work;

    fn add(self, rhs: Work) -> Work {
        Work(self.0 + rhs.0)
    }
}

impl AddAssign for Work {
    fn add_assign(&mut self, rhs: Work) {
        self.0 = self.0 + rhs.0;
    }
}

impl Sum for Work {
    fn sum<I: Iterator<Item = Work>>(iter: I) -> Work {
        iter.fold(Work::zero(), Add::add)
    }
}

impl fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buffer = [0u8; 32];
        self.0.to_big_endian(&mut buffer);
        f.debug_tuple("ExpandedDifficulty")
            .field(&hex::encode(&buffer))
            .finish()
    }
}

impl fmt::Display for Work {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buffer = [0u8; 32];
        self.0.to_big_endian(&mut buffer);
        f.write_str(&hex::encode(&buffer))
    }
}

impl PartialEq<ExpandedDifficulty> for block::Hash {
    fn eq(&self, other: &ExpandedDifficulty) -> bool {
        ExpandedDifficulty::from_hash(self) == *other
    }
}

impl PartialOrd<ExpandedDifficulty> for block::Hash {
    fn partial_cmp(&self, other: &ExpandedDifficulty) -> Option<std::cmp::Ordering> {
        ExpandedDifficulty::from_hash(self).partial_cmp(other)
    }
}
