//! Monetary amounts, denominated in satoshis.

use serde::{Deserialize, Serialize};
use tarpon_wire_derive::{WireDeserialize, WireSerialize};
use thiserror::Error;

use crate::{WireDeserialize, WireError, WireSerialize};

/// One bitcoin, in satoshis.
pub const COIN: i64 = 100_000_000;

/// The maximum quantity of money that can ever exist, in satoshis.
///
/// No single output, and no sum of outputs, may exceed this.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// A quantity of satoshis.
///
/// The wire format is a little-endian `i64`, so the type can momentarily
/// represent out-of-range values while a block is being parsed; the
/// transaction sanity checks reject those before any arithmetic is done on
/// them. Arithmetic here is always checked.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
    WireSerialize, WireDeserialize,
)]
pub struct Amount(i64);

/// An error during amount construction or arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The value is outside `[0, MAX_MONEY]`.
    #[error("amount {0} is out of the monetary range")]
    OutOfRange(i64),
    /// Checked arithmetic overflowed the monetary range.
    #[error("amount arithmetic overflowed")]
    Overflow,
}

impl Amount {
    /// Zero satoshis.
    pub const ZERO: Amount = Amount(0);

    /// Construct an amount, checking the monetary range.
    pub fn from_sat(sat: i64) -> Result<Amount, Error> {
        let amount = Amount(sat);
        if amount.is_valid() {
            Ok(amount)
        } else {
            Err(Error::OutOfRange(sat))
        }
    }

    /// Construct an amount without a range check.
    ///
    /// Only deserialization and tests should need this.
    pub fn from_sat_unchecked(sat: i64) -> Amount {
        Amount(sat)
    }

    /// The raw satoshi value.
    pub fn sat(&self) -> i64 {
        self.0
    }

    /// Is the value inside `[0, MAX_MONEY]`?
    pub fn is_valid(&self) -> bool {
        0 <= self.0 && self.0 <= MAX_MONEY
    }

    /// Range-checked addition.
    pub fn checked_add(self, rhs: Amount) -> Result<Amount, Error> {
        let sum = self.0.checked_add(rhs.0).ok_or(Error::Overflow)?;
        Amount::from_sat(sum).map_err(|_| Error::Overflow)
    }

    /// Range-checked subtraction.
    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, Error> {
        let diff = self.0.checked_sub(rhs.0).ok_or(Error::Overflow)?;
        Amount::from_sat(diff).map_err(|_| Error::Overflow)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
impl proptest::arbitrary::Arbitrary for Amount {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        (0..=MAX_MONEY).prop_map(Amount).boxed()
    }

    type Strategy = proptest::strategy::BoxedStrategy<Self>;
}
