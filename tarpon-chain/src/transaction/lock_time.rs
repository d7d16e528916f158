use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::block::Height;
use crate::{WireDeserialize, WireError, WireSerialize};

/// A transaction lock time.
///
/// The raw field is a u32 with a split interpretation: values below
/// `500_000_000` are block heights, everything else is a Unix timestamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LockTime {
    /// Unlocks at or after this block height.
    Height(Height),
    /// Unlocks at or after this time.
    Time(DateTime<Utc>),
}

impl LockTime {
    /// The threshold below which a raw lock time is a height.
    pub const THRESHOLD: u32 = 500_000_000;

    /// The smallest raw timestamp interpretation.
    pub const MIN_TIMESTAMP: u32 = Self::THRESHOLD;

    /// The largest raw lock time value.
    pub const MAX_TIMESTAMP: u32 = std::u32::MAX;

    /// The raw u32 wire value.
    pub fn raw(&self) -> u32 {
        match self {
            LockTime::Height(height) => height.0,
            LockTime::Time(time) => time.timestamp() as u32,
        }
    }

    /// A lock time of zero: always final.
    pub fn unlocked() -> LockTime {
        LockTime::Height(Height(0))
    }

    /// Is the lock satisfied at the given block height and time?
    ///
    /// `time` is the consensus reference clock for the validation position:
    /// the block's own timestamp before BIP 113, the previous block's median
    /// time past after it.
    pub fn is_satisfied_by(&self, height: Height, time: i64) -> bool {
        match self {
            LockTime::Height(lock_height) => lock_height.0 < height.0,
            LockTime::Time(lock_time) => lock_time.timestamp() < time,
        }
    }
}

impl From<u32> for LockTime {
    fn from(raw: u32) -> LockTime {
        if raw < LockTime::THRESHOLD {
            LockTime::Height(Height(raw))
        } else {
            LockTime::Time(Utc.timestamp(raw as i64, 0))
        }
    }
}

impl WireSerialize for LockTime {
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.raw().wire_serialize(target)
    }
}

impl WireDeserialize for LockTime {
    fn wire_deserialize<R: std::io::Read>(reader: R) -> Result<Self, WireError> {
        Ok(LockTime::from(u32::wire_deserialize(reader)?))
    }
}
