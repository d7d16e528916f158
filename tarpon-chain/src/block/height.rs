use serde::{Deserialize, Serialize};
use tarpon_wire_derive::{WireDeserialize, WireSerialize};

use crate::{WireDeserialize, WireError, WireSerialize};

/// The height of a block is the length of the chain back to the genesis
/// block.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
    WireSerialize, WireDeserialize,
)]
pub struct Height(pub u32);

impl Height {
    /// The height of the genesis block.
    pub const MIN: Height = Height(0);

    /// The maximum representable height.
    ///
    /// One less than the lock time height threshold: a lock time at or above
    /// `500_000_000` is interpreted as a timestamp, so no block can ever have
    /// a height there.
    pub const MAX: Height = Height(499_999_999);

    /// The height of the block after this one.
    pub fn next(self) -> Height {
        Height(self.0 + 1)
    }
}

