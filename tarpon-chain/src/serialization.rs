//! Consensus-critical serialization.
//!
//! This module contains the `WireSerialize` and `WireDeserialize` traits,
//! analogs of the Serde `Serialize` and `Deserialize` traits but intended
//! for the consensus-critical Bitcoin wire formats: little-endian integers,
//! `CompactSize` lengths, and double-SHA-256 content addressing.
//!
//! Plain field-concatenation layouts can derive both traits via
//! `tarpon-wire-derive`; anything whose encoding depends on its content
//! (transactions, inputs) implements them by hand.

mod deserialize;
mod error;

pub mod sha256d;

use std::convert::TryFrom;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};

pub use deserialize::{WireDeserialize, WireDeserializeInto};
pub use error::WireError;

use crate::compactsize::CompactSize;

/// Serialization of consensus data in the Bitcoin wire format.
pub trait WireSerialize {
    /// Write `self` to `target` in the canonical wire encoding.
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    /// Helper: serialize to a freshly allocated byte vector.
    fn wire_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.wire_serialize(&mut data)?;
        Ok(data)
    }
}

// No impl for bare `u8`: it would overlap the specialized `Vec<u8>` impl
// below, and nothing writes lone bytes through the trait anyway.

impl WireSerialize for u16 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl WireSerialize for u32 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl WireSerialize for u64 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl WireSerialize for i32 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl WireSerialize for i64 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl WireSerialize for DateTime<Utc> {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        // u32 seconds are valid until 2106; the block time verification
        // rules reject anything that would truncate before then.
        let time_u32 = u32::try_from(self.timestamp()).unwrap_or(std::u32::MAX);
        target.write_u32::<LittleEndian>(time_u32)
    }
}

impl WireSerialize for [u8; 32] {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl WireSerialize for Vec<u8> {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactSize::from(self.len()).wire_serialize(&mut target)?;
        target.write_all(self)
    }
}

impl<T> WireSerialize for Vec<T>
where
    T: WireSerialize,
{
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactSize::from(self.len()).wire_serialize(&mut target)?;
        for item in self.iter() {
            item.wire_serialize(&mut target)?;
        }
        Ok(())
    }
}

impl<T> WireSerialize for Arc<T>
where
    T: WireSerialize,
{
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        T::wire_serialize(self, target)
    }
}

impl<T, U> WireSerialize for (T, U)
where
    T: WireSerialize,
    U: WireSerialize,
{
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.wire_serialize(&mut target)?;
        self.1.wire_serialize(&mut target)?;
        Ok(())
    }
}

/// An `io::Write` sink that discards bytes and counts them.
///
/// Used to compute serialized sizes without allocating, so size and weight
/// figures can never drift out of sync with the actual encoding.
#[derive(Default)]
pub struct SizeWriter(pub usize);

impl std::io::Write for SizeWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), std::io::Error> {
        Ok(())
    }
}

/// Returns the serialized size of `value`, by serialization into a counting
/// writer.
pub fn serialized_size<T: WireSerialize>(value: &T) -> usize {
    let mut counter = SizeWriter::default();
    value
        .wire_serialize(&mut counter)
        .expect("SizeWriter is infallible");
    counter.0
}
