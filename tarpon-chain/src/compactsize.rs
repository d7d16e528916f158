//! The Bitcoin variable-length integer (`CompactSize`) encoding.

use crate::{WireDeserialize, WireError, WireSerialize};
use byteorder::{LittleEndian, WriteBytesExt};

/// A length prefix in the 1/3/5/9-byte Bitcoin varint encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactSize(u64);

impl CompactSize {
    pub fn from(value: usize) -> CompactSize {
        CompactSize(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The encoded size, in bytes, of `value` as a CompactSize.
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= std::u16::MAX as usize {
            3
        } else if value <= std::u32::MAX as usize {
            5
        } else {
            9
        }
    }

    /// Finish decoding after the discriminant byte has already been consumed.
    ///
    /// Transaction parsing needs this: the SegWit marker is only
    /// distinguishable from an input count after reading one byte.
    pub fn wire_deserialize_tail<R: std::io::Read>(
        first: u8,
        mut reader: R,
    ) -> Result<CompactSize, WireError> {
        if first < 253 {
            Ok(CompactSize(first as u64))
        } else if first == 253 {
            Ok(CompactSize(u16::wire_deserialize(&mut reader)? as u64))
        } else if first == 254 {
            Ok(CompactSize(u32::wire_deserialize(&mut reader)? as u64))
        } else {
            Ok(CompactSize(u64::wire_deserialize(&mut reader)?))
        }
    }
}

impl WireSerialize for CompactSize {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.0 < 253 {
            target.write_all(&[self.0 as u8])
        } else if self.0 <= std::u16::MAX as u64 {
            target.write_all(&[253])?;
            target.write_u16::<LittleEndian>(self.0 as u16)
        } else if self.0 <= std::u32::MAX as u64 {
            target.write_all(&[254])?;
            target.write_u32::<LittleEndian>(self.0 as u32)
        } else {
            target.write_all(&[255])?;
            target.write_u64::<LittleEndian>(self.0)
        }
    }
}

impl WireDeserialize for CompactSize {
    fn wire_deserialize<R: std::io::Read>(mut reader: R) -> Result<CompactSize, WireError> {
        let first = u8::wire_deserialize(&mut reader)?;
        CompactSize::wire_deserialize_tail(first, reader)
    }
}
