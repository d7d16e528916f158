use std::io;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};

use super::WireError;
use crate::compactsize::CompactSize;

type Result<R> = std::result::Result<R, WireError>;

/// Deserialization of consensus data in the Bitcoin wire format.
pub trait WireDeserialize {
    /// Read a value of `Self` from `reader`.
    fn wire_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait WireDeserializeInto {
    /// Deserialize based on type inference
    fn wire_deserialize_into<T>(self) -> Result<T>
    where
        T: WireDeserialize;
}

impl<R: io::Read> WireDeserializeInto for R {
    fn wire_deserialize_into<T>(self) -> Result<T>
    where
        T: WireDeserialize,
    {
        T::wire_deserialize(self)
    }
}

impl WireDeserialize for u8 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl WireDeserialize for u16 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl WireDeserialize for u32 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl WireDeserialize for u64 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl WireDeserialize for i32 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<i32> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

impl WireDeserialize for i64 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl WireDeserialize for DateTime<Utc> {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<DateTime<Utc>> {
        Ok(Utc.timestamp(reader.read_u32::<LittleEndian>()? as i64, 0))
    }
}

impl WireDeserialize for [u8; 32] {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; 32]> {
        let mut result = [0u8; 32];
        reader.read_exact(&mut result)?;
        Ok(result)
    }
}

/// Maximum blind preallocation, in items.
///
/// Attacker-supplied lengths are not trusted until the items have actually
/// been read, so preallocation is capped to keep a short malicious message
/// from reserving gigabytes.
const BLIND_ALLOC_LIMIT: usize = 1024;

impl<T> WireDeserialize for Vec<T>
where
    T: WireDeserialize,
{
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<T>> {
        let len = CompactSize::wire_deserialize(&mut reader)?.value() as usize;
        let mut result: Vec<T> = Vec::with_capacity(std::cmp::min(len, BLIND_ALLOC_LIMIT));
        for _ in 0..len {
            result.push(T::wire_deserialize(&mut reader)?);
        }
        Ok(result)
    }
}

impl<T> WireDeserialize for Arc<T>
where
    T: WireDeserialize,
{
    fn wire_deserialize<R: io::Read>(reader: R) -> Result<Arc<T>> {
        Ok(Arc::new(T::wire_deserialize(reader)?))
    }
}

impl<T, U> WireDeserialize for (T, U)
where
    T: WireDeserialize,
    U: WireDeserialize,
{
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<(T, U)> {
        Ok((
            T::wire_deserialize(&mut reader)?,
            U::wire_deserialize(&mut reader)?,
        ))
    }
}
