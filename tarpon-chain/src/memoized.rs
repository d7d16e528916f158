use serde::{Deserialize, Serialize};

use crate::{WireDeserialize, WireError, WireSerialize};

/// A `Memoized` value is an option that is never serialized.
///
/// Objects that come off the wire are immutable, so expensive derived values
/// (hashes, mostly) are computed once at parse time and stored here.
/// Hand-built objects are mutable until committed, so their memo stays empty
/// and the derived value is recomputed on every call.
///
/// It can be added to any struct without risking a consensus break.
#[derive(Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Memoized<T: Clone + Copy>(Option<T>);

impl<T: Clone + Copy> Memoized<T> {
    pub fn new() -> Memoized<T> {
        Memoized(None)
    }

    pub fn from(val: T) -> Memoized<T> {
        Memoized(Some(val))
    }

    pub fn value(&self) -> Option<T> {
        self.0
    }

    pub fn has_value(&self) -> bool {
        self.0.is_some()
    }
}

impl<T: Clone + Copy> Default for Memoized<T> {
    fn default() -> Self {
        Memoized::new()
    }
}

/// Returns false only if the two items both have a populated memo and their
/// values differ.
///
/// This allows generated items with empty memos to compare equal to their
/// deserialized counterparts, whose memos are always populated.
impl<T: PartialEq + Copy> PartialEq for Memoized<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => true,
        }
    }
}

impl<T: Clone + Copy> std::fmt::Debug for Memoized<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Clone + Copy> WireSerialize for Memoized<T> {
    fn wire_serialize<W>(&self, _: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        Ok(())
    }
}

impl<T: Clone + Copy> WireDeserialize for Memoized<T> {
    fn wire_deserialize<R: std::io::Read>(_: R) -> Result<Self, WireError> {
        Ok(Memoized(None))
    }
}
