//! The Bitcoin transaction Merkle tree.

use std::iter::FromIterator;

use serde::{Deserialize, Serialize};
use tarpon_wire_derive::{WireDeserialize, WireSerialize};

use crate::serialization::{sha256d, WireDeserialize, WireError, WireSerialize};
use crate::transaction;

/// The root of the transaction Merkle tree, binding the block header to the
/// transactions in the block.
///
/// Note that because of a flaw in Bitcoin's design, the root does not always
/// precisely bind the contents of the block (CVE-2012-2459): duplicating the
/// final transactions of a level produces a different transaction list with
/// the same root. [`root_with_mutation`] detects that construction so the
/// validator can reject it without treating the block hash as permanently
/// bad.
#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, WireSerialize, WireDeserialize,
)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Root(pub [u8; 32]);

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl std::fmt::Display for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.write_str(&hex::encode(&reversed_bytes))
    }
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    use std::io::Write;

    let mut writer = sha256d::Writer::default();
    writer
        .write_all(left)
        .and_then(|_| writer.write_all(right))
        .expect("sha256d::Writer is infallible");
    writer.finish()
}

/// Compute the Merkle root of `hashes`, also reporting whether the list
/// matches the CVE-2012-2459 duplicate-transaction mutation.
///
/// At each level, an odd tail element is paired with itself. A *mutated*
/// list instead contains two identical adjacent subtrees, which produces a
/// root identical to the unmutated list's; callers must reject mutated
/// blocks (as malleated, since an honest block with the same root may
/// exist).
pub fn root_with_mutation(hashes: &[transaction::Hash]) -> (Root, bool) {
    let mut level: Vec<[u8; 32]> = hashes.iter().map(|hash| hash.0).collect();
    let mut mutated = false;

    if level.is_empty() {
        return (Root([0; 32]), false);
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let (left, right) = match pair {
                [left, right] => {
                    if left == right {
                        // Two identical paired subtrees only arise from the
                        // duplicate-tx mutation; an odd tail duplicated with
                        // itself never enters this branch.
                        mutated = true;
                    }
                    (left, right)
                }
                [odd] => (odd, odd),
                _ => unreachable!("chunks(2) yields one or two items"),
            };
            next.push(hash_pair(left, right));
        }
        level = next;
    }

    (Root(level[0]), mutated)
}

/// The Merkle root of the witness transaction ids, committed to by the
/// coinbase transaction in SegWit blocks.
///
/// The coinbase's own wtxid is replaced by the all-zero hash, since the
/// commitment lives inside the coinbase and cannot hash itself.
pub fn witness_root(wtxids: &[transaction::Hash]) -> Root {
    let mut hashes = wtxids.to_vec();
    if let Some(first) = hashes.first_mut() {
        *first = transaction::Hash([0; 32]);
    }
    root_with_mutation(&hashes).0
}

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = transaction::Hash>,
    {
        let hashes: Vec<transaction::Hash> = hashes.into_iter().collect();
        root_with_mutation(&hashes).0
    }
}
