//! One node of the block index.

use chrono::{DateTime, Utc};

use tarpon_chain::block::{self, merkle, Block, Height};
use tarpon_chain::work::difficulty::{CompactDifficulty, Work};

/// An entry in the block index: one known block, on any chain.
///
/// Entries are the permanent record of a block; the body may eventually be
/// pruned but its entry never is. Every field except `height`, `chainwork`,
/// and `skip` is copied straight out of the header, so the index can answer
/// contextual questions (timestamps, difficulty, versions) without loading
/// bodies.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainEntry {
    /// The hash of this block.
    pub hash: block::Hash,
    /// The block's version field.
    pub version: u32,
    /// The hash of the parent block.
    pub previous_block_hash: block::Hash,
    /// The root of the block's transaction Merkle tree.
    pub merkle_root: merkle::Root,
    /// The block's timestamp.
    pub time: DateTime<Utc>,
    /// The block's compact difficulty target.
    pub bits: CompactDifficulty,
    /// The block's nonce.
    pub nonce: u32,
    /// The number of blocks between this one and the genesis block.
    pub height: Height,
    /// The cumulative work of the chain ending at this block.
    ///
    /// Computed once, at insertion: `parent.chainwork + work(bits)`.
    pub chainwork: Work,
    /// The hash of an ancestor roughly half way down to genesis, giving the
    /// index O(log n) ancestor walks.
    pub skip: block::Hash,
}

impl ChainEntry {
    /// Build the index entry for a network's genesis block.
    pub fn genesis(block: &Block) -> ChainEntry {
        let header = &block.header;
        ChainEntry {
            hash: block.hash(),
            version: header.version,
            previous_block_hash: header.previous_block_hash,
            merkle_root: header.merkle_root,
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
            height: Height(0),
            chainwork: header
                .bits
                .to_work()
                .expect("genesis difficulty constants are valid"),
            skip: block::Hash::ZERO,
        }
    }

    /// Build the index entry for `block` on top of `parent`.
    ///
    /// `skip` must be the hash of `parent`'s ancestor at
    /// [`skip_height`]`(parent.height + 1)`; the [`ChainDB`] provides a
    /// helper that resolves it.
    ///
    /// Returns `None` when the header's difficulty encoding is invalid, in
    /// which case no work can be attributed to the block.
    ///
    /// [`ChainDB`]: crate::ChainDB
    pub fn from_block(block: &Block, parent: &ChainEntry, skip: block::Hash) -> Option<ChainEntry> {
        let header = &block.header;
        let proof = header.bits.to_work()?;
        Some(ChainEntry {
            hash: block.hash(),
            version: header.version,
            previous_block_hash: header.previous_block_hash,
            merkle_root: header.merkle_root,
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
            height: parent.height.next(),
            chainwork: parent.chainwork + proof,
            skip,
        })
    }

    /// Is this the entry of a genesis block?
    pub fn is_genesis(&self) -> bool {
        self.height == Height(0)
    }
}

/// The height an entry's skip pointer targets.
///
/// This is the bitcoind formula: strip the lowest set bit (twice for odd
/// heights, which keeps runs of skips from aliasing), producing targets that
/// halve the remaining distance to genesis often enough for O(log n) walks.
pub fn skip_height(height: u32) -> u32 {
    if height < 2 {
        return 0;
    }

    fn invert_lowest_one(n: i64) -> i64 {
        n & (n - 1)
    }

    let h = height as i64;
    if h & 1 == 1 {
        (invert_lowest_one(invert_lowest_one(h - 1)) + 1) as u32
    } else {
        invert_lowest_one(h) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_heights_always_decrease() {
        for height in 2..10_000u32 {
            let skip = skip_height(height);
            assert!(skip < height, "skip_height({}) = {}", height, skip);
        }
        assert_eq!(skip_height(0), 0);
        assert_eq!(skip_height(1), 0);
    }

    #[test]
    fn skip_height_strips_low_bits() {
        assert_eq!(skip_height(2), 0);
        assert_eq!(skip_height(4), 0);
        assert_eq!(skip_height(6), 4);
        assert_eq!(skip_height(12), 8);
        assert_eq!(skip_height(0b1011_0000), 0b1010_0000);
    }
}
