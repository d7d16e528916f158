use std::io;

use crate::compactsize::CompactSize;
use crate::serialization::{WireDeserialize, WireError};
use crate::transaction::Transaction;

use super::{Block, Header};

/// The maximum stripped (witness-free) size of a block, in bytes.
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// The maximum weight of a block. (BIP 141)
pub const MAX_BLOCK_WEIGHT: usize = 4_000_000;

/// Witness bytes are discounted by this factor in the weight formula.
/// (BIP 141)
pub const WITNESS_SCALE_FACTOR: usize = 4;

/// The maximum number of unscaled signature operations in a block.
pub const MAX_BLOCK_SIGOPS: usize = MAX_BLOCK_SIZE / 50;

/// The maximum weighted signature operation cost of a block. (BIP 141)
pub const MAX_BLOCK_SIGOPS_COST: usize = MAX_BLOCK_SIGOPS * WITNESS_SCALE_FACTOR;

impl WireDeserialize for Block {
    fn wire_deserialize<R: io::Read>(reader: R) -> Result<Self, WireError> {
        // Bound the read at the weight limit: the weight formula counts
        // every byte at least once, so no valid block's full encoding can
        // exceed it. If the limit is hit we get an UnexpectedEof error.
        let mut reader = reader.take(MAX_BLOCK_WEIGHT as u64);
        let header = Header::wire_deserialize(&mut reader)?;

        let transaction_count = CompactSize::wire_deserialize(&mut reader)?.value();
        // Sanity check the claimed count before trusting it: every
        // transaction is at least 60 bytes even empty-scripted.
        if transaction_count > (MAX_BLOCK_WEIGHT / 60) as u64 {
            return Err(WireError::Parse(
                "block claims more transactions than could fit",
            ));
        }

        let mut transactions = Vec::with_capacity(std::cmp::min(
            transaction_count as usize,
            1024,
        ));
        for _ in 0..transaction_count {
            transactions.push(std::sync::Arc::new(Transaction::wire_deserialize(
                &mut reader,
            )?));
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
