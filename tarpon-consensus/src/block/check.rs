//! Non-contextual block checks.

use chrono::{DateTime, Duration, Utc};

use tarpon_chain::block::{Block, MAX_BLOCK_SIGOPS, MAX_BLOCK_SIZE};

use crate::error::VerifyError;
use crate::transaction;

/// How far into the future a block timestamp may run ahead of the node's
/// adjusted clock.
pub const MAX_TIME_DRIFT: i64 = 2 * 60 * 60;

/// Everything that can be checked about a block in isolation, before its
/// parent is even known.
///
/// Every failure except `high-hash` is flagged malleated: a relaying peer
/// can change any of these properties (strip witnesses, duplicate
/// transactions, reorder bytes) without touching the proof of work, so the
/// hash must not be blacklisted over them. `time-too-new` is additionally
/// *transient*: the same block may verify once the clock catches up.
pub fn check_sanity(block: &Block, now: DateTime<Utc>) -> Result<(), VerifyError> {
    if !block.header.verify_pow() {
        return Err(VerifyError::invalid("high-hash", 50));
    }

    if block.header.time > now + Duration::seconds(MAX_TIME_DRIFT) {
        return Err(VerifyError::malleated("time-too-new", 0));
    }

    if block.transactions.is_empty() || block.stripped_size() > MAX_BLOCK_SIZE {
        return Err(VerifyError::malleated("bad-blk-length", 100));
    }

    match block.transactions.get(0) {
        Some(coinbase) if coinbase.is_coinbase() => {}
        _ => return Err(VerifyError::malleated("bad-cb-missing", 100)),
    }
    for tx in block.transactions.iter().skip(1) {
        if tx.contains_coinbase_input() {
            return Err(VerifyError::malleated("bad-cb-multiple", 100));
        }
    }

    let (merkle_root, mutated) = block.merkle_root_with_mutation();
    if mutated {
        // CVE-2012-2459: a duplicated transaction run with an honest root.
        return Err(VerifyError::malleated("bad-txns-duplicate", 100));
    }
    if merkle_root != block.header.merkle_root {
        return Err(VerifyError::malleated("bad-txnmrklroot", 100));
    }

    let mut sigops = 0;
    for tx in block.transactions.iter() {
        transaction::check::check_sanity(tx).map_err(VerifyError::into_malleated)?;
        sigops += tx.legacy_sigops();
    }
    if sigops > MAX_BLOCK_SIGOPS {
        return Err(VerifyError::malleated("bad-blk-sigops", 100));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::iter::FromIterator;
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use tarpon_chain::amount::{Amount, COIN};
    use tarpon_chain::block::{merkle, Header, Height};
    use tarpon_chain::parameters::{genesis_block, Network};
    use tarpon_chain::transaction::{LockTime, Transaction, SEQUENCE_FINAL};
    use tarpon_chain::transparent::{CoinbaseData, Input, Output, Script, Witness};
    use tarpon_chain::work::difficulty::CompactDifficulty;

    fn coinbase(height: Height) -> Transaction {
        Transaction::new(
            1,
            vec![Input::Coinbase {
                data: CoinbaseData(CoinbaseData::height_push(height)),
                sequence: SEQUENCE_FINAL,
                witness: Witness::empty(),
            }],
            vec![Output {
                value: Amount::from_sat(50 * COIN).unwrap(),
                lock_script: Script::new(vec![0x51]),
            }],
            LockTime::unlocked(),
        )
    }

    /// A trivially-minable block over `transactions` on the regtest pow
    /// limit.
    fn solve(transactions: Vec<Arc<Transaction>>) -> Block {
        let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
        let mut block = Block {
            header: Header::new(
                1,
                tarpon_chain::parameters::GENESIS_PREVIOUS_BLOCK_HASH,
                merkle_root,
                Utc.timestamp(1_296_688_602, 0),
                CompactDifficulty(0x207f_ffff),
                0,
            ),
            transactions,
        };
        while !block.header.verify_pow() {
            block.header.nonce += 1;
        }
        block
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp(1_296_688_602, 0) + Duration::seconds(60)
    }

    #[test]
    fn genesis_blocks_pass_sanity() {
        tarpon_test::init();

        for &network in &[Network::Mainnet, Network::Testnet, Network::Regtest] {
            let genesis = genesis_block(network);
            let result = check_sanity(genesis, genesis.header.time + Duration::seconds(1));
            assert!(result.is_ok(), "{:?}: {:?}", network, result);
        }
    }

    #[test]
    fn future_timestamps_are_transiently_rejected() {
        tarpon_test::init();

        let mut block = solve(vec![Arc::new(coinbase(Height(1)))]);
        block.header.time = now() + Duration::seconds(MAX_TIME_DRIFT + 60);
        while !block.header.verify_pow() {
            block.header.nonce += 1;
        }

        let error = check_sanity(&block, now()).unwrap_err();
        assert_eq!(error.reason, "time-too-new");
        assert!(error.malleated);

        // The very same block is acceptable later.
        assert!(check_sanity(&block, now() + Duration::hours(2)).is_ok());
    }

    #[test]
    fn pow_failures_are_not_malleated() {
        tarpon_test::init();

        let mut block = solve(vec![Arc::new(coinbase(Height(1)))]);
        // A mainnet-difficulty target this nonce cannot plausibly meet.
        block.header.bits = CompactDifficulty(0x1d00_ffff);

        let error = check_sanity(&block, now()).unwrap_err();
        assert_eq!(error.reason, "high-hash");
        assert!(!error.malleated);
    }

    #[test]
    fn coinbase_must_be_first_and_only() {
        tarpon_test::init();

        let missing = solve(vec![Arc::new(Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: tarpon_chain::transparent::OutPoint {
                    hash: tarpon_chain::transaction::Hash([1; 32]),
                    index: 0,
                },
                unlock_script: Script::new(Vec::new()),
                sequence: SEQUENCE_FINAL,
                witness: Witness::empty(),
            }],
            vec![Output {
                value: Amount::ZERO,
                lock_script: Script::new(Vec::new()),
            }],
            LockTime::unlocked(),
        ))]);
        assert_eq!(check_sanity(&missing, now()).unwrap_err().reason, "bad-cb-missing");

        let doubled = solve(vec![
            Arc::new(coinbase(Height(1))),
            Arc::new(coinbase(Height(2))),
        ]);
        assert_eq!(check_sanity(&doubled, now()).unwrap_err().reason, "bad-cb-multiple");
    }

    #[test]
    fn merkle_mutation_and_mismatch_are_malleated() {
        tarpon_test::init();

        let spender = |tag: u8| {
            Arc::new(Transaction::new(
                1,
                vec![Input::PrevOut {
                    outpoint: tarpon_chain::transparent::OutPoint {
                        hash: tarpon_chain::transaction::Hash([tag; 32]),
                        index: 0,
                    },
                    unlock_script: Script::new(Vec::new()),
                    sequence: SEQUENCE_FINAL,
                    witness: Witness::empty(),
                }],
                vec![Output {
                    value: Amount::from_sat(COIN).unwrap(),
                    lock_script: Script::new(vec![0x51]),
                }],
                LockTime::unlocked(),
            ))
        };

        // Duplicate the final transaction: the root is unchanged, the list
        // is mutated.
        let honest = solve(vec![Arc::new(coinbase(Height(1))), spender(1), spender(2)]);
        let mut mutated = honest.clone();
        mutated.transactions.push(mutated.transactions[2].clone());
        while !mutated.header.verify_pow() {
            mutated.header.nonce += 1;
        }

        let error = check_sanity(&mutated, now()).unwrap_err();
        assert_eq!(error.reason, "bad-txns-duplicate");
        assert!(error.malleated);

        // A wrong root entirely.
        let mut wrong_root = honest.clone();
        wrong_root.header.merkle_root = merkle::Root([0xee; 32]);
        while !wrong_root.header.verify_pow() {
            wrong_root.header.nonce += 1;
        }
        let error = check_sanity(&wrong_root, now()).unwrap_err();
        assert_eq!(error.reason, "bad-txnmrklroot");
        assert!(error.malleated);
    }
}
