//! End-to-end chain scenarios on regtest.

use std::iter::FromIterator;
use std::sync::Arc;

use chrono::Duration;
use proptest::{prelude::*, test_runner::Config};

use tarpon_chain::amount::{Amount, COIN};
use tarpon_chain::block::{merkle, Block, Header, Height};
use tarpon_chain::parameters::{
    genesis_block, genesis_hash, Network, ThresholdState, VERSION_TOP_BITS,
};
use tarpon_chain::transaction::{LockTime, Transaction, SEQUENCE_FINAL};
use tarpon_chain::transparent::{CoinbaseData, Input, OutPoint, Output, Script, Witness};
use tarpon_state::{ChainDB, ChainEntry, HashOrHeight, MemoryChainDB};

use crate::block::subsidy::block_subsidy;
use crate::chain::{Chain, ChainOptions};
use crate::error::{ChainError, RejectKind};
use crate::event::ChainEvent;
use crate::versionbits;

fn regtest_chain() -> Chain<MemoryChainDB> {
    tarpon_test::init();
    Chain::new(
        MemoryChainDB::new(Network::Regtest),
        ChainOptions::new(Network::Regtest),
    )
}

/// A coinbase for `height` claiming exactly the subsidy plus `extra_claim`.
fn coinbase(height: Height, tag: u8, extra_claim: i64) -> Transaction {
    let mut data = CoinbaseData::height_push(height);
    data.push(tag);
    let value = block_subsidy(height, Network::Regtest).sat() + extra_claim;
    Transaction::new(
        1,
        vec![Input::Coinbase {
            data: CoinbaseData(data),
            sequence: SEQUENCE_FINAL,
            witness: Witness::empty(),
        }],
        vec![Output {
            value: Amount::from_sat_unchecked(value),
            lock_script: Script::new(vec![0x51, 0x01, tag]),
        }],
        LockTime::unlocked(),
    )
}

struct BlockTemplate {
    version: u32,
    tag: u8,
    extra_claim: i64,
    transactions: Vec<Transaction>,
}

impl Default for BlockTemplate {
    fn default() -> BlockTemplate {
        BlockTemplate {
            version: 1,
            tag: 0,
            extra_claim: 0,
            transactions: Vec::new(),
        }
    }
}

/// Build and solve a block on `parent` without submitting it.
fn build_block(parent: &Block, parent_height: Height, template: BlockTemplate) -> Block {
    let height = parent_height.next();
    let mut transactions = vec![Arc::new(coinbase(height, template.tag, template.extra_claim))];
    transactions.extend(template.transactions.into_iter().map(Arc::new));

    let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
    let mut block = Block {
        header: Header::new(
            template.version,
            parent.hash(),
            merkle_root,
            parent.header.time + Duration::seconds(600),
            parent.header.bits,
            0,
        ),
        transactions,
    };
    while !block.header.verify_pow() {
        block.header.nonce += 1;
    }
    block
}

/// Build a linear chain of `length` empty blocks above genesis, without
/// submitting any of them.
fn build_chain(network: Network, length: u32, tag: u8, version: u32) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(length as usize);
    let mut parent = genesis_block(network).clone();
    for height in 0..length {
        let block = build_block(
            &parent,
            Height(height),
            BlockTemplate {
                version,
                tag,
                ..BlockTemplate::default()
            },
        );
        parent = block.clone();
        blocks.push(block);
    }
    blocks
}

/// Mine and submit one block on the current tip.
async fn mine(chain: &Chain<MemoryChainDB>, template: BlockTemplate) -> Arc<ChainEntry> {
    let tip = chain.tip();
    let parent = chain
        .with_db(|db| db.get_block(&tip.hash))
        .expect("tip body exists");
    let block = build_block(&parent, tip.height, template);
    chain.add(block).await.expect("mined block connects")
}

fn reason_of(error: &ChainError) -> &'static str {
    error
        .verify_error()
        .map(|verify| verify.reason)
        .unwrap_or("not a verification failure")
}

#[tokio::test]
async fn genesis_only_database_rejects_genesis_resubmission() {
    let chain = regtest_chain();

    assert_eq!(chain.height(), 0);
    assert_eq!(chain.tip().hash, genesis_hash(Network::Regtest));

    let error = chain
        .add(genesis_block(Network::Regtest).clone())
        .await
        .unwrap_err();
    let verify = error.verify_error().expect("a verification failure");
    assert_eq!(verify.kind, RejectKind::Duplicate);
    assert_eq!(chain.height(), 0);
}

#[tokio::test]
async fn linear_extension_accumulates_chainwork() {
    let chain = regtest_chain();
    let blocks = build_chain(Network::Regtest, 10, 0, 1);
    let last_hash = blocks.last().unwrap().hash();

    for block in blocks {
        chain.add(block).await.expect("in-order blocks connect");
    }

    let tip = chain.tip();
    assert_eq!(tip.height, Height(10));
    assert_eq!(tip.hash, last_hash);

    // chainwork = sum of per-block proofs, genesis included.
    let proof = Network::Regtest
        .pow_limit_compact()
        .to_work()
        .expect("regtest bits are valid");
    let mut expected = tarpon_chain::work::difficulty::Work::zero();
    for _ in 0..11 {
        expected += proof;
    }
    assert_eq!(tip.chainwork, expected);

    // Re-submission of an old block is a duplicate, not an error of note.
    let error = chain
        .add(chain.with_db(|db| db.get_block(&tip.hash)).unwrap().as_ref().clone())
        .await
        .unwrap_err();
    assert_eq!(error.verify_error().unwrap().kind, RejectKind::Duplicate);
}

#[tokio::test]
async fn out_of_order_delivery_connects_the_contiguous_prefix() {
    let chain = regtest_chain();
    let blocks = build_chain(Network::Regtest, 10, 0, 1);

    // Feed heights in this order; after each step the tip must equal the
    // highest contiguous prefix delivered so far.
    let order = [3u32, 1, 2, 5, 4, 7, 6, 9, 8, 10];
    let expected_tips = [0u32, 1, 3, 3, 5, 5, 7, 7, 9, 10];

    for (feed, expected_tip) in order.iter().zip(expected_tips.iter()) {
        let block = blocks[(*feed - 1) as usize].clone();
        let result = chain.add(block).await;

        if let Err(error) = &result {
            // Only parentless blocks may fail, and only as bad-prevblk.
            assert_eq!(reason_of(error), "bad-prevblk");
            assert_eq!(error.verify_error().unwrap().score, 0);
        }
        assert_eq!(chain.height(), *expected_tip, "after feeding {}", feed);
    }

    assert_eq!(chain.tip().hash, blocks[9].hash());
    assert_eq!(chain.orphan_count(), 0);
}

#[tokio::test]
async fn simple_reorg_disconnects_and_reconnects_in_order() {
    let chain = regtest_chain();
    let mut events = chain.subscribe();

    let chain_a = build_chain(Network::Regtest, 2, 0xaa, 1);
    let chain_b = build_chain(Network::Regtest, 3, 0xbb, 1);

    for block in chain_a.iter().cloned() {
        chain.add(block).await.expect("chain A connects");
    }
    for (index, block) in chain_b.iter().cloned().enumerate() {
        let result = chain.add(block).await;
        if index < 2 {
            // Not enough work yet: stored as a competitor, reported Ok.
            result.expect("competitor blocks are stored");
        } else {
            result.expect("the heavier chain wins");
        }
    }

    let tip = chain.tip();
    assert_eq!(tip.height, Height(3));
    assert_eq!(tip.hash, chain_b[2].hash());

    // Collect connect/disconnect events up to the final tip announcement.
    let mut sequence = Vec::new();
    loop {
        match events.recv().await.expect("event stream is intact") {
            ChainEvent::Connect { entry, .. } => sequence.push(("connect", entry.hash)),
            ChainEvent::Disconnect { entry, .. } => sequence.push(("disconnect", entry.hash)),
            ChainEvent::Tip(entry) if entry.hash == tip.hash => break,
            _ => {}
        }
    }

    assert_eq!(
        sequence,
        vec![
            ("connect", chain_a[0].hash()),
            ("connect", chain_a[1].hash()),
            ("disconnect", chain_a[1].hash()),
            ("disconnect", chain_a[0].hash()),
            ("connect", chain_b[0].hash()),
            ("connect", chain_b[1].hash()),
            ("connect", chain_b[2].hash()),
        ]
    );
}

#[tokio::test]
async fn bip30_rejects_a_duplicate_unspent_coinbase() {
    let chain = regtest_chain();
    mine(&chain, BlockTemplate::default()).await;
    // Hand-build a block at height 2 whose coinbase reuses block 1's
    // coinbase transaction byte for byte (the claimed height lies, but
    // BIP 34 is far from active at this height).
    let tip = chain.tip();
    let parent = chain.with_db(|db| db.get_block(&tip.hash)).unwrap();
    let duplicate_coinbase = parent.transactions[0].as_ref().clone();

    let transactions = vec![Arc::new(duplicate_coinbase)];
    let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
    let mut block = Block {
        header: Header::new(
            1,
            parent.hash(),
            merkle_root,
            parent.header.time + Duration::seconds(600),
            parent.header.bits,
            0,
        ),
        transactions,
    };
    while !block.header.verify_pow() {
        block.header.nonce += 1;
    }

    let error = chain.add(block).await.unwrap_err();
    let verify = error.verify_error().unwrap();
    assert_eq!(verify.reason, "bad-txns-BIP30");
    assert_eq!(verify.score, 100);
    assert_eq!(chain.height(), 1);
}

#[tokio::test]
async fn unexpected_witness_data_is_malleated_and_not_cached() {
    let chain = regtest_chain();
    mine(&chain, BlockTemplate::default()).await;

    let coinbase1 = chain
        .with_db(|db| db.get_block(&db.tip().hash))
        .unwrap()
        .transactions[0]
        .clone();

    // A spender carrying witness data, in a block with no commitment.
    let spender = Transaction::new(
        2,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                hash: coinbase1.hash(),
                index: 0,
            },
            unlock_script: Script::new(Vec::new()),
            sequence: SEQUENCE_FINAL,
            witness: Witness(vec![vec![0x01; 33]]),
        }],
        vec![Output {
            value: Amount::from_sat(COIN).unwrap(),
            lock_script: Script::new(vec![0x51]),
        }],
        LockTime::unlocked(),
    );

    let tip = chain.tip();
    let parent = chain.with_db(|db| db.get_block(&tip.hash)).unwrap();
    let block = build_block(
        &parent,
        tip.height,
        BlockTemplate {
            transactions: vec![spender],
            ..BlockTemplate::default()
        },
    );
    let hash = block.hash();

    let error = chain.add(block.clone()).await.unwrap_err();
    let verify = error.verify_error().unwrap();
    assert_eq!(verify.reason, "unexpected-witness");
    assert!(verify.malleated);

    // Malleated failures must not poison the invalid cache: the same hash
    // is re-validated, not auto-rejected as a known-invalid duplicate.
    let second = chain.add(block).await.unwrap_err();
    assert_eq!(reason_of(&second), "unexpected-witness");
}

#[tokio::test]
async fn future_blocks_become_valid_when_the_clock_catches_up() {
    let chain = regtest_chain();
    mine(&chain, BlockTemplate::default()).await;

    let tip = chain.tip();
    let parent = chain.with_db(|db| db.get_block(&tip.hash)).unwrap();
    let mut block = build_block(&parent, tip.height, BlockTemplate::default());
    block.header.time = chain.clock().now() + Duration::hours(3);
    while !block.header.verify_pow() {
        block.header.nonce += 1;
    }

    let error = chain.add(block.clone()).await.unwrap_err();
    let verify = error.verify_error().unwrap();
    assert_eq!(verify.reason, "time-too-new");
    assert!(verify.malleated);
    assert_eq!(chain.height(), 1);

    // An hour and a half later the same block is within drift tolerance.
    chain.clock().advance(90 * 60);
    chain.add(block).await.expect("same block, later clock");
    assert_eq!(chain.height(), 2);
}

#[tokio::test]
async fn invalid_blocks_are_permanently_rejected_with_their_descendants() {
    let chain = regtest_chain();

    let tip = chain.tip();
    let parent = chain.with_db(|db| db.get_block(&tip.hash)).unwrap();
    // Claim one satoshi more than the subsidy.
    let greedy = build_block(
        &parent,
        tip.height,
        BlockTemplate {
            extra_claim: 1,
            ..BlockTemplate::default()
        },
    );
    let child = build_block(&greedy, Height(1), BlockTemplate::default());

    let error = chain.add(greedy.clone()).await.unwrap_err();
    assert_eq!(reason_of(&error), "bad-cb-amount");

    // Resubmission short-circuits on the invalid cache.
    let error = chain.add(greedy).await.unwrap_err();
    assert_eq!(reason_of(&error), "duplicate");
    assert_eq!(error.verify_error().unwrap().score, 100);

    // Descendants are invalid on contact.
    let error = chain.add(child).await.unwrap_err();
    assert_eq!(reason_of(&error), "bad-prevblk");
    assert_eq!(error.verify_error().unwrap().score, 100);
}

#[tokio::test]
async fn sync_gate_opens_once() {
    let chain = regtest_chain();
    let mut events = chain.subscribe();
    assert!(!chain.is_synced());

    mine(&chain, BlockTemplate::default()).await;
    assert!(chain.is_synced());

    mine(&chain, BlockTemplate::default()).await;

    let mut full_events = 0;
    loop {
        match events.recv().await.expect("event stream is intact") {
            ChainEvent::Full => full_events += 1,
            ChainEvent::Tip(entry) if entry.height == Height(2) => break,
            _ => {}
        }
    }
    assert_eq!(full_events, 1);
}

#[tokio::test]
async fn versionbits_walks_the_threshold_states() {
    let chain = regtest_chain();
    let window = Network::Regtest.miner_window();
    let signal = VERSION_TOP_BITS | 1; // csv is bit 0

    // Mine three full windows of signalling blocks.
    for _ in 0..(3 * window) {
        mine(
            &chain,
            BlockTemplate {
                version: signal,
                ..BlockTemplate::default()
            },
        )
        .await;
    }

    let csv = Network::Regtest.deployment("csv").unwrap();
    let states: Vec<ThresholdState> = chain.with_db(|db| {
        // Evaluate as of the block after each window boundary.
        [window - 1, 2 * window - 1, 3 * window - 1]
            .iter()
            .map(|height| {
                let boundary = db
                    .get_entry(HashOrHeight::Height(Height(*height)))
                    .expect("boundary entry exists");
                versionbits::threshold_state(db, &boundary, csv)
            })
            .collect()
    });

    assert_eq!(
        states,
        vec![
            ThresholdState::Started,
            ThresholdState::LockedIn,
            ThresholdState::Active,
        ]
    );

    // The promoted tip state carries the activated flags.
    let deployment_state = chain.deployment_state();
    assert!(deployment_state.has_csv());
    assert!(deployment_state
        .lock_flags
        .contains(crate::versionbits::LockFlags::VERIFY_SEQUENCE));
}

#[tokio::test]
async fn versionbits_times_out_into_failed() {
    let chain = regtest_chain();
    let window = Network::Regtest.miner_window();

    for _ in 0..(2 * window) {
        mine(&chain, BlockTemplate::default()).await;
    }

    // A deployment whose timeout predates the chain: the first boundary
    // evaluation lands straight in Failed.
    let stillborn = tarpon_chain::parameters::Deployment {
        name: "stillborn",
        bit: 28,
        start_time: 0,
        timeout: 1,
    };

    let tip = chain.tip();
    let state = chain.with_db(|db| {
        let tip = db.get_entry(HashOrHeight::Hash(tip.hash)).unwrap();
        versionbits::threshold_state(db, &tip, &stillborn)
    });
    assert_eq!(state, ThresholdState::Failed);
}

#[tokio::test]
async fn sequence_locks_reject_early_spends_once_csv_is_active() {
    let chain = regtest_chain();
    let window = Network::Regtest.miner_window();
    let signal = VERSION_TOP_BITS | 1;

    // Activate csv: three full windows of signalling.
    for _ in 0..(3 * window) {
        mine(
            &chain,
            BlockTemplate {
                version: signal,
                ..BlockTemplate::default()
            },
        )
        .await;
    }
    assert!(chain.deployment_state().has_csv());

    // Spend a long-matured coinbase into a fresh output O.
    let mature = chain
        .with_db(|db| {
            let entry = db.get_entry(HashOrHeight::Height(Height(1))).unwrap();
            db.get_block(&entry.hash)
        })
        .unwrap();
    let mature_coinbase = mature.transactions[0].clone();
    let funding = Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                hash: mature_coinbase.hash(),
                index: 0,
            },
            unlock_script: Script::new(Vec::new()),
            sequence: SEQUENCE_FINAL,
            witness: Witness::empty(),
        }],
        vec![Output {
            value: Amount::from_sat(49 * COIN).unwrap(),
            lock_script: Script::new(vec![0x51]),
        }],
        LockTime::unlocked(),
    );
    let funding_outpoint = OutPoint {
        hash: funding.hash(),
        index: 0,
    };
    mine(
        &chain,
        BlockTemplate {
            transactions: vec![funding],
            ..BlockTemplate::default()
        },
    )
    .await;
    let funding_height = chain.height();

    // A version-2 spend of O with a height-relative lock of 5 blocks.
    let locked_spend = Transaction::new(
        2,
        vec![Input::PrevOut {
            outpoint: funding_outpoint,
            unlock_script: Script::new(Vec::new()),
            sequence: 5,
            witness: Witness::empty(),
        }],
        vec![Output {
            value: Amount::from_sat(48 * COIN).unwrap(),
            lock_script: Script::new(vec![0x52]),
        }],
        LockTime::unlocked(),
    );

    // Two more empty blocks; including the spend at funding_height + 3 is
    // one block too early (the lock allows funding_height + 5).
    mine(&chain, BlockTemplate::default()).await;
    mine(&chain, BlockTemplate::default()).await;

    let tip = chain.tip();
    let parent = chain.with_db(|db| db.get_block(&tip.hash)).unwrap();
    let early = build_block(
        &parent,
        tip.height,
        BlockTemplate {
            transactions: vec![locked_spend.clone()],
            ..BlockTemplate::default()
        },
    );
    let error = chain.add(early).await.unwrap_err();
    assert_eq!(reason_of(&error), "bad-txns-nonfinal");
    assert_eq!(chain.height(), funding_height + 2);

    // Two blocks later the lock is satisfied.
    mine(&chain, BlockTemplate::default()).await;
    mine(&chain, BlockTemplate::default()).await;
    mine(
        &chain,
        BlockTemplate {
            transactions: vec![locked_spend],
            ..BlockTemplate::default()
        },
    )
    .await;
    assert_eq!(chain.height(), funding_height + 5);
}

#[tokio::test]
async fn resubmitting_a_stored_block_is_a_duplicate() {
    let chain = regtest_chain();
    let block = build_chain(Network::Regtest, 1, 0, 1).remove(0);

    chain.add(block.clone()).await.unwrap();
    let error = chain.add(block).await.unwrap_err();
    assert_eq!(error.verify_error().unwrap().kind, RejectKind::Duplicate);
}

proptest! {
    // Each case replays a fresh chain, so keep the count modest.
    #![proptest_config(Config::with_cases(8))]

    /// Whatever order the blocks of one chain arrive in, orphan resolution
    /// reassembles them and the tip lands on the greatest-work block.
    #[test]
    fn any_delivery_order_converges_to_the_heaviest_tip(
        order in Just((0usize..8).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Runtime::new().expect("runtime builds");
        runtime.block_on(async {
            let chain = regtest_chain();
            let blocks = build_chain(Network::Regtest, 8, 0, 1);

            for index in order {
                // Parentless deliveries park as orphans and report
                // bad-prevblk; everything else must succeed.
                if let Err(error) = chain.add(blocks[index].clone()).await {
                    assert_eq!(reason_of(&error), "bad-prevblk");
                }
            }

            assert_eq!(chain.height(), 8);
            assert_eq!(chain.tip().hash, blocks[7].hash());
            assert_eq!(chain.orphan_count(), 0);
        });
    }
}
