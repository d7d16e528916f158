use std::collections::HashMap;
use std::iter::FromIterator;
use std::sync::Arc;

use chrono::Duration;

use tarpon_chain::amount::{Amount, COIN};
use tarpon_chain::block::{merkle, Block, Header, Height};
use tarpon_chain::parameters::Network;
use tarpon_chain::transaction::{LockTime, Transaction, SEQUENCE_FINAL};
use tarpon_chain::transparent::{CoinbaseData, Input, OutPoint, Output, Script, Witness};

use crate::{ChainDB, ChainEntry, CoinView, HashOrHeight, MemoryChainDB};

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

/// Build a block of `extra` transactions on `parent`, connect it, and return
/// its entry.
fn connect_block(
    db: &mut MemoryChainDB,
    parent: &ChainEntry,
    extra: Vec<Transaction>,
) -> Arc<ChainEntry> {
    let height = parent.height.next();
    let mut transactions = vec![Arc::new(coinbase(height))];
    transactions.extend(extra.into_iter().map(Arc::new));

    let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
    let block = Block {
        header: Header::new(
            1,
            parent.hash,
            merkle_root,
            parent.time + Duration::seconds(600),
            parent.bits,
            0,
        ),
        transactions,
    };

    let mut view = db.get_coin_view(&block.transactions[0]);
    for tx in block.transactions.iter() {
        if !tx.is_coinbase() {
            assert!(
                view.spend(db, tx).is_some(),
                "test blocks spend existing coins"
            );
        }
        view.add_tx(tx, height);
    }

    let entry = Arc::new(db.create_entry(&block, parent).expect("valid bits"));
    let block = Arc::new(block);
    db.save(entry.clone(), block, Some(view)).unwrap();
    entry
}

fn spend_output(outpoint: OutPoint, value: i64) -> Transaction {
    Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint,
            unlock_script: Script::new(Vec::new()),
            sequence: SEQUENCE_FINAL,
            witness: Witness::empty(),
        }],
        vec![Output {
            value: Amount::from_sat(value).unwrap(),
            lock_script: Script::new(vec![0x52]),
        }],
        LockTime::unlocked(),
    )
}

fn coin_snapshot(db: &MemoryChainDB, outpoints: &[OutPoint]) -> HashMap<OutPoint, Option<crate::Coin>> {
    outpoints
        .iter()
        .map(|outpoint| (*outpoint, db.get_coin(outpoint)))
        .collect()
}

#[test]
fn fresh_database_has_genesis_tip() -> Result<(), color_eyre::Report> {
    tarpon_test::init();

    let db = MemoryChainDB::new(Network::Regtest);
    let tip = db.tip();
    assert_eq!(tip.height, Height(0));
    assert!(tip.is_genesis());
    assert_eq!(
        db.get_entry(HashOrHeight::Height(Height(0))).unwrap().hash,
        tip.hash
    );
    assert!(db.has_entry(&tip.hash));
    assert!(db.get_block(&tip.hash).is_some());
    // The genesis coinbase is unspendable and never enters the coin set.
    assert!(!db.has_coins(&db.get_block(&tip.hash).unwrap().transactions[0].hash()));

    Ok(())
}

#[test]
fn connecting_blocks_creates_coins_and_advances_the_tip() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let genesis = db.tip();

    let entry1 = connect_block(&mut db, &genesis, Vec::new());
    assert_eq!(db.tip().height, Height(1));
    assert!(db.is_main_chain(&entry1));

    let coinbase1 = db.get_block(&entry1.hash).unwrap().transactions[0].clone();
    assert!(db.has_coins(&coinbase1.hash()));
    let coin = db
        .get_coin(&OutPoint {
            hash: coinbase1.hash(),
            index: 0,
        })
        .unwrap();
    assert_eq!(coin.height, Height(1));
    assert!(coin.coinbase);

    // Chainwork accumulates parent + proof.
    let proof = entry1.bits.to_work().unwrap();
    assert_eq!(entry1.chainwork, genesis.chainwork + proof);
}

#[test]
fn disconnect_restores_the_exact_prior_coin_set() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let genesis = db.tip();
    let entry1 = connect_block(&mut db, &genesis, Vec::new());

    let coinbase1 = db.get_block(&entry1.hash).unwrap().transactions[0].clone();
    let spent_outpoint = OutPoint {
        hash: coinbase1.hash(),
        index: 0,
    };

    // Block 2 spends the block-1 coinbase, and a chained child spends the
    // spender inside the same block.
    let spender = spend_output(spent_outpoint, 40 * COIN);
    let chained = spend_output(
        OutPoint {
            hash: spender.hash(),
            index: 0,
        },
        30 * COIN,
    );
    let spender_outpoint = OutPoint {
        hash: spender.hash(),
        index: 0,
    };
    let chained_outpoint = OutPoint {
        hash: chained.hash(),
        index: 0,
    };

    let watched = [spent_outpoint, spender_outpoint, chained_outpoint];
    let before = coin_snapshot(&db, &watched);

    let entry2 = connect_block(&mut db, &entry1, vec![spender, chained]);
    assert_eq!(db.tip().height, Height(2));
    // The in-block spend leaves only the chain's end output.
    assert_eq!(db.get_coin(&spent_outpoint), None);
    assert_eq!(db.get_coin(&spender_outpoint), None);
    assert!(db.get_coin(&chained_outpoint).is_some());

    let block2 = db.get_block(&entry2.hash).unwrap();
    db.disconnect(&entry2, &block2).unwrap();

    assert_eq!(db.tip().hash, entry1.hash);
    assert_eq!(coin_snapshot(&db, &watched), before);
    assert!(db.has_coins(&coinbase1.hash()));
    assert!(!db.has_coins(&block2.transactions[1].hash()));
}

#[test]
fn ancestor_walks_use_skip_pointers() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let mut tip = db.tip();
    let mut hashes = vec![tip.hash];
    for _ in 0..64 {
        tip = connect_block(&mut db, &tip, Vec::new());
        hashes.push(tip.hash);
    }

    for target in [0u32, 1, 2, 31, 32, 33, 63, 64].iter() {
        let ancestor = db.ancestor(&tip, Height(*target)).unwrap();
        assert_eq!(ancestor.hash, hashes[*target as usize]);
        assert_eq!(ancestor.height, Height(*target));
    }
    assert!(db.ancestor(&tip, Height(65)).is_none());
}

#[test]
fn median_time_past_is_the_middle_of_eleven() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let mut tip = db.tip();
    for _ in 0..20 {
        tip = connect_block(&mut db, &tip, Vec::new());
    }

    // Times step uniformly by 600s, so the median of the last 11 is the
    // time 5 blocks back.
    let expected = db
        .ancestor(&tip, Height(tip.height.0 - 5))
        .unwrap()
        .time
        .timestamp();
    assert_eq!(db.median_time_past(&tip), expected);
}

#[test]
fn reset_rolls_the_main_chain_back() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let mut tip = db.tip();
    for _ in 0..10 {
        tip = connect_block(&mut db, &tip, Vec::new());
    }

    let target = db.get_entry(HashOrHeight::Height(Height(4))).unwrap();
    let new_tip = db.reset(HashOrHeight::Height(Height(4))).unwrap();
    assert_eq!(new_tip.hash, target.hash);
    assert_eq!(db.tip().height, Height(4));
    assert_eq!(db.get_entry(HashOrHeight::Height(Height(5))), None);
}

#[test]
fn scan_visits_matching_main_chain_blocks() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let mut tip = db.tip();
    for _ in 0..5 {
        tip = connect_block(&mut db, &tip, Vec::new());
    }

    let mut visited = Vec::new();
    db.scan(
        Some(HashOrHeight::Height(Height(2))),
        &|_block| true,
        &mut |entry, _block| visited.push(entry.height.0),
    )
    .unwrap();
    assert_eq!(visited, vec![2, 3, 4, 5]);
}
