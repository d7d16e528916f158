use std::sync::Arc;

use tarpon_chain::amount::{Amount, COIN};
use tarpon_chain::block::Height;
use tarpon_chain::parameters::Network;
use tarpon_chain::transaction::{LockTime, Transaction, SEQUENCE_FINAL};
use tarpon_chain::transparent::{OutPoint, Output, Script, Witness};
use tarpon_consensus::{Chain, ChainOptions};
use tarpon_state::{ChainDB, MemoryChainDB};

use crate::{MempoolEntry, MempoolSnapshot, Miner, TemplateOptions};

fn payout() -> Script {
    Script::new(vec![0x51])
}

fn spend(prevout_tag: u8, value: i64, out_tag: u8) -> Arc<Transaction> {
    Arc::new(Transaction::new(
        1,
        vec![tarpon_chain::transparent::Input::PrevOut {
            outpoint: OutPoint {
                hash: tarpon_chain::transaction::Hash([prevout_tag; 32]),
                index: 0,
            },
            unlock_script: Script::new(Vec::new()),
            sequence: SEQUENCE_FINAL,
            witness: Witness::empty(),
        }],
        vec![Output {
            value: Amount::from_sat(value).unwrap(),
            lock_script: Script::new(vec![0x51, 0x01, out_tag]),
        }],
        LockTime::unlocked(),
    ))
}

fn spend_tx_output(parent: &Transaction, value: i64, out_tag: u8) -> Arc<Transaction> {
    Arc::new(Transaction::new(
        1,
        vec![tarpon_chain::transparent::Input::PrevOut {
            outpoint: OutPoint {
                hash: parent.hash(),
                index: 0,
            },
            unlock_script: Script::new(Vec::new()),
            sequence: SEQUENCE_FINAL,
            witness: Witness::empty(),
        }],
        vec![Output {
            value: Amount::from_sat(value).unwrap(),
            lock_script: Script::new(vec![0x51, 0x01, out_tag]),
        }],
        LockTime::unlocked(),
    ))
}

fn entry(tx: Arc<Transaction>, fee: i64) -> MempoolEntry {
    MempoolEntry::new(tx, Amount::from_sat(fee).unwrap(), 0.0, 4)
}

#[tokio::test]
async fn empty_template_mines_a_connectable_block() {
    tarpon_test::init();

    let chain = Chain::new(
        MemoryChainDB::new(Network::Regtest),
        ChainOptions::new(Network::Regtest),
    );
    let miner = Miner::pay_to(payout());

    let tip = chain.tip();
    let now = chain.clock().now();
    let template = chain.with_db(|db| {
        miner.create_block(db, &tip, &MempoolSnapshot::default(), now)
    });

    assert_eq!(template.height, Height(1));
    assert_eq!(template.fees, Amount::ZERO);
    assert_eq!(template.reward().sat(), 50 * COIN);
    assert!(!template.witness);

    let mut block = template.to_block();
    assert_eq!(block.coinbase_height(), Some(Height(1)));

    while !block.header.verify_pow() {
        block.header.nonce += 1;
    }
    chain.add(block).await.expect("template block connects");
    assert_eq!(chain.height(), 1);
}

#[test]
fn fee_phase_orders_by_rate_and_respects_dependencies() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let tip = db.tip();

    let high = spend(1, COIN, 1);
    let parent = spend(2, COIN, 2);
    let child = spend_tx_output(&parent, COIN / 2, 3);

    let snapshot = MempoolSnapshot::new(vec![
        entry(high.clone(), 50_000),
        entry(parent.clone(), 1_000),
        entry(child.clone(), 90_000),
    ]);

    let miner = Miner::pay_to(payout());
    let now = chrono::Utc::now();
    let template = miner.create_block(&mut db, &tip, &snapshot, now);

    let order: Vec<_> = template.items.iter().map(|item| item.tx.hash()).collect();
    assert_eq!(order.len(), 3);
    // The child outbids everyone but cannot precede its parent.
    assert_eq!(order[0], high.hash());
    assert_eq!(order[1], parent.hash());
    assert_eq!(order[2], child.hash());

    assert_eq!(template.fees, Amount::from_sat(141_000).unwrap());
    assert_eq!(
        template.reward(),
        Amount::from_sat(50 * COIN + 141_000).unwrap()
    );

    // The assembled block is structurally sound.
    let mut block = template.to_block();
    while !block.header.verify_pow() {
        block.header.nonce += 1;
    }
    tarpon_consensus::block::check::check_sanity(&block, now + chrono::Duration::hours(1))
        .expect("template blocks pass sanity");
}

#[test]
fn weight_budget_drops_transactions() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let tip = db.tip();

    let first = spend(1, COIN, 1);
    let second = spend(2, COIN, 2);
    let one_weight = first.weight();

    let snapshot = MempoolSnapshot::new(vec![
        entry(first.clone(), 90_000),
        entry(second.clone(), 10_000),
    ]);

    let mut options = TemplateOptions::new(payout());
    options.reserved_weight = 0;
    options.max_weight = one_weight + one_weight / 2;
    let miner = Miner::new(options);

    let template = miner.create_block(&mut db, &tip, &snapshot, chrono::Utc::now());

    // Only the better-paying transaction fits.
    assert_eq!(template.items.len(), 1);
    assert_eq!(template.items[0].tx.hash(), first.hash());
    assert!(template.weight <= one_weight + one_weight / 2);
}

#[test]
fn sigops_budget_drops_transactions() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let tip = db.tip();

    let heavy = MempoolEntry::new(spend(1, COIN, 1), Amount::from_sat(90_000).unwrap(), 0.0, 1_000);
    let light = MempoolEntry::new(spend(2, COIN, 2), Amount::from_sat(1_000).unwrap(), 0.0, 4);
    let snapshot = MempoolSnapshot::new(vec![heavy, light.clone()]);

    let mut options = TemplateOptions::new(payout());
    options.reserved_sigops = 0;
    options.max_sigops = 100;
    let miner = Miner::new(options);

    let template = miner.create_block(&mut db, &tip, &snapshot, chrono::Utc::now());
    assert_eq!(template.items.len(), 1);
    assert_eq!(template.items[0].tx.hash(), light.hash());
}

#[test]
fn free_transactions_only_ride_while_the_block_is_small() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let tip = db.tip();

    let free = spend(1, COIN, 1);
    let snapshot = MempoolSnapshot::new(vec![entry(free, 0)]);

    // min_weight below the coinbase reservation: no free space at all.
    let mut options = TemplateOptions::new(payout());
    options.min_weight = 0;
    let miner = Miner::new(options);
    let template = miner.create_block(&mut db, &tip, &snapshot, chrono::Utc::now());
    assert!(template.items.is_empty());

    // With a roomier floor the same transaction rides for free.
    let mut options = TemplateOptions::new(payout());
    options.min_weight = 20_000;
    let miner = Miner::new(options);
    let template = miner.create_block(&mut db, &tip, &snapshot, chrono::Utc::now());
    assert_eq!(template.items.len(), 1);
}

#[test]
fn witnessless_templates_skip_witness_transactions() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let tip = db.tip();

    let mut with_witness = (*spend(1, COIN, 1)).clone();
    with_witness.inputs[0].set_witness(Witness(vec![vec![0xab; 20]]));
    let plain = spend(2, COIN, 2);

    let snapshot = MempoolSnapshot::new(vec![
        entry(Arc::new(with_witness), 50_000),
        entry(plain.clone(), 1_000),
    ]);

    let miner = Miner::pay_to(payout());
    let template = miner.create_block(&mut db, &tip, &snapshot, chrono::Utc::now());

    // Segwit is nowhere near active on a fresh regtest chain.
    assert!(!template.witness);
    assert_eq!(template.items.len(), 1);
    assert_eq!(template.items[0].tx.hash(), plain.hash());
}

#[test]
fn priority_phase_runs_before_fee_rate() {
    tarpon_test::init();

    let mut db = MemoryChainDB::new(Network::Regtest);
    let tip = db.tip();

    let old_money = MempoolEntry::new(spend(1, COIN, 1), Amount::ZERO, 1e12, 4);
    let hot_money = MempoolEntry::new(spend(2, COIN, 2), Amount::from_sat(80_000).unwrap(), 1.0, 4);
    let snapshot = MempoolSnapshot::new(vec![old_money.clone(), hot_money.clone()]);

    let mut options = TemplateOptions::new(payout());
    options.priority_weight = 100_000;
    options.min_priority = 100.0;
    let miner = Miner::new(options);

    let template = miner.create_block(&mut db, &tip, &snapshot, chrono::Utc::now());
    let order: Vec<_> = template.items.iter().map(|item| item.tx.hash()).collect();

    // The ancient zero-fee coin goes first on priority; the well-paying one
    // lands in the fee phase.
    assert_eq!(order, vec![old_money.hash(), hot_money.hash()]);
}

#[test]
fn stop_flag_is_shared() -> Result<(), color_eyre::Report> {
    tarpon_test::init();

    let miner = Miner::pay_to(payout());
    let handle = miner.stop_handle();
    assert!(!miner.is_stopping());
    handle.store(true, std::sync::atomic::Ordering::SeqCst);
    assert!(miner.is_stopping());
    miner.stop();
    assert!(miner.is_stopping());

    Ok(())
}
