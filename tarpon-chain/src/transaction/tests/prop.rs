use proptest::prelude::*;

use crate::block::Height;
use crate::parameters::Network;
use crate::serialization::{WireDeserializeInto, WireSerialize};
use crate::transaction::Transaction;
use crate::LedgerState;

fn ledger_state() -> LedgerState {
    LedgerState {
        tip_height: Height(100),
        is_coinbase: false,
        network: Network::Mainnet,
    }
}

proptest! {
    #[test]
    fn transaction_roundtrip(tx in Transaction::v1_strategy(ledger_state())) {
        tarpon_test::init();

        let bytes = tx.wire_serialize_to_vec()?;
        let other_tx: Transaction = bytes.as_slice().wire_deserialize_into()?;

        prop_assert_eq![&tx, &other_tx];
        prop_assert_eq![tx.hash(), other_tx.hash()];
    }

    #[test]
    fn witness_transaction_roundtrip(tx in Transaction::v2_witness_strategy(ledger_state())) {
        tarpon_test::init();

        let bytes = tx.wire_serialize_to_vec()?;
        let other_tx: Transaction = bytes.as_slice().wire_deserialize_into()?;

        prop_assert_eq![&tx, &other_tx];
        // The txid never commits to witness data, so it survives stripping.
        prop_assert_eq![tx.hash(), other_tx.hash()];
        prop_assert_eq![tx.witness_hash(), other_tx.witness_hash()];

        if !tx.has_witness() {
            prop_assert_eq![tx.witness_hash(), tx.hash()];
        }
    }

    #[test]
    fn weight_counts_witness_bytes_once(tx in Transaction::v2_witness_strategy(ledger_state())) {
        tarpon_test::init();

        let weight = tx.weight();
        prop_assert_eq![weight, 3 * tx.stripped_size() + tx.size()];
        if !tx.has_witness() {
            prop_assert_eq![weight, 4 * tx.size()];
        } else {
            prop_assert!(weight < 4 * tx.size());
        }
    }
}

#[test]
fn coinbase_shape() {
    tarpon_test::init();

    let mut state = ledger_state();
    state.is_coinbase = true;

    proptest!(|(tx in Transaction::arbitrary_with(state))| {
        prop_assert!(tx.is_coinbase());
        prop_assert!(tx.contains_coinbase_input());
    });
}
