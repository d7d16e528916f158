use std::sync::Arc;

use proptest::{arbitrary::any, collection::vec, prelude::*};

use crate::memoized::Memoized;
use crate::{transparent, LedgerState};

use super::{LockTime, Transaction};

impl Transaction {
    /// Generate a proptest strategy for legacy (witness-free) transactions.
    pub fn v1_strategy(ledger_state: LedgerState) -> BoxedStrategy<Self> {
        (
            transparent::Input::vec_strategy(ledger_state, 10),
            vec(any::<transparent::Output>(), 1..10),
            any::<LockTime>(),
        )
            .prop_map(|(inputs, outputs, lock_time)| Transaction {
                version: 1,
                inputs,
                outputs,
                lock_time,
                hash: Memoized::new(),
                witness_hash: Memoized::new(),
            })
            .boxed()
    }

    /// Generate a proptest strategy for version 2 transactions where each
    /// input may carry a witness stack.
    pub fn v2_witness_strategy(ledger_state: LedgerState) -> BoxedStrategy<Self> {
        (
            transparent::Input::vec_strategy(ledger_state, 10),
            vec(any::<transparent::Witness>(), 10),
            vec(any::<transparent::Output>(), 1..10),
            any::<LockTime>(),
        )
            .prop_map(|(mut inputs, witnesses, outputs, lock_time)| {
                for (input, witness) in inputs.iter_mut().zip(witnesses) {
                    input.set_witness(witness);
                }
                Transaction {
                    version: 2,
                    inputs,
                    outputs,
                    lock_time,
                    hash: Memoized::new(),
                    witness_hash: Memoized::new(),
                }
            })
            .boxed()
    }

    /// Proptest strategy for creating a vector of transactions where the
    /// first transaction is always the only coinbase transaction.
    pub fn vec_strategy(
        mut ledger_state: LedgerState,
        len: usize,
    ) -> BoxedStrategy<Vec<Arc<Self>>> {
        ledger_state.is_coinbase = true;
        let coinbase = Transaction::arbitrary_with(ledger_state).prop_map(Arc::new);
        ledger_state.is_coinbase = false;
        let remainder = vec(
            Transaction::arbitrary_with(ledger_state).prop_map(Arc::new),
            len,
        );

        (coinbase, remainder)
            .prop_map(|(first, mut remainder)| {
                remainder.insert(0, first);
                remainder
            })
            .boxed()
    }
}

impl proptest::arbitrary::Arbitrary for LockTime {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use chrono::{TimeZone, Utc};
        prop_oneof![
            (crate::block::Height::MIN.0..LockTime::THRESHOLD)
                .prop_map(|n| LockTime::Height(crate::block::Height(n))),
            (LockTime::MIN_TIMESTAMP..=LockTime::MAX_TIMESTAMP)
                .prop_map(|n| LockTime::Time(Utc.timestamp(n as i64, 0)))
        ]
        .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl proptest::arbitrary::Arbitrary for Transaction {
    type Parameters = LedgerState;

    fn arbitrary_with(ledger_state: Self::Parameters) -> Self::Strategy {
        Self::v1_strategy(ledger_state)
    }

    type Strategy = BoxedStrategy<Self>;
}
