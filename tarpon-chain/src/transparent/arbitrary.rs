use proptest::{arbitrary::any, collection::vec, prelude::*};

use crate::LedgerState;

use super::{CoinbaseData, Input, OutPoint, Script, Witness};

impl Input {
    /// Strategy for a single input consistent with `ledger_state`.
    pub fn arbitrary_with(ledger_state: LedgerState) -> BoxedStrategy<Self> {
        if ledger_state.is_coinbase {
            (vec(any::<u8>(), 2..95), any::<u32>())
                .prop_map(move |(data, sequence)| {
                    let mut push = CoinbaseData::height_push(ledger_state.tip_height);
                    push.extend_from_slice(&data);
                    push.truncate(100);
                    Input::Coinbase {
                        data: CoinbaseData(push),
                        sequence,
                        witness: Witness::empty(),
                    }
                })
                .boxed()
        } else {
            (any::<OutPoint>(), any::<Script>(), any::<u32>())
                .prop_map(|(outpoint, unlock_script, sequence)| Input::PrevOut {
                    outpoint,
                    unlock_script,
                    sequence,
                    witness: Witness::empty(),
                })
                .boxed()
        }
    }

    /// Strategy for a coinbase-or-not input vector of at most `max_size`
    /// non-coinbase inputs.
    pub fn vec_strategy(ledger_state: LedgerState, max_size: usize) -> BoxedStrategy<Vec<Self>> {
        if ledger_state.is_coinbase {
            Self::arbitrary_with(ledger_state)
                .prop_map(|input| vec![input])
                .boxed()
        } else {
            vec(Self::arbitrary_with(ledger_state), 1..=max_size).boxed()
        }
    }
}

impl proptest::arbitrary::Arbitrary for Witness {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        vec(vec(any::<u8>(), 0..73), 0..4).prop_map(Witness).boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
