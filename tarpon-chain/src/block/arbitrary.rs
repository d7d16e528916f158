use crate::work::difficulty::CompactDifficulty;

use super::*;

use crate::LedgerState;
use chrono::{TimeZone, Utc};
use proptest::{
    arbitrary::{any, Arbitrary},
    prelude::*,
};

impl Arbitrary for Block {
    type Parameters = LedgerState;

    fn arbitrary_with(ledger_state: Self::Parameters) -> Self::Strategy {
        let transactions_strategy = Transaction::vec_strategy(ledger_state, 2);

        (any::<Header>(), transactions_strategy)
            .prop_map(|(header, transactions)| Self {
                header,
                transactions,
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Header {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            // version is interpreted as i32 by the protocol, so we are
            // limited to i32::MAX here
            (1u32..(i32::MAX as u32)),
            any::<Hash>(),
            any::<merkle::Root>(),
            // time is interpreted as u32 on the wire, but rust timestamps
            // are i64
            (0i64..(u32::MAX as i64)),
            any::<CompactDifficulty>(),
            (0u32..u32::MAX),
        )
            .prop_map(
                |(version, previous_block_hash, merkle_root, timestamp, bits, nonce)| {
                    Header::new(
                        version,
                        previous_block_hash,
                        merkle_root,
                        Utc.timestamp(timestamp, 0),
                        bits,
                        nonce,
                    )
                },
            )
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Height {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (Height::MIN.0..=Height::MAX.0).prop_map(Height).boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
