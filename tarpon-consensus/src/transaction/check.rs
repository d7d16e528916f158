//! Transaction checks.

use std::collections::HashSet;

use tarpon_chain::amount::Amount;
use tarpon_chain::block::{Height, MAX_BLOCK_SIZE, WITNESS_SCALE_FACTOR};
use tarpon_chain::parameters::Network;
use tarpon_chain::transaction::Transaction;
use tarpon_chain::transparent::Input;
use tarpon_state::Coin;

use crate::error::VerifyError;
use crate::versionbits::VerifyFlags;

/// Structural checks that need no chain context.
///
/// Anything failing here can never be valid in any block, but the *block*
/// carrying it may be an honest block mutated in transit, so the caller
/// flags these errors malleated.
pub fn check_sanity(tx: &Transaction) -> Result<(), VerifyError> {
    if tx.inputs.is_empty() {
        return Err(VerifyError::invalid("bad-txns-vin-empty", 100));
    }
    if tx.outputs.is_empty() {
        return Err(VerifyError::invalid("bad-txns-vout-empty", 100));
    }
    if tx.stripped_size() > MAX_BLOCK_SIZE {
        return Err(VerifyError::invalid("bad-txns-oversize", 100));
    }

    let mut total = Amount::ZERO;
    for output in tx.outputs.iter() {
        if !output.value.is_valid() {
            return Err(VerifyError::invalid("bad-txns-vout-notvalid", 100));
        }
        total = total
            .checked_add(output.value)
            .map_err(|_| VerifyError::invalid("bad-txns-txouttotal-toolarge", 100))?;
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in tx.inputs.iter() {
        match input {
            Input::PrevOut { outpoint, .. } => {
                if !seen.insert(*outpoint) {
                    return Err(VerifyError::invalid("bad-txns-inputs-duplicate", 100));
                }
            }
            Input::Coinbase { .. } => {}
        }
    }

    if tx.is_coinbase() {
        let data_len = match &tx.inputs[0] {
            Input::Coinbase { data, .. } => data.0.len(),
            Input::PrevOut { .. } => unreachable!("is_coinbase checked the variant"),
        };
        if data_len < 2 || data_len > 100 {
            return Err(VerifyError::invalid("bad-cb-length", 100));
        }
    } else if tx.contains_coinbase_input() {
        return Err(VerifyError::invalid("bad-txns-prevout-null", 10));
    }

    Ok(())
}

/// Value-level input checks, after the coins have been resolved: coinbase
/// maturity and value conservation. Returns the transaction's fee.
///
/// `coins` are the spent coins in input order, as returned by
/// [`CoinView::spend`](tarpon_state::CoinView::spend).
pub fn check_inputs(
    tx: &Transaction,
    coins: &[Coin],
    height: Height,
    network: Network,
) -> Result<Amount, VerifyError> {
    let maturity = network.coinbase_maturity();

    let mut total_in = Amount::ZERO;
    for coin in coins.iter() {
        if coin.coinbase && height.0.saturating_sub(coin.height.0) < maturity {
            return Err(VerifyError::invalid(
                "bad-txns-premature-spend-of-coinbase",
                100,
            ));
        }
        total_in = total_in
            .checked_add(coin.value)
            .map_err(|_| VerifyError::invalid("bad-txns-inputvalues-outofrange", 100))?;
    }

    let total_out = tx
        .output_value()
        .map_err(|_| VerifyError::invalid("bad-txns-txouttotal-toolarge", 100))?;

    total_in
        .checked_sub(total_out)
        .map_err(|_| VerifyError::invalid("bad-txns-in-belowout", 100))
}

/// The weighted signature-operation cost of `tx`. (BIP 141)
///
/// Legacy sigops (opcode scans of the attached scripts) count at the full
/// scale factor; P2SH redeem scripts join them once BIP 16 is active;
/// witness sigops count unscaled.
pub fn sigops_cost(tx: &Transaction, coins: &[Coin], flags: VerifyFlags) -> usize {
    let mut cost = tx.legacy_sigops() * WITNESS_SCALE_FACTOR;

    if tx.is_coinbase() {
        return cost;
    }

    let spending_inputs = tx
        .inputs
        .iter()
        .filter_map(|input| Some((input.unlock_script()?, input.witness())));

    for ((unlock_script, witness), coin) in spending_inputs.zip(coins.iter()) {
        if flags.contains(VerifyFlags::P2SH) && coin.lock_script.is_p2sh() {
            cost += coin.lock_script.p2sh_sigops(unlock_script) * WITNESS_SCALE_FACTOR;
        }
        if flags.contains(VerifyFlags::WITNESS) {
            cost += coin.lock_script.witness_sigops(unlock_script, witness);
        }
    }

    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarpon_chain::amount::{COIN, MAX_MONEY};
    use tarpon_chain::transaction::{LockTime, SEQUENCE_FINAL};
    use tarpon_chain::transparent::{CoinbaseData, OutPoint, Output, Script, Witness};

    fn spend(outpoints: Vec<OutPoint>, values: Vec<i64>) -> Transaction {
        Transaction::new(
            1,
            outpoints
                .into_iter()
                .map(|outpoint| Input::PrevOut {
                    outpoint,
                    unlock_script: Script::new(Vec::new()),
                    sequence: SEQUENCE_FINAL,
                    witness: Witness::empty(),
                })
                .collect(),
            values
                .into_iter()
                .map(|value| Output {
                    value: Amount::from_sat_unchecked(value),
                    lock_script: Script::new(vec![0x51]),
                })
                .collect(),
            LockTime::unlocked(),
        )
    }

    fn coin(value: i64, height: u32, coinbase: bool) -> Coin {
        Coin {
            value: Amount::from_sat(value).unwrap(),
            lock_script: Script::new(vec![0x51]),
            height: Height(height),
            coinbase,
        }
    }

    fn outpoint(tag: u8) -> OutPoint {
        OutPoint {
            hash: tarpon_chain::transaction::Hash([tag; 32]),
            index: 0,
        }
    }

    #[test]
    fn sanity_rejects_structural_defects() {
        tarpon_test::init();

        let no_inputs = Transaction::new(
            1,
            Vec::new(),
            vec![Output {
                value: Amount::ZERO,
                lock_script: Script::new(Vec::new()),
            }],
            LockTime::unlocked(),
        );
        assert_eq!(check_sanity(&no_inputs).unwrap_err().reason, "bad-txns-vin-empty");

        let no_outputs = spend(vec![outpoint(1)], Vec::new());
        assert_eq!(check_sanity(&no_outputs).unwrap_err().reason, "bad-txns-vout-empty");

        let negative = spend(vec![outpoint(1)], vec![-5]);
        assert_eq!(check_sanity(&negative).unwrap_err().reason, "bad-txns-vout-notvalid");

        let overflowing = spend(vec![outpoint(1)], vec![MAX_MONEY, MAX_MONEY]);
        assert_eq!(
            check_sanity(&overflowing).unwrap_err().reason,
            "bad-txns-txouttotal-toolarge"
        );

        let duplicated = spend(vec![outpoint(1), outpoint(1)], vec![COIN]);
        assert_eq!(
            check_sanity(&duplicated).unwrap_err().reason,
            "bad-txns-inputs-duplicate"
        );

        let short_coinbase = Transaction::new(
            1,
            vec![Input::Coinbase {
                data: CoinbaseData(vec![0x00]),
                sequence: SEQUENCE_FINAL,
                witness: Witness::empty(),
            }],
            vec![Output {
                value: Amount::from_sat(50 * COIN).unwrap(),
                lock_script: Script::new(Vec::new()),
            }],
            LockTime::unlocked(),
        );
        assert_eq!(check_sanity(&short_coinbase).unwrap_err().reason, "bad-cb-length");

        assert!(check_sanity(&spend(vec![outpoint(1)], vec![COIN])).is_ok());
    }

    #[test]
    fn input_checks_enforce_maturity_and_conservation() {
        tarpon_test::init();

        let tx = spend(vec![outpoint(1)], vec![40 * COIN]);

        // Mature non-coinbase coin, fee of 10.
        let fee = check_inputs(&tx, &[coin(50 * COIN, 1, false)], Height(5), Network::Regtest)
            .unwrap();
        assert_eq!(fee, Amount::from_sat(10 * COIN).unwrap());

        // Immature coinbase coin.
        let immature =
            check_inputs(&tx, &[coin(50 * COIN, 1, true)], Height(5), Network::Regtest);
        assert_eq!(
            immature.unwrap_err().reason,
            "bad-txns-premature-spend-of-coinbase"
        );

        // Mature coinbase coin (100 confirmations).
        assert!(
            check_inputs(&tx, &[coin(50 * COIN, 1, true)], Height(101), Network::Regtest).is_ok()
        );

        // Outputs exceed inputs.
        let greedy = spend(vec![outpoint(1)], vec![60 * COIN]);
        assert_eq!(
            check_inputs(&greedy, &[coin(50 * COIN, 1, false)], Height(5), Network::Regtest)
                .unwrap_err()
                .reason,
            "bad-txns-in-belowout"
        );
    }
}
