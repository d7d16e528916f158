//! The block reward schedule.

use tarpon_chain::amount::{Amount, COIN};
use tarpon_chain::block::Height;
use tarpon_chain::parameters::Network;

/// The `BlockSubsidy(height)` function.
///
/// The subsidy starts at 50 coins and halves every `halving_interval`
/// blocks. After 64 halvings the shift would wrap, and the subsidy is
/// defined to be zero from there on (it is already zero long before, at
/// the 33rd halving, for 50-coin money supplies).
pub fn block_subsidy(height: Height, network: Network) -> Amount {
    let halvings = height.0 / network.halving_interval();
    if halvings >= 64 {
        return Amount::ZERO;
    }
    let subsidy = (50 * COIN) >> halvings;
    Amount::from_sat(subsidy).expect("halved subsidies stay inside the monetary range")
}
