//! The script-verification boundary.
//!
//! Script execution is deliberately outside this crate: the validator treats
//! "does this input's script satisfy the coin it spends" as a black-box
//! predicate behind [`ScriptVerifier`]. The chain collects one
//! [`ScriptCheck`] per spending input and dispatches the whole block as a
//! batch, so implementations are free to fan the work out across a worker
//! pool; the chain lock is the only lock held while a batch runs.

use std::sync::Arc;

use tarpon_chain::transaction::Transaction;
use tarpon_state::Coin;

use crate::versionbits::VerifyFlags;

/// One deferred script execution: input `input_index` of `tx` spending
/// `coin`, under `flags`.
#[derive(Clone, Debug)]
pub struct ScriptCheck {
    pub tx: Arc<Transaction>,
    pub input_index: usize,
    pub coin: Coin,
    pub flags: VerifyFlags,
}

/// The black-box script predicate.
pub trait ScriptVerifier: Send + Sync {
    /// Execute one check.
    fn verify(&self, check: &ScriptCheck) -> bool;

    /// Execute a block's worth of checks; the default runs them in order
    /// and short-circuits, worker-pool implementations override.
    fn verify_batch(&self, checks: &[ScriptCheck]) -> bool {
        checks.iter().all(|check| self.verify(check))
    }
}

/// Accepts every script. The right verifier wherever signatures are
/// someone else's problem: template building, historical replay below
/// checkpoints, and most tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptingVerifier;

impl ScriptVerifier for AcceptingVerifier {
    fn verify(&self, _check: &ScriptCheck) -> bool {
        true
    }
}

/// Rejects every script; for exercising the failure path in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectingVerifier;

impl ScriptVerifier for RejectingVerifier {
    fn verify(&self, _check: &ScriptCheck) -> bool {
        false
    }
}
