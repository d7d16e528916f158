//! Consensus validation: the rules, and the [`Chain`] that applies them.
//!
//! The chain ingests candidate blocks from untrusted peers, in any order,
//! and maintains the canonical greatest-work chain: non-contextual and
//! contextual verification, BIP 9 deployment tracking, orphan management,
//! and reorganization. `tarpon-chain` holds the data structures and
//! `tarpon-state` the storage; everything that can reject a block lives
//! here.

pub mod block;
pub mod chain;
pub mod clock;
pub mod error;
pub mod event;
pub mod locker;
pub mod locks;
pub mod retarget;
pub mod script;
pub mod transaction;
pub mod versionbits;

pub use chain::{Chain, ChainOptions};
pub use clock::AdjustedClock;
pub use error::{ChainError, RejectKind, VerifyError};
pub use event::ChainEvent;
pub use locker::Locker;
pub use script::{AcceptingVerifier, RejectingVerifier, ScriptCheck, ScriptVerifier};
pub use versionbits::{DeploymentState, LockFlags, VerifyFlags};
