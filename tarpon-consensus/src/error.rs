//! The error taxonomy every rejected block carries.

use thiserror::Error;

use tarpon_state::BoxError;

/// The coarse classification of a rejection, mirroring the reject-message
/// categories peers understand.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RejectKind {
    /// A consensus violation.
    Invalid,
    /// Valid under a superseded rule (e.g. a version too low after the
    /// network moved on).
    Obsolete,
    /// Diverges from a hard-coded checkpoint.
    Checkpoint,
    /// Already known; peers resend constantly, this is not a fault.
    Duplicate,
    /// Failed to deserialize.
    Malformed,
}

/// A verification failure: what kind, the canonical reason string, and how
/// hard the relaying peer should be penalized for it.
///
/// The orthogonal `malleated` flag marks failures a third party could have
/// produced by mutating an honest block (witness stripping, merkle-tree
/// duplication, future timestamps). Malleated failures are never entered
/// into the invalid-block cache: caching them would let an attacker poison
/// the hash of a block that is, in its honest form, perfectly valid.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("verification failed: {reason} ({kind:?}, score {score})")]
pub struct VerifyError {
    pub kind: RejectKind,
    pub reason: &'static str,
    pub score: u8,
    pub malleated: bool,
}

impl VerifyError {
    pub fn invalid(reason: &'static str, score: u8) -> VerifyError {
        VerifyError {
            kind: RejectKind::Invalid,
            reason,
            score,
            malleated: false,
        }
    }

    pub fn malleated(reason: &'static str, score: u8) -> VerifyError {
        VerifyError {
            kind: RejectKind::Invalid,
            reason,
            score,
            malleated: true,
        }
    }

    pub fn obsolete(reason: &'static str, score: u8) -> VerifyError {
        VerifyError {
            kind: RejectKind::Obsolete,
            reason,
            score,
            malleated: false,
        }
    }

    pub fn checkpoint(reason: &'static str) -> VerifyError {
        VerifyError {
            kind: RejectKind::Checkpoint,
            reason,
            score: 100,
            malleated: false,
        }
    }

    pub fn duplicate(reason: &'static str) -> VerifyError {
        VerifyError {
            kind: RejectKind::Duplicate,
            reason,
            score: 0,
            malleated: false,
        }
    }

    /// Re-flag this error as malleated.
    pub fn into_malleated(mut self) -> VerifyError {
        self.malleated = true;
        self
    }
}

/// Any failure surfacing from [`Chain::add`](crate::Chain::add).
#[derive(Error, Debug)]
pub enum ChainError {
    /// The block failed verification.
    #[error(transparent)]
    Verify(#[from] VerifyError),
    /// The state layer failed; unrelated to the block's validity.
    #[error("state error: {0}")]
    State(#[source] BoxError),
}

impl From<BoxError> for ChainError {
    fn from(error: BoxError) -> ChainError {
        ChainError::State(error)
    }
}

impl ChainError {
    /// The verification failure, if that is what this is.
    pub fn verify_error(&self) -> Option<&VerifyError> {
        match self {
            ChainError::Verify(error) => Some(error),
            ChainError::State(_) => None,
        }
    }
}
