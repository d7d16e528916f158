//! The chain's single-writer lock.

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use tarpon_chain::block;

/// A second submission of a key that is already being processed.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("block {0} is already pending")]
pub struct AlreadyPending(pub block::Hash);

/// An async mutex with a pending-key set.
///
/// All mutating chain operations serialize through the inner mutex. The
/// pending set exists so that a second `add` of the same block hash fails
/// fast, *before* waiting for the writer; peers love to deliver the same
/// block twice in quick succession.
#[derive(Debug, Default)]
pub struct Locker {
    busy: Mutex<()>,
    pending: StdMutex<HashSet<block::Hash>>,
}

/// Clears its key from the pending set on drop.
///
/// Held separately from the mutex permit so the key is released even when
/// the locking future is dropped while still waiting for the writer.
#[derive(Debug)]
struct PendingKey<'a> {
    locker: &'a Locker,
    hash: block::Hash,
}

impl<'a> Drop for PendingKey<'a> {
    fn drop(&mut self) {
        self.locker
            .pending
            .lock()
            .expect("pending set lock is never poisoned")
            .remove(&self.hash);
    }
}

/// Holding this guard is holding the chain lock; dropping it releases the
/// lock and clears the pending key.
#[derive(Debug)]
pub struct LockerGuard<'a> {
    _key: Option<PendingKey<'a>>,
    _permit: MutexGuard<'a, ()>,
}

impl Locker {
    pub fn new() -> Locker {
        Locker::default()
    }

    /// Is `hash` currently being processed (or queued for processing)?
    pub fn has_pending(&self, hash: &block::Hash) -> bool {
        self.pending
            .lock()
            .expect("pending set lock is never poisoned")
            .contains(hash)
    }

    /// Acquire the chain lock.
    ///
    /// With a key, registers it as pending first and fails immediately if it
    /// already is; the duplicate caller never waits behind the writer.
    pub async fn lock(&self, key: Option<block::Hash>) -> Result<LockerGuard<'_>, AlreadyPending> {
        let key = match key {
            Some(hash) => {
                {
                    let mut pending = self
                        .pending
                        .lock()
                        .expect("pending set lock is never poisoned");
                    if !pending.insert(hash) {
                        return Err(AlreadyPending(hash));
                    }
                }
                Some(PendingKey { locker: self, hash })
            }
            None => None,
        };

        let permit = self.busy.lock().await;
        Ok(LockerGuard {
            _key: key,
            _permit: permit,
        })
    }
}
