//! The chain: block ingestion, contextual verification, and reorganization.

mod invalid;
mod orphans;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tarpon_chain::amount::Amount;
use tarpon_chain::block::{Block, MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT};
use tarpon_chain::parameters::{genesis_hash, Network};
use tarpon_chain::serialization::sha256d;
use tarpon_state::{ChainDB, ChainEntry, CoinView, HashOrHeight, StateError};

use crate::block::{check, subsidy};
use crate::clock::AdjustedClock;
use crate::error::{ChainError, VerifyError};
use crate::event::ChainEvent;
use crate::locker::Locker;
use crate::script::{AcceptingVerifier, ScriptCheck, ScriptVerifier};
use crate::versionbits::DeploymentState;
use crate::{locks, retarget, transaction, versionbits};

use invalid::InvalidCache;
use orphans::OrphanStore;

/// Tuning knobs for a [`Chain`].
pub struct ChainOptions {
    pub network: Network,
    /// The black-box script predicate; defaults to accepting everything,
    /// which is only appropriate for tests and template building.
    pub verifier: Arc<dyn ScriptVerifier>,
    /// Enforce hard-coded checkpoints until the first full sync.
    pub checkpoints: bool,
    /// The orphan pool's byte budget.
    pub orphan_limit: usize,
    /// How many invalid block hashes to remember.
    pub invalid_cache_capacity: usize,
}

impl ChainOptions {
    pub fn new(network: Network) -> ChainOptions {
        ChainOptions {
            network,
            verifier: Arc::new(AcceptingVerifier),
            checkpoints: true,
            orphan_limit: 16 << 20,
            invalid_cache_capacity: 1024,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ScriptVerifier>) -> ChainOptions {
        self.verifier = verifier;
        self
    }
}

/// Everything the chain mutates, guarded by the [`Locker`] for writers and
/// a plain mutex for momentary reads.
struct ChainState<D: ChainDB> {
    db: D,
    orphans: OrphanStore,
    invalid: InvalidCache,
    /// The rule set governing the next block on the current tip, promoted
    /// on every commit.
    deployment_state: DeploymentState,
    synced: bool,
    checkpoints_enabled: bool,
}

/// The block validation and chain management engine.
///
/// [`add`](Chain::add) is the single entry point for candidate blocks from
/// the network, in any order. The chain maintains the greatest-work valid
/// chain, stores competitive side chains, parks orphans until their parents
/// arrive, and reorganizes when a heavier branch appears. Consumers follow
/// along through the [event stream](Chain::subscribe).
pub struct Chain<D: ChainDB> {
    network: Network,
    state: StdMutex<ChainState<D>>,
    locker: Locker,
    events: broadcast::Sender<ChainEvent>,
    clock: AdjustedClock,
    verifier: Arc<dyn ScriptVerifier>,
}

impl<D: ChainDB> Chain<D> {
    /// Wrap an opened database.
    pub fn new(mut db: D, options: ChainOptions) -> Chain<D> {
        let network = options.network;
        let tip = db.tip();
        let deployment_state =
            versionbits::deployment_state(&mut db, tip.time.timestamp(), &tip);
        let (events, _) = broadcast::channel(512);

        Chain {
            network,
            state: StdMutex::new(ChainState {
                db,
                orphans: OrphanStore::new(options.orphan_limit),
                invalid: InvalidCache::new(options.invalid_cache_capacity),
                deployment_state,
                synced: false,
                checkpoints_enabled: options.checkpoints,
            }),
            locker: Locker::new(),
            events,
            clock: AdjustedClock::new(),
            verifier: options.verifier,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Subscribe to the chain's event stream. Events arrive in commit
    /// order; see [`ChainEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// The node's adjusted clock; shared, so the time source can be nudged.
    pub fn clock(&self) -> &AdjustedClock {
        &self.clock
    }

    /// The current best entry.
    pub fn tip(&self) -> Arc<ChainEntry> {
        self.lock_state().db.tip()
    }

    /// The current best height.
    pub fn height(&self) -> u32 {
        self.tip().height.0
    }

    /// The rule set governing the next block.
    pub fn deployment_state(&self) -> DeploymentState {
        self.lock_state().deployment_state
    }

    /// Has the sync gate opened? (See [`ChainEvent::Full`].)
    pub fn is_synced(&self) -> bool {
        self.lock_state().synced
    }

    /// The number of orphans currently parked.
    pub fn orphan_count(&self) -> usize {
        self.lock_state().orphans.len()
    }

    /// Run `f` against the database while holding the state lock.
    ///
    /// For read paths (the template builder, RPC-style queries). Mutating
    /// access is deliberate too: the versionbits cache fills through
    /// `&mut`.
    pub fn with_db<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.lock_state().db)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ChainState<D>> {
        self.state.lock().expect("chain state lock is never poisoned")
    }

    fn emit(&self, event: ChainEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Ingest one candidate block.
    ///
    /// Serialized through the [`Locker`]; a concurrent second submission of
    /// the same hash fails fast with `duplicate-pending`. On success the
    /// returned entry is the block's index entry, whether it became the new
    /// tip or was stored on a side chain. A block with an unknown parent is
    /// parked as an orphan and reported as `bad-prevblk` (score 0, never
    /// bannable).
    ///
    /// After a commit, any orphan waiting on the committed hash re-enters
    /// validation, iteratively, so long-stalled chains resolve in order.
    pub async fn add(&self, block: Block) -> Result<Arc<ChainEntry>, ChainError> {
        let hash = block.hash();
        let _guard = self
            .locker
            .lock(Some(hash))
            .await
            .map_err(|_| VerifyError::duplicate("duplicate-pending"))?;

        let mut primary: Option<Result<Arc<ChainEntry>, ChainError>> = None;
        let mut queue: VecDeque<(Arc<Block>, bool)> = VecDeque::new();
        queue.push_back((Arc::new(block), false));

        while let Some((next, is_resolved_orphan)) = queue.pop_front() {
            let outcome = self.add_block(next);

            if let Ok(entry) = &outcome {
                let resolved = {
                    let mut state = self.lock_state();
                    state.orphans.take_by_parent(&entry.hash)
                };
                if let Some(orphan) = resolved {
                    self.emit(ChainEvent::Resolved {
                        hash: orphan.hash(),
                    });
                    queue.push_back((orphan, true));
                }
            }

            if is_resolved_orphan {
                // A failing orphan must not clobber the caller's result.
                if let Err(error) = outcome {
                    warn!(%error, "resolved orphan failed validation");
                    self.emit(ChainEvent::Error {
                        reason: error.to_string(),
                    });
                }
            } else {
                primary = Some(outcome);
            }
        }

        primary.expect("the submitted block always produces an outcome")
    }

    /// Roll the main chain back so `location` becomes the tip.
    pub async fn reset(&self, location: HashOrHeight) -> Result<Arc<ChainEntry>, ChainError> {
        let _guard = self
            .locker
            .lock(None)
            .await
            .expect("keyless locks cannot collide");

        let mut state = self.lock_state();
        let state = &mut *state;
        let entry = state.db.reset(location)?;
        state.deployment_state =
            versionbits::deployment_state(&mut state.db, entry.time.timestamp(), &entry);
        state.synced = false;

        info!(height = entry.height.0, hash = %entry.hash, "chain reset");
        self.emit(ChainEvent::Reset(entry.clone()));
        self.emit(ChainEvent::Tip(entry.clone()));
        Ok(entry)
    }

    fn add_block(&self, block: Arc<Block>) -> Result<Arc<ChainEntry>, ChainError> {
        let hash = block.hash();
        let now = self.clock.now();

        let mut state = self.lock_state();
        let state = &mut *state;

        // Fast duplicate and known-invalid guards, cheapest first.
        if hash == genesis_hash(self.network) {
            debug!(%hash, "duplicate genesis submission");
            self.emit(ChainEvent::Exists { hash });
            return Err(VerifyError::duplicate("duplicate").into());
        }
        if state.orphans.contains(&hash) {
            debug!(%hash, "block is already stored as an orphan");
            self.emit(ChainEvent::Exists { hash });
            return Err(VerifyError::duplicate("duplicate-orphan").into());
        }
        if state.invalid.contains(&hash) {
            return Err(self.reject(state, hash, VerifyError::invalid("duplicate", 100)));
        }
        let prev_hash = block.header.previous_block_hash;
        if state.invalid.contains(&prev_hash) {
            // Descendants of invalid blocks are invalid on contact.
            return Err(self.reject(state, hash, VerifyError::invalid("bad-prevblk", 100)));
        }

        if let Err(error) = check::check_sanity(&block, now) {
            return Err(self.reject(state, hash, error));
        }

        if state.db.has_entry(&hash) {
            debug!(%hash, "duplicate block");
            self.emit(ChainEvent::Exists { hash });
            return Err(VerifyError::duplicate("duplicate").into());
        }

        let parent = match state.db.get_entry(HashOrHeight::Hash(prev_hash)) {
            Some(parent) => parent,
            None => {
                self.store_orphan(state, block);
                return Err(VerifyError::invalid("bad-prevblk", 0).into());
            }
        };

        let height = parent.height.next();
        if state.checkpoints_enabled {
            if let Some(expected) = self.network.checkpoint(height) {
                if hash != expected {
                    let purged = state.orphans.clear();
                    warn!(
                        height = height.0,
                        %expected,
                        received = %hash,
                        "checkpoint mismatch; purging {} orphans",
                        purged,
                    );
                    self.emit(ChainEvent::Fork { hash, height });
                    self.emit(ChainEvent::Checkpoint {
                        height,
                        expected,
                        received: hash,
                    });
                    return Err(VerifyError::checkpoint("checkpoint mismatch").into());
                }
            }
        }

        let entry = match state.db.create_entry(&block, &parent) {
            Some(entry) => Arc::new(entry),
            None => {
                return Err(self.reject(state, hash, VerifyError::invalid("bad-diffbits", 100)))
            }
        };

        let tip = state.db.tip();
        if entry.chainwork <= tip.chainwork {
            self.save_alternate(state, entry.clone(), block, &parent, now)?;
        } else {
            self.set_best_chain(state, entry.clone(), block, &parent, now)?;
            self.maybe_sync(state);
        }

        metrics::counter!("chain.block.count", 1);
        Ok(entry)
    }

    fn store_orphan(&self, state: &mut ChainState<D>, block: Arc<Block>) {
        let hash = block.hash();
        let height = block.coinbase_height();
        state.orphans.insert(block);
        debug!(%hash, ?height, "storing orphan block");
        self.emit(ChainEvent::Orphan { hash });

        let (count, size) = state.orphans.prune();
        if count > 0 {
            warn!(count, size, "pruned orphans over the memory limit");
            self.emit(ChainEvent::Purge { count, size });
        }
        metrics::gauge!("chain.orphan.count", state.orphans.len() as i64);
    }

    /// Mark a verification failure: cache the hash (unless the failure is
    /// malleated), announce it, and wrap it for return.
    fn reject(
        &self,
        state: &mut ChainState<D>,
        hash: tarpon_chain::block::Hash,
        error: VerifyError,
    ) -> ChainError {
        if !error.malleated {
            state.invalid.insert(hash);
        }
        warn!(
            %hash,
            reason = error.reason,
            score = error.score,
            malleated = error.malleated,
            "invalid block",
        );
        self.emit(ChainEvent::Invalid {
            hash,
            error: error.clone(),
        });
        ChainError::Verify(error)
    }

    /// Store a valid-looking block that does not have enough work to become
    /// the tip.
    fn save_alternate(
        &self,
        state: &mut ChainState<D>,
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
        parent: &ChainEntry,
        now: DateTime<Utc>,
    ) -> Result<(), ChainError> {
        if state.checkpoints_enabled && entry.height <= self.network.last_checkpoint() {
            return Err(self.reject(
                state,
                entry.hash,
                VerifyError::checkpoint("bad-fork-prior-to-checkpoint"),
            ));
        }

        // Contextual checks run now; input-level validation waits until the
        // branch actually competes for the tip.
        if let Err(error) = self.verify(&mut state.db, &block, parent, now) {
            return Err(self.reject(state, entry.hash, error));
        }

        state.db.save(entry.clone(), block.clone(), None)?;

        warn!(
            height = entry.height.0,
            hash = %entry.hash,
            "heads up: competing chain at height {}",
            entry.height.0,
        );
        self.emit(ChainEvent::Competitor { entry, block });
        Ok(())
    }

    /// Commit a block as the new tip, reorganizing first when it extends a
    /// side chain.
    fn set_best_chain(
        &self,
        state: &mut ChainState<D>,
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
        parent: &ChainEntry,
        now: DateTime<Utc>,
    ) -> Result<(), ChainError> {
        let tip = state.db.tip();
        if entry.previous_block_hash != tip.hash {
            warn!(
                old = %tip.hash,
                new = %entry.hash,
                "reorganizing to a heavier chain",
            );
            self.reorganize(state, &entry, now)?;
        }

        let (view, deployment) = match self.verify_context(state, &block, parent, now) {
            Ok(result) => result,
            Err(ChainError::Verify(error)) => {
                return Err(self.reject(state, entry.hash, error));
            }
            Err(other) => return Err(other),
        };

        state.db.save(entry.clone(), block.clone(), Some(view))?;
        state.deployment_state = deployment;

        debug!(height = entry.height.0, hash = %entry.hash, "block connected");
        metrics::gauge!("chain.height", entry.height.0 as i64);

        self.emit(ChainEvent::Block {
            entry: entry.clone(),
            block: block.clone(),
        });
        self.emit(ChainEvent::Connect {
            entry: entry.clone(),
            block,
        });
        self.emit(ChainEvent::Tip(entry));
        Ok(())
    }

    /// Switch the main chain onto the branch ending at `competitor`'s
    /// parent.
    ///
    /// Side-chain blocks get their first full validation here; if one fails,
    /// the chain is rolled back to the fork and the error surfaces.
    fn reorganize(
        &self,
        state: &mut ChainState<D>,
        competitor: &ChainEntry,
        now: DateTime<Utc>,
    ) -> Result<(), ChainError> {
        let tip = state.db.tip();
        let fork = self.find_fork(&state.db, tip.clone(), competitor)?;

        info!(
            fork = %fork.hash,
            old_tip = %tip.hash,
            depth = tip.height.0 - fork.height.0,
            "reorganize",
        );
        self.emit(ChainEvent::Reorganize {
            old_tip: tip.clone(),
            new_tip: Arc::new(competitor.clone()),
        });
        metrics::counter!("chain.reorganize.count", 1);

        // Unwind the losing branch, newest first.
        let mut current = tip;
        while current.hash != fork.hash {
            let block = state
                .db
                .get_block(&current.hash)
                .ok_or_else(|| box_state_error(StateError::MissingBlock(current.hash)))?;
            state.db.disconnect(&current, &block)?;
            self.emit(ChainEvent::Disconnect {
                entry: current.clone(),
                block,
            });
            current = state
                .db
                .get_entry(HashOrHeight::Hash(current.previous_block_hash))
                .ok_or_else(|| {
                    box_state_error(StateError::MissingBlock(current.previous_block_hash))
                })?;
        }

        // Collect the winning branch below the competitor (which the outer
        // commit will connect), oldest last.
        let mut pending = Vec::new();
        let mut walk = state
            .db
            .get_entry(HashOrHeight::Hash(competitor.previous_block_hash))
            .ok_or_else(|| {
                box_state_error(StateError::MissingBlock(competitor.previous_block_hash))
            })?;
        while walk.hash != fork.hash {
            pending.push(walk.clone());
            walk = state
                .db
                .get_entry(HashOrHeight::Hash(walk.previous_block_hash))
                .ok_or_else(|| box_state_error(StateError::MissingBlock(walk.previous_block_hash)))?;
        }

        // Replay it oldest first; these blocks were only ever checked
        // contextually, so they get the full treatment now.
        for entry in pending.into_iter().rev() {
            let block = state
                .db
                .get_block(&entry.hash)
                .ok_or_else(|| box_state_error(StateError::MissingBlock(entry.hash)))?;
            let parent = state
                .db
                .get_entry(HashOrHeight::Hash(entry.previous_block_hash))
                .ok_or_else(|| {
                    box_state_error(StateError::MissingBlock(entry.previous_block_hash))
                })?;

            match self.verify_context(state, &block, &parent, now) {
                Ok((view, deployment)) => {
                    state.db.reconnect(entry.clone(), block.clone(), view)?;
                    state.deployment_state = deployment;
                    self.emit(ChainEvent::Reconnect {
                        entry: entry.clone(),
                        block: block.clone(),
                    });
                    self.emit(ChainEvent::Connect { entry, block });
                }
                Err(ChainError::Verify(error)) => {
                    let failed = self.reject(state, entry.hash, error);
                    self.rollback_to(state, &fork)?;
                    return Err(failed);
                }
                Err(other) => return Err(other),
            }
        }

        Ok(())
    }

    fn rollback_to(&self, state: &mut ChainState<D>, fork: &ChainEntry) -> Result<(), ChainError> {
        while state.db.tip().hash != fork.hash {
            let tip = state.db.tip();
            let block = state
                .db
                .get_block(&tip.hash)
                .ok_or_else(|| box_state_error(StateError::MissingBlock(tip.hash)))?;
            state.db.disconnect(&tip, &block)?;
            self.emit(ChainEvent::Disconnect { entry: tip, block });
        }
        Ok(())
    }

    /// The lowest common ancestor of the current tip and a competitor
    /// entry.
    fn find_fork(
        &self,
        db: &D,
        tip: Arc<ChainEntry>,
        competitor: &ChainEntry,
    ) -> Result<Arc<ChainEntry>, ChainError> {
        // The competitor itself is not stored yet, but its parent chain is.
        let mut longer = tip;
        let mut shorter = db
            .get_entry(HashOrHeight::Hash(competitor.previous_block_hash))
            .ok_or_else(|| {
                box_state_error(StateError::MissingBlock(competitor.previous_block_hash))
            })?;

        if longer.height < shorter.height {
            std::mem::swap(&mut longer, &mut shorter);
        }
        longer = db
            .ancestor(&longer, shorter.height)
            .ok_or_else(|| box_state_error(StateError::MissingBlock(shorter.hash)))?;

        while longer.hash != shorter.hash {
            longer = db
                .get_entry(HashOrHeight::Hash(longer.previous_block_hash))
                .ok_or_else(|| {
                    box_state_error(StateError::MissingBlock(longer.previous_block_hash))
                })?;
            shorter = db
                .get_entry(HashOrHeight::Hash(shorter.previous_block_hash))
                .ok_or_else(|| {
                    box_state_error(StateError::MissingBlock(shorter.previous_block_hash))
                })?;
        }
        Ok(longer)
    }

    /// Contextual header- and transaction-level verification: everything
    /// that needs the parent but not the coin set.
    fn verify(
        &self,
        db: &mut D,
        block: &Block,
        prev: &ChainEntry,
        now: DateTime<Utc>,
    ) -> Result<DeploymentState, VerifyError> {
        let header = &block.header;
        let height = prev.height.next();

        // The difficulty the chain position demands.
        let expected_bits = retarget::get_target(db, self.network, header.time, Some(prev));
        if header.bits != expected_bits {
            return Err(VerifyError::invalid("bad-diffbits", 100));
        }

        let median_time = db.median_time_past(prev);
        if header.time.timestamp() <= median_time {
            return Err(VerifyError::invalid("time-too-old", 0));
        }
        if header.time > now + Duration::seconds(check::MAX_TIME_DRIFT) {
            return Err(VerifyError::malleated("time-too-new", 0));
        }

        let state = versionbits::deployment_state(db, header.time.timestamp(), prev);

        // Versions below the rule they predate are obsolete once the rule
        // is active.
        if (header.version < 2 && state.bip34)
            || (header.version < 3 && height >= self.network.bip66_height())
            || (header.version < 4 && height >= self.network.bip65_height())
        {
            return Err(VerifyError::obsolete("bad-version", 0));
        }

        // Transaction finality, against median time past once BIP 113
        // activates.
        let lock_time = if state.has_mtp() {
            median_time
        } else {
            header.time.timestamp()
        };
        for tx in block.transactions.iter() {
            if !tx.is_final(height, lock_time) {
                return Err(VerifyError::invalid("bad-txns-nonfinal", 10));
            }
        }

        if state.bip34 {
            if block.coinbase_height() != Some(height) {
                return Err(VerifyError::invalid("bad-cb-height", 100));
            }
        }

        // Witness commitment. (BIP 141)
        let commitment = if state.has_witness() {
            block.witness_commitment()
        } else {
            None
        };
        if let Some(commitment) = commitment {
            let nonce = match block.witness_nonce() {
                Some(nonce) => nonce,
                None => return Err(VerifyError::malleated("bad-witness-nonce-size", 100)),
            };
            let witness_root = block.witness_root();
            let mut preimage = Vec::with_capacity(64);
            preimage.extend_from_slice(&witness_root.0);
            preimage.extend_from_slice(&nonce);
            if sha256d::digest(&preimage) != commitment {
                return Err(VerifyError::malleated("bad-witness-merkle-match", 100));
            }
        } else if block.has_witness() {
            // No commitment is being validated, so witness data has no
            // business being here.
            return Err(VerifyError::malleated("unexpected-witness", 100));
        }

        if block.weight() > MAX_BLOCK_WEIGHT {
            return Err(VerifyError::invalid("bad-blk-weight", 100));
        }

        Ok(state)
    }

    /// Full contextual verification: [`verify`](Self::verify), the BIP 30
    /// duplicate-txid check, and input-level validation through a
    /// [`CoinView`].
    fn verify_context(
        &self,
        state: &mut ChainState<D>,
        block: &Block,
        prev: &ChainEntry,
        now: DateTime<Utc>,
    ) -> Result<(CoinView, DeploymentState), ChainError> {
        let deployment = self
            .verify(&mut state.db, block, prev, now)
            .map_err(ChainError::Verify)?;

        let height = prev.height.next();
        let hash = block.hash();

        // BIP 30: no new transaction may shadow a txid that still has
        // unspent coins, except the two grandfathered historical blocks.
        if !self.network.is_bip30_exception(height, &hash) {
            for tx in block.transactions.iter() {
                if state.db.has_coins(&tx.hash()) {
                    return Err(VerifyError::invalid("bad-txns-BIP30", 100).into());
                }
            }
        }

        let historical =
            state.checkpoints_enabled && height <= self.network.last_checkpoint();
        let view = self.verify_inputs(&mut state.db, block, prev, &deployment, historical)?;

        Ok((view, deployment))
    }

    /// Spend the block through a fresh [`CoinView`], enforcing sequence
    /// locks, sigop cost, value conservation, and scripts; returns the
    /// view, ready to be committed atomically with the block.
    ///
    /// Deep under the last checkpoint, signature and sequence checks are
    /// skipped and the coins are simply recorded; the checkpoints vouch for
    /// that history.
    fn verify_inputs(
        &self,
        db: &mut D,
        block: &Block,
        prev: &ChainEntry,
        deployment: &DeploymentState,
        historical: bool,
    ) -> Result<CoinView, ChainError> {
        let height = prev.height.next();
        let mut view = CoinView::new();

        let mut sigops_cost = 0usize;
        let mut fees = Amount::ZERO;
        let mut checks: Vec<ScriptCheck> = Vec::new();

        for (index, tx) in block.transactions.iter().enumerate() {
            if index > 0 {
                let coins = match view.spend(db, tx) {
                    Some(coins) => coins,
                    None => {
                        return Err(
                            VerifyError::invalid("bad-txns-inputs-missingorspent", 100).into()
                        )
                    }
                };

                if !historical {
                    let sequence_locks =
                        locks::get_locks(db, &view, tx, prev, deployment.lock_flags);
                    if !locks::verify_locks(db, prev, &sequence_locks) {
                        return Err(VerifyError::invalid("bad-txns-nonfinal", 100).into());
                    }
                }

                sigops_cost += transaction::check::sigops_cost(tx, &coins, deployment.flags);

                let fee = transaction::check::check_inputs(tx, &coins, height, self.network)
                    .map_err(ChainError::Verify)?;
                fees = fees
                    .checked_add(fee)
                    .map_err(|_| VerifyError::invalid("bad-txns-fee-outofrange", 100))?;

                if !historical {
                    for (input_index, coin) in coins.into_iter().enumerate() {
                        checks.push(ScriptCheck {
                            tx: tx.clone(),
                            input_index,
                            coin,
                            flags: deployment.flags,
                        });
                    }
                }
            } else {
                sigops_cost += transaction::check::sigops_cost(tx, &[], deployment.flags);
            }

            if sigops_cost > MAX_BLOCK_SIGOPS_COST {
                return Err(VerifyError::invalid("bad-blk-sigops", 100).into());
            }

            view.add_tx(tx, height);
        }

        // The coinbase may claim at most the subsidy plus the fees actually
        // paid.
        let reward = fees
            .checked_add(subsidy::block_subsidy(height, self.network))
            .map_err(|_| VerifyError::invalid("bad-cb-amount", 100))?;
        let claimed = block.transactions[0]
            .output_value()
            .map_err(|_| VerifyError::invalid("bad-cb-amount", 100))?;
        if claimed > reward {
            return Err(VerifyError::invalid("bad-cb-amount", 100).into());
        }

        // Scripts go last, batched: implementations may fan this out over a
        // worker pool.
        if !checks.is_empty() && !self.verifier.verify_batch(&checks) {
            return Err(
                VerifyError::invalid("mandatory-script-verify-flag-failed", 100).into(),
            );
        }

        Ok(view)
    }

    /// Open the sync gate once the chain looks caught up: enough cumulative
    /// work, a fresh tip, and past the last checkpoint. One-shot; also
    /// disables checkpoint enforcement from then on.
    fn maybe_sync(&self, state: &mut ChainState<D>) {
        if state.synced {
            return;
        }
        let tip = state.db.tip();

        if state.checkpoints_enabled && tip.height < self.network.last_checkpoint() {
            return;
        }
        if tip.chainwork < self.network.minimum_chain_work() {
            return;
        }
        if tip.time < self.clock.now() - self.network.max_tip_age() {
            return;
        }

        state.synced = true;
        state.checkpoints_enabled = false;
        info!(height = tip.height.0, "chain is fully synced");
        self.emit(ChainEvent::Full);
    }
}

fn box_state_error(error: StateError) -> ChainError {
    ChainError::State(Box::new(error))
}
