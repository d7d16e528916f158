//! Candidate-block assembly.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::iter::FromIterator;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use tarpon_chain::amount::Amount;
use tarpon_chain::block::{
    self, merkle, Block, Header, Height, MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT,
    WITNESS_COMMITMENT_PREFIX,
};
use tarpon_chain::serialization::sha256d;
use tarpon_chain::transaction::{self, LockTime, Transaction, SEQUENCE_FINAL};
use tarpon_chain::transparent::{CoinbaseData, Input, Output, Script, Witness};
use tarpon_chain::work::difficulty::CompactDifficulty;
use tarpon_consensus::block::subsidy::block_subsidy;
use tarpon_consensus::{retarget, versionbits, DeploymentState};
use tarpon_state::{ChainDB, ChainEntry};

use crate::entry::{MempoolEntry, MempoolSnapshot};

/// The classic free-transaction priority threshold: one coin, one day old,
/// in a 250-byte transaction.
pub const MIN_PRIORITY: f64 = tarpon_chain::amount::COIN as f64 * 144.0 / 250.0;

/// Knobs for template assembly.
#[derive(Clone, Debug)]
pub struct TemplateOptions {
    /// Where the coinbase pays.
    pub payout_script: Script,
    /// Free-form bytes appended to the coinbase after the height push.
    pub coinbase_flags: Vec<u8>,
    /// Weight budget for transactions (the coinbase reservation is taken
    /// off the consensus maximum separately).
    pub max_weight: usize,
    /// Sigop-cost budget for transactions.
    pub max_sigops: usize,
    /// Weight reserved for the coinbase and header.
    pub reserved_weight: usize,
    /// Sigop cost reserved for the coinbase.
    pub reserved_sigops: usize,
    /// How much of the block is filled priority-first before switching to
    /// fee rate. Zero disables the priority phase.
    pub priority_weight: usize,
    /// The priority floor for the priority phase.
    pub min_priority: f64,
    /// Free transactions are accepted only below this block weight.
    pub min_weight: usize,
}

impl TemplateOptions {
    pub fn new(payout_script: Script) -> TemplateOptions {
        TemplateOptions {
            payout_script,
            coinbase_flags: b"mined by tarpon".to_vec(),
            max_weight: MAX_BLOCK_WEIGHT,
            max_sigops: MAX_BLOCK_SIGOPS_COST,
            reserved_weight: 4_000,
            reserved_sigops: 400,
            priority_weight: 0,
            min_priority: MIN_PRIORITY,
            min_weight: 20_000,
        }
    }
}

/// One accepted transaction inside a template.
#[derive(Clone, Debug)]
pub struct TemplateItem {
    pub tx: Arc<Transaction>,
    pub fee: Amount,
    pub priority: f64,
    pub rate: u64,
}

/// A fully assembled candidate block, minus the proof of work.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub previous_block_hash: block::Hash,
    pub height: Height,
    pub version: u32,
    pub time: DateTime<Utc>,
    pub bits: CompactDifficulty,
    pub median_time_past: i64,
    /// Whether the template commits to witness data.
    pub witness: bool,
    pub subsidy: Amount,
    pub fees: Amount,
    pub items: Vec<TemplateItem>,
    pub payout_script: Script,
    pub coinbase_flags: Vec<u8>,
    pub weight: usize,
    pub sigops: usize,
}

impl BlockTemplate {
    /// The total the coinbase pays out.
    pub fn reward(&self) -> Amount {
        self.subsidy
            .checked_add(self.fees)
            .expect("subsidy plus collected fees is always in range")
    }

    /// Build the coinbase transaction (without the witness commitment
    /// output; [`to_block`](Self::to_block) appends it, since it depends on
    /// the final transaction set).
    fn create_coinbase(&self) -> Transaction {
        let mut data = CoinbaseData::height_push(self.height);
        data.extend_from_slice(&self.coinbase_flags);
        data.truncate(100);

        let witness = if self.witness {
            // The commitment nonce; all zeros, like everyone else's.
            Witness(vec![vec![0u8; 32]])
        } else {
            Witness::empty()
        };

        Transaction::new(
            1,
            vec![Input::Coinbase {
                data: CoinbaseData(data),
                sequence: SEQUENCE_FINAL,
                witness,
            }],
            vec![Output {
                value: self.reward(),
                lock_script: self.payout_script.clone(),
            }],
            LockTime::unlocked(),
        )
    }

    /// Materialize the template into a block ready for nonce search.
    pub fn to_block(&self) -> Block {
        let mut coinbase = self.create_coinbase();

        if self.witness {
            let wtxids: Vec<transaction::Hash> = std::iter::once(transaction::Hash([0; 32]))
                .chain(self.items.iter().map(|item| item.tx.witness_hash()))
                .collect();
            let witness_root = merkle::witness_root(&wtxids);

            let mut preimage = Vec::with_capacity(64);
            preimage.extend_from_slice(&witness_root.0);
            preimage.extend_from_slice(&[0u8; 32]);
            let commitment = sha256d::digest(&preimage);

            let mut script = Vec::with_capacity(38);
            script.extend_from_slice(&WITNESS_COMMITMENT_PREFIX);
            script.extend_from_slice(&commitment);
            coinbase.outputs.push(Output {
                value: Amount::ZERO,
                lock_script: Script::new(script),
            });
        }

        let transactions: Vec<Arc<Transaction>> = std::iter::once(Arc::new(coinbase))
            .chain(self.items.iter().map(|item| item.tx.clone()))
            .collect();
        let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));

        Block {
            header: Header::new(
                self.version,
                self.previous_block_hash,
                merkle_root,
                self.time,
                self.bits,
                0,
            ),
            transactions,
        }
    }
}

/// A selection candidate with its remaining in-block dependency count.
struct Candidate {
    entry: MempoolEntry,
    depends: usize,
}

struct ByPriority(MempoolEntry);

impl PartialEq for ByPriority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ByPriority {}
impl PartialOrd for ByPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ByPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .partial_cmp(&other.0.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.0.fee_rate().cmp(&other.0.fee_rate()))
    }
}

struct ByRate(MempoolEntry);

impl PartialEq for ByRate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ByRate {}
impl PartialOrd for ByRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ByRate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .fee_rate()
            .cmp(&other.0.fee_rate())
            .then_with(|| {
                self.0
                    .priority
                    .partial_cmp(&other.0.priority)
                    .unwrap_or(Ordering::Equal)
            })
    }
}

/// Assemble a template on `tip` from `snapshot`.
///
/// Selection is two-phase: a priority-ordered phase for the first
/// `priority_weight` weight units (skipped entirely when zero), then
/// fee-rate order for the rest, where free transactions are only accepted
/// while the block is still under `min_weight`. A transaction becomes
/// eligible only once all its in-snapshot parents are in the block, so the
/// result is always topologically valid.
pub fn build_template<D: ChainDB + ?Sized>(
    db: &mut D,
    tip: &ChainEntry,
    snapshot: &MempoolSnapshot,
    options: &TemplateOptions,
    now: DateTime<Utc>,
) -> BlockTemplate {
    let network = db.network();
    let height = tip.height.next();

    let median_time_past = db.median_time_past(tip);
    let time = std::cmp::max(Utc.timestamp(median_time_past + 1, 0), now);

    let state = versionbits::deployment_state(db, time.timestamp(), tip);
    let version = versionbits::compute_block_version(db, tip);
    let bits = retarget::get_target(db, network, time, Some(tip));

    let mut template = BlockTemplate {
        previous_block_hash: tip.hash,
        height,
        version,
        time,
        bits,
        median_time_past,
        witness: state.has_witness(),
        subsidy: block_subsidy(height, network),
        fees: Amount::ZERO,
        items: Vec::new(),
        payout_script: options.payout_script.clone(),
        coinbase_flags: options.coinbase_flags.clone(),
        weight: options.reserved_weight,
        sigops: options.reserved_sigops,
    };

    select_transactions(snapshot, options, &state, &mut template);

    debug!(
        height = height.0,
        transactions = template.items.len(),
        weight = template.weight,
        fees = %template.fees,
        "assembled block template",
    );

    template
}

fn select_transactions(
    snapshot: &MempoolSnapshot,
    options: &TemplateOptions,
    state: &DeploymentState,
    template: &mut BlockTemplate,
) {
    // Dependency bookkeeping over the snapshot.
    let mut candidates: HashMap<transaction::Hash, Candidate> = HashMap::new();
    let mut children: HashMap<transaction::Hash, Vec<transaction::Hash>> = HashMap::new();
    for entry in snapshot.iter() {
        let parents = snapshot.parents_of(entry);
        for parent in parents.iter() {
            children.entry(*parent).or_default().push(entry.hash());
        }
        candidates.insert(
            entry.hash(),
            Candidate {
                entry: entry.clone(),
                depends: parents.len(),
            },
        );
    }

    let mut use_priority = options.priority_weight > 0;
    let mut priority_queue: BinaryHeap<ByPriority> = BinaryHeap::new();
    let mut rate_queue: BinaryHeap<ByRate> = BinaryHeap::new();

    for candidate in candidates.values() {
        if candidate.depends == 0 {
            if use_priority {
                priority_queue.push(ByPriority(candidate.entry.clone()));
            } else {
                rate_queue.push(ByRate(candidate.entry.clone()));
            }
        }
    }

    let lock_time = if state.has_mtp() {
        template.median_time_past
    } else {
        template.time.timestamp()
    };

    loop {
        let entry = if use_priority {
            match priority_queue.pop() {
                Some(ByPriority(entry)) => entry,
                None => {
                    // Priority space ran dry; finish the block by fee rate.
                    use_priority = false;
                    continue;
                }
            }
        } else {
            match rate_queue.pop() {
                Some(ByRate(entry)) => entry,
                None => break,
            }
        };

        if use_priority
            && (template.weight > options.priority_weight
                || entry.priority < options.min_priority)
        {
            // The priority budget is spent: demote this entry and everything
            // still queued to the fee-rate phase.
            rate_queue.push(ByRate(entry));
            while let Some(ByPriority(leftover)) = priority_queue.pop() {
                rate_queue.push(ByRate(leftover));
            }
            use_priority = false;
            continue;
        }

        // Per-transaction admission checks; a skipped transaction also
        // strands its descendants, which is the conservative choice.
        if template.weight + entry.weight() > options.max_weight {
            continue;
        }
        if template.sigops + entry.sigops_cost > options.max_sigops {
            continue;
        }
        if !entry.tx.is_final(template.height, lock_time) {
            continue;
        }
        if !template.witness && entry.tx.has_witness() {
            continue;
        }
        if !use_priority && entry.is_free() && template.weight > options.min_weight {
            continue;
        }

        template.weight += entry.weight();
        template.sigops += entry.sigops_cost;
        template.fees = template
            .fees
            .checked_add(entry.fee)
            .expect("pool fees are in range");
        let hash = entry.hash();
        template.items.push(TemplateItem {
            rate: entry.fee_rate(),
            priority: entry.priority,
            fee: entry.fee,
            tx: entry.tx.clone(),
        });

        // Release anything that was only waiting on this transaction.
        if let Some(dependents) = children.get(&hash) {
            for dependent in dependents.clone() {
                if let Some(candidate) = candidates.get_mut(&dependent) {
                    candidate.depends -= 1;
                    if candidate.depends == 0 {
                        if use_priority {
                            priority_queue.push(ByPriority(candidate.entry.clone()));
                        } else {
                            rate_queue.push(ByRate(candidate.entry.clone()));
                        }
                    }
                }
            }
        }
    }
}
