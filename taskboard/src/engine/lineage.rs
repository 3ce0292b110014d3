//! Per-task mutation lineage.
//!
//! Each optimistic mutation takes a sequence number from a single
//! monotonically increasing counter. For every task with mutations in
//! flight the tracker remembers the latest issued sequence and a
//! "confirmed base": the last state of the task the server is known to
//! hold. Settlement compares sequences so that an older mutation resolving
//! late can never overwrite a newer one.
//!
//! Refreshes draw from the same counter. While a refresh is outstanding,
//! every settlement is stamped with a fresh sequence that outlives the
//! lineage entry, so a list produced before the settlement can be told
//! apart from one produced after it.

use std::collections::HashMap;

use taskboard_proto::task::{Task, TaskId};

use crate::snapshot::Snapshot;
use crate::store::TaskStore;

/// What the store must do after a settlement.
#[derive(Debug)]
pub enum Settlement {
    /// The store entry for the task must be overwritten with this state.
    Apply(Snapshot),
    /// The settling mutation was superseded; leave the store alone.
    Ignore,
}

#[derive(Debug)]
struct Lineage {
    latest: u64,
    latest_settled: bool,
    in_flight: usize,
    base: Snapshot,
    base_seq: u64,
}

/// Tracks in-flight mutations per task id.
#[derive(Debug, Default)]
pub struct LineageTracker {
    next_seq: u64,
    entries: HashMap<TaskId, Lineage>,
    refreshes: Vec<u64>,
    settled: HashMap<TaskId, u64>,
}

impl LineageTracker {
    /// Registers a refresh and returns the sequence it started at.
    pub fn begin_refresh(&mut self) -> u64 {
        self.next_seq += 1;
        self.refreshes.push(self.next_seq);
        self.next_seq
    }

    /// Forgets a refresh started with [`begin_refresh`](Self::begin_refresh).
    ///
    /// Settlement stamps no outstanding refresh can compare against are
    /// dropped.
    pub fn end_refresh(&mut self, started: u64) {
        self.refreshes.retain(|&seq| seq != started);
        match self.refreshes.iter().min() {
            Some(&oldest) => self.settled.retain(|_, &mut stamp| stamp > oldest),
            None => self.settled.clear(),
        }
    }

    /// Stamps a local settlement for `id`. A no-op unless a refresh is
    /// outstanding.
    pub fn record_settled(&mut self, id: TaskId) {
        if !self.refreshes.is_empty() {
            self.next_seq += 1;
            self.settled.insert(id, self.next_seq);
        }
    }

    /// Whether a mutation for `id` settled after the refresh that started
    /// at `started`. A list from that refresh is stale for such an id.
    #[must_use]
    pub fn settled_since(&self, id: TaskId, started: u64) -> bool {
        self.settled.get(&id).is_some_and(|&stamp| stamp > started)
    }

    /// Whether the local store, not a list from the refresh that started
    /// at `started`, holds the authoritative value for `id`.
    #[must_use]
    pub fn owns(&self, id: TaskId, started: u64) -> bool {
        self.entries.contains_key(&id) || self.settled_since(id, started)
    }

    /// Registers a new mutation for `id` and returns its sequence number.
    ///
    /// Must be called before the optimistic change is applied to `store`:
    /// the first mutation in a lineage captures the confirmed base from it.
    pub fn begin(&mut self, id: TaskId, store: &TaskStore) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        let lineage = self.entries.entry(id).or_insert_with(|| Lineage {
            latest: seq,
            latest_settled: false,
            in_flight: 0,
            base: Snapshot::capture_task(store, id),
            base_seq: 0,
        });
        lineage.latest = seq;
        lineage.latest_settled = false;
        lineage.in_flight += 1;
        seq
    }

    /// Records a successful settlement; `confirmed` is the server state
    /// (`None` after a delete).
    pub fn confirm(&mut self, id: TaskId, seq: u64, confirmed: Option<Task>) -> Settlement {
        let Some(lineage) = self.entries.get_mut(&id) else {
            return Settlement::Ignore;
        };
        lineage.in_flight = lineage.in_flight.saturating_sub(1);

        let settlement = if seq > lineage.base_seq {
            lineage.base = lineage.base.clone().with_entry(confirmed);
            lineage.base_seq = seq;
            if seq == lineage.latest {
                lineage.latest_settled = true;
                Settlement::Apply(lineage.base.clone())
            } else if lineage.latest_settled {
                // The newer mutation already failed and rolled back to an
                // older base; this confirmation is now the server truth.
                Settlement::Apply(lineage.base.clone())
            } else {
                Settlement::Ignore
            }
        } else {
            Settlement::Ignore
        };

        self.record_settled(id);
        self.release(id);
        settlement
    }

    /// Records a failed settlement.
    ///
    /// Only the latest mutation for a task rolls the store back.
    pub fn reject(&mut self, id: TaskId, seq: u64) -> Settlement {
        let Some(lineage) = self.entries.get_mut(&id) else {
            return Settlement::Ignore;
        };
        lineage.in_flight = lineage.in_flight.saturating_sub(1);

        let settlement = if seq == lineage.latest {
            lineage.latest_settled = true;
            Settlement::Apply(lineage.base.clone())
        } else {
            Settlement::Ignore
        };

        self.record_settled(id);
        self.release(id);
        settlement
    }

    /// Replaces the confirmed base of a tracked task with a freshly listed
    /// server state. Untracked ids are ignored.
    pub fn rebase(&mut self, id: TaskId, confirmed: Option<Task>) {
        if let Some(lineage) = self.entries.get_mut(&id) {
            lineage.base = lineage.base.clone().with_entry(confirmed);
        }
    }

    /// Number of unsettled mutations for `id`.
    #[must_use]
    pub fn in_flight(&self, id: TaskId) -> usize {
        self.entries.get(&id).map_or(0, |l| l.in_flight)
    }

    /// Ids with at least one unsettled mutation.
    #[must_use]
    pub fn tracked(&self) -> Vec<TaskId> {
        self.entries.keys().copied().collect()
    }

    fn release(&mut self, id: TaskId) {
        if self.entries.get(&id).is_some_and(|l| l.in_flight == 0) {
            self.entries.remove(&id);
        }
    }
}
