//! Keyed delay set shared by scheduled dispatch and retry backoff.
//!
//! Entries wait until their due time, then a ticker hands them to a
//! [`PromotionTarget`]. State sits behind a std mutex that is never held
//! across an await: entries are taken out, promoted, and put back on
//! backpressure.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskforge_core::Task;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Rejected;
use crate::store::TaskStore;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Somewhere due tasks can be handed to.
#[async_trait]
pub trait PromotionTarget: Send + Sync {
    async fn promote(&self, task: Task) -> Result<(), Rejected>;
}

/// Why an entry could not be cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelMiss {
    /// Never seen, or forgotten.
    Absent,
    /// Taken out by the ticker and being handed over right now.
    InFlight,
    /// Already handed over.
    Promoted,
    /// Still waiting, but the caller's check refused it.
    Refused(String),
}

#[derive(Debug)]
pub(crate) struct Waiting {
    due: DateTime<Utc>,
    task: Task,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PromotionReport {
    pub promoted: usize,
    /// Put back because the target stayed full.
    pub deferred: usize,
    /// Refused for good (target closed or task invalid).
    pub dropped: usize,
}

struct State<K> {
    waiting: BTreeMap<K, Waiting>,
    in_flight: HashSet<K>,
    promoted: VecDeque<K>,
    promoted_set: HashSet<K>,
}

pub struct Timeline<K> {
    name: String,
    history: usize,
    state: Mutex<State<K>>,
    /// Fires whenever an in-flight entry is promoted, put back or dropped.
    settled: Notify,
}

impl<K> Timeline<K>
where
    K: Ord + Hash + Clone + Debug + Send,
{
    /// `history` bounds how many promoted keys are remembered.
    pub fn new(name: impl Into<String>, history: usize) -> Self {
        Self {
            name: name.into(),
            history,
            state: Mutex::new(State {
                waiting: BTreeMap::new(),
                in_flight: HashSet::new(),
                promoted: VecDeque::new(),
                promoted_set: HashSet::new(),
            }),
            settled: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Park a task until `due`. Replaces a waiting entry with the same key
    /// and returns it.
    pub fn insert(&self, key: K, task: Task, due: DateTime<Utc>) -> Option<Task> {
        let mut state = lock(&self.state);
        if state.promoted_set.remove(&key) {
            state.promoted.retain(|k| k != &key);
        }
        state
            .waiting
            .insert(key, Waiting { due, task })
            .map(|old| old.task)
    }

    /// Remove a waiting entry if `accept` agrees.
    pub fn cancel_if<F>(&self, key: &K, accept: F) -> Result<Task, CancelMiss>
    where
        F: FnOnce(&Task) -> Result<(), String>,
    {
        let mut state = lock(&self.state);
        if let Some(entry) = state.waiting.get(key) {
            accept(&entry.task).map_err(CancelMiss::Refused)?;
            return state
                .waiting
                .remove(key)
                .map(|entry| entry.task)
                .ok_or(CancelMiss::Absent);
        }
        if state.in_flight.contains(key) {
            Err(CancelMiss::InFlight)
        } else if state.promoted_set.contains(key) {
            Err(CancelMiss::Promoted)
        } else {
            Err(CancelMiss::Absent)
        }
    }

    /// Like [`cancel_if`](Self::cancel_if), but an entry that is being
    /// handed over is waited for: it is cancelled if the handover is
    /// refused and put back, and reported as promoted otherwise.
    pub async fn cancel_settled<F>(&self, key: &K, accept: F) -> Result<Task, CancelMiss>
    where
        F: Fn(&Task) -> Result<(), String>,
    {
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            match self.cancel_if(key, &accept) {
                Err(CancelMiss::InFlight) => settled.await,
                outcome => return outcome,
            }
        }
    }

    /// Waiting entries.
    pub fn len(&self) -> usize {
        lock(&self.state).waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).waiting.values().map(|w| w.due).min()
    }

    /// Take every entry due at `now`, in key order, marking them in flight.
    pub(crate) fn take_ready(&self, now: DateTime<Utc>) -> Vec<(K, Waiting)> {
        let mut state = lock(&self.state);
        let keys: Vec<K> = state
            .waiting
            .iter()
            .filter(|(_, w)| w.due <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let mut ready = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = state.waiting.remove(&key) {
                state.in_flight.insert(key.clone());
                ready.push((key, entry));
            }
        }
        ready
    }

    /// Put an in-flight entry back. A newer insert under the same key wins.
    pub(crate) fn restore(&self, key: K, entry: Waiting) {
        {
            let mut state = lock(&self.state);
            state.in_flight.remove(&key);
            if state.waiting.contains_key(&key) {
                debug!(timeline = %self.name, key = ?key, "entry replaced while in flight");
            } else {
                state.waiting.insert(key, entry);
            }
        }
        self.settled.notify_waiters();
    }

    pub(crate) fn mark_promoted(&self, key: K) {
        {
            let mut state = lock(&self.state);
            state.in_flight.remove(&key);
            if self.history > 0 && state.promoted_set.insert(key.clone()) {
                state.promoted.push_back(key);
            }
            while state.promoted.len() > self.history {
                if let Some(oldest) = state.promoted.pop_front() {
                    state.promoted_set.remove(&oldest);
                }
            }
        }
        self.settled.notify_waiters();
    }

    pub(crate) fn forget(&self, key: &K) {
        lock(&self.state).in_flight.remove(key);
        self.settled.notify_waiters();
    }

    /// Empty the timeline, returning whatever was still waiting.
    pub fn drain(&self) -> Vec<Task> {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.waiting)
            .into_values()
            .map(|w| w.task)
            .collect()
    }

    /// Hand every due entry to `target`.
    ///
    /// Backpressured entries go back for the next round, keeping their due
    /// time. Entries refused for good are marked failed and reported to
    /// `store`. Once `stop` fires the remaining entries are put back
    /// untouched.
    pub async fn promote_ready<T>(
        &self,
        target: &T,
        store: &dyn TaskStore,
        now: DateTime<Utc>,
        stop: &CancellationToken,
    ) -> PromotionReport
    where
        T: PromotionTarget + ?Sized,
    {
        let mut report = PromotionReport::default();
        let mut ready = self.take_ready(now).into_iter();

        while let Some((key, Waiting { due, task })) = ready.next() {
            if stop.is_cancelled() {
                self.restore(key, Waiting { due, task });
                for (key, entry) in ready.by_ref() {
                    self.restore(key, entry);
                }
                break;
            }

            let task_id = task.id;
            match target.promote(task).await {
                Ok(()) => {
                    debug!(timeline = %self.name, task_id = %task_id, "promoted");
                    self.mark_promoted(key);
                    report.promoted += 1;
                }
                Err(rejected) if rejected.error.is_backpressure() => {
                    debug!(timeline = %self.name, task_id = %task_id, "target full, deferring");
                    self.restore(key, Waiting { due, task: rejected.into_task() });
                    report.deferred += 1;
                }
                Err(rejected) => {
                    self.forget(&key);
                    let error = rejected.error.to_string();
                    warn!(
                        timeline = %self.name,
                        task_id = %task_id,
                        error = %error,
                        "promotion refused"
                    );
                    let mut task = rejected.into_task();
                    task.fail(error);
                    if let Err(e) = store.update(&task) {
                        warn!(task_id = %task_id, error = %e, "failed to record task state");
                    }
                    report.dropped += 1;
                }
            }
        }

        report
    }
}

/// Run `promote_ready` every `tick` until `stop` fires.
pub(crate) fn spawn_ticker<K, T>(
    timeline: Arc<Timeline<K>>,
    target: Arc<T>,
    store: Arc<dyn TaskStore>,
    tick: Duration,
    stop: CancellationToken,
) -> JoinHandle<()>
where
    K: Ord + Hash + Clone + Debug + Send + Sync + 'static,
    T: PromotionTarget + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = interval.tick() => {
                    let report = timeline
                        .promote_ready(target.as_ref(), store.as_ref(), Utc::now(), &stop)
                        .await;
                    if report != PromotionReport::default() {
                        debug!(
                            timeline = %timeline.name(),
                            promoted = report.promoted,
                            deferred = report.deferred,
                            dropped = report.dropped,
                            "tick"
                        );
                    }
                }
            }
        }

        debug!(timeline = %timeline.name(), "ticker stopped");
    })
}
