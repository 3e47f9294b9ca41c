//! Download progress tracking
//!
//! A [`ProgressTracker`] counts how many transfers were requested and how
//! many have finished. One tracker is shared (by cheap clone) across every
//! transfer of a `get` or `wait_get` call; transfers report back through
//! [`ProgressTracker::mark_done`] from whatever task they run on.

use crate::types::{DownloadTask, TaskId, TaskOutcome};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Callback run once per finished task
type CompletionCallback = Arc<dyn Fn(&TaskReport) + Send + Sync>;

/// Snapshot of the tracker's counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    /// Tasks registered so far
    pub requested: usize,
    /// Tasks that finished (successfully or not)
    pub completed: usize,
}

impl ProgressCounts {
    /// True when every registered task has finished
    pub fn is_complete(&self) -> bool {
        self.completed >= self.requested
    }
}

/// Passed to completion callbacks
#[derive(Clone, Debug)]
pub struct TaskReport {
    /// Task identity
    pub id: TaskId,
    /// The transfer that finished
    pub task: DownloadTask,
    /// How it finished
    pub outcome: TaskOutcome,
    /// Counters right after this task was counted
    pub counts: ProgressCounts,
}

/// Final accounting of a tracker
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    /// Tasks registered
    pub requested: usize,
    /// Tasks finished
    pub completed: usize,
    /// Files written to disk
    pub downloaded: Vec<PathBuf>,
    /// Total bytes written
    pub bytes: u64,
    /// Files left alone because they already existed or were already in flight
    pub skipped: usize,
    /// Failed transfers as (url, error)
    pub failed: Vec<(String, String)>,
}

#[derive(Default)]
struct TrackerState {
    next_id: u64,
    counts: ProgressCounts,
    pending: HashMap<TaskId, DownloadTask>,
    finished: Vec<(DownloadTask, TaskOutcome)>,
    skipped: usize,
    callbacks: Vec<CompletionCallback>,
}

impl TrackerState {
    fn insert_pending(&mut self, task: DownloadTask) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.pending.insert(id, task);
        self.counts.requested += 1;
        id
    }
}

/// Thread-safe requested/completed bookkeeping for a batch of transfers
///
/// Counters only move through [`register`](Self::register) and
/// [`mark_done`](Self::mark_done); `completed` never exceeds `requested`.
#[derive(Clone)]
pub struct ProgressTracker {
    state: Arc<Mutex<TrackerState>>,
    counts_tx: Arc<tokio::sync::watch::Sender<ProgressCounts>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("counts", &self.counts())
            .finish()
    }
}

impl ProgressTracker {
    /// Create an empty tracker (complete until something is registered)
    pub fn new() -> Self {
        let (counts_tx, _rx) = tokio::sync::watch::channel(ProgressCounts::default());
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            counts_tx: Arc::new(counts_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register transfers that are about to be dispatched
    ///
    /// Returns one id per task, in order. Registering an empty batch is a
    /// no-op and leaves a complete tracker complete.
    pub fn register(&self, tasks: Vec<DownloadTask>) -> Vec<TaskId> {
        let mut state = self.lock();

        if tasks.is_empty() {
            tracing::debug!(
                requested = state.counts.requested,
                completed = state.counts.completed,
                "empty batch registered"
            );
            return Vec::new();
        }

        let ids: Vec<TaskId> = tasks
            .into_iter()
            .map(|task| state.insert_pending(task))
            .collect();
        self.publish(&state);
        ids
    }

    /// Register only tasks whose destination is not already in flight
    ///
    /// Duplicates within `tasks` and destinations of unfinished tasks are
    /// dropped and counted as skipped, so no two live transfers ever write
    /// the same file.
    pub(crate) fn register_unique(&self, tasks: Vec<DownloadTask>) -> Vec<(TaskId, DownloadTask)> {
        let mut state = self.lock();
        let mut in_flight: HashSet<PathBuf> = state
            .pending
            .values()
            .map(|task| task.destination.clone())
            .collect();

        let mut accepted = Vec::with_capacity(tasks.len());
        for task in tasks {
            if !in_flight.insert(task.destination.clone()) {
                tracing::debug!(
                    path = %task.destination.display(),
                    url = %task.url,
                    "destination already being downloaded, skipping"
                );
                state.skipped += 1;
                continue;
            }
            let id = state.insert_pending(task.clone());
            accepted.push((id, task));
        }

        if !accepted.is_empty() {
            self.publish(&state);
        }
        accepted
    }

    /// Push the current counters to waiters
    ///
    /// Called with the state lock held so published values follow the order
    /// of the updates.
    fn publish(&self, state: &TrackerState) {
        self.counts_tx.send_replace(state.counts);
    }

    /// Record that a registered task finished
    ///
    /// Returns false (and changes nothing) for unknown ids and for ids that
    /// were already marked done.
    pub fn mark_done(&self, id: TaskId, outcome: TaskOutcome) -> bool {
        let mut state = self.lock();
        let Some(task) = state.pending.remove(&id) else {
            tracing::debug!(task_id = %id, "ignoring completion for unknown or finished task");
            return false;
        };

        state.counts.completed += 1;
        let counts = state.counts;
        state.finished.push((task.clone(), outcome.clone()));
        let callbacks = state.callbacks.clone();
        self.publish(&state);
        drop(state);

        if !callbacks.is_empty() {
            let report = TaskReport {
                id,
                task,
                outcome,
                counts,
            };
            for callback in &callbacks {
                callback(&report);
            }
        }
        true
    }

    /// Install a callback run for every task that finishes from now on
    ///
    /// Callbacks run on the task that reported completion; keep them short.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(&TaskReport) + Send + Sync + 'static,
    {
        self.lock().callbacks.push(Arc::new(callback));
    }

    /// Record files that were not registered because they already exist
    pub(crate) fn note_skipped(&self, count: usize) {
        self.lock().skipped += count;
    }

    /// Current counters
    pub fn counts(&self) -> ProgressCounts {
        self.lock().counts
    }

    /// Tasks registered so far
    pub fn requested(&self) -> usize {
        self.counts().requested
    }

    /// Tasks finished so far
    pub fn completed(&self) -> usize {
        self.counts().completed
    }

    /// True when every registered task has finished
    pub fn is_complete(&self) -> bool {
        self.counts().is_complete()
    }

    /// Wait until every registered task has finished
    ///
    /// With `report_interval`, a progress line is logged at that interval
    /// while waiting. Tasks registered while waiting extend the wait.
    pub async fn wait(&self, report_interval: Option<Duration>) {
        let mut rx = self.counts_tx.subscribe();
        let mut ticker = report_interval.map(|every| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval
        });

        loop {
            let counts = *rx.borrow_and_update();
            if counts.is_complete() {
                if ticker.is_some() {
                    tracing::info!(
                        completed = counts.completed,
                        requested = counts.requested,
                        "all downloads finished"
                    );
                }
                return;
            }

            match ticker.as_mut() {
                Some(interval) => {
                    tokio::select! {
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        _ = interval.tick() => {
                            let counts = *rx.borrow();
                            tracing::info!(
                                completed = counts.completed,
                                requested = counts.requested,
                                "{}/{} files downloaded",
                                counts.completed,
                                counts.requested
                            );
                        }
                    }
                }
                None => {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Outcome of every finished task so far
    pub fn summary(&self) -> ProgressSummary {
        let state = self.lock();
        let mut summary = ProgressSummary {
            requested: state.counts.requested,
            completed: state.counts.completed,
            skipped: state.skipped,
            ..Default::default()
        };
        for (task, outcome) in &state.finished {
            match outcome {
                TaskOutcome::Downloaded { path, bytes } => {
                    summary.downloaded.push(path.clone());
                    summary.bytes += bytes;
                }
                TaskOutcome::Failed { error } => {
                    summary.failed.push((task.url.clone(), error.clone()));
                }
            }
        }
        summary
    }
}
