//! Offline node bookkeeping.
//!
//! The tracker is the single source of truth for which nodes are being
//! retried. Each tracked node owns one recovery window and the timer task
//! probing it; the task itself is spawned by the recovery scheduler and handed
//! in as a [`TimerHandle`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Timing of recovery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySettings {
    /// Time between two probes of the same offline node
    pub interval: Duration,
    /// How long one recovery window stays active before it is refreshed
    pub window: Duration,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            window: Duration::from_secs(60),
        }
    }
}

/// A bounded span of time during which an offline node is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryWindow {
    /// When the window opened
    pub start: Instant,
    /// After this instant the timer stops firing
    pub end: Instant,
}

impl RecoveryWindow {
    fn starting_at(now: Instant, length: Duration) -> Self {
        Self {
            start: now,
            end: now + length,
        }
    }
}

/// Owned handle of a recovery timer task. Dropping it cancels the task.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Take ownership of a spawned timer task.
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// True once the timer has no further scheduled invocation.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug)]
struct OfflineEntry {
    window: RecoveryWindow,
    started_at: SystemTime,
    timer: TimerHandle,
}

/// Read-only view of one tracked node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineSnapshot {
    /// Name of the offline node
    pub name: String,
    /// Current recovery window
    pub window: RecoveryWindow,
    /// Wall clock time the current window opened
    pub started_at: SystemTime,
    /// Whether the timer is still going to fire in this window
    pub active: bool,
}

/// Tracks offline nodes and their recovery timers.
#[derive(Debug, Default)]
pub struct HealthTracker {
    settings: RecoverySettings,
    entries: Mutex<HashMap<String, OfflineEntry>>,
}

impl HealthTracker {
    /// Create a tracker with the given recovery timing.
    pub fn new(settings: RecoverySettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Recovery timing of this tracker.
    pub fn settings(&self) -> RecoverySettings {
        self.settings
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OfflineEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking `name` with a fresh window; `spawn` builds the timer.
    ///
    /// Returns false, without touching the running window, when the node is
    /// already tracked.
    pub fn track(&self, name: &str, spawn: impl FnOnce(RecoveryWindow) -> TimerHandle) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(name) {
            return false;
        }

        let window = RecoveryWindow::starting_at(Instant::now(), self.settings.window);
        let entry = OfflineEntry {
            window,
            started_at: SystemTime::now(),
            timer: spawn(window),
        };
        entries.insert(name.to_string(), entry);
        true
    }

    /// Stop tracking `name`, cancelling its timer. Returns false if it was not tracked.
    pub fn release(&self, name: &str) -> bool {
        let removed = self.lock().remove(name);
        removed.is_some()
    }

    /// Whether `name` is currently being retried.
    pub fn is_tracked(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no node is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give every entry whose timer ran out a new window starting at `now`.
    ///
    /// Returns the names that were rescheduled.
    pub fn refresh_stale(
        &self,
        now: Instant,
        mut spawn: impl FnMut(&str, RecoveryWindow) -> TimerHandle,
    ) -> Vec<String> {
        let mut entries = self.lock();
        let mut refreshed = Vec::new();

        for (name, entry) in entries.iter_mut() {
            if !entry.timer.is_finished() {
                continue;
            }

            let window = RecoveryWindow::starting_at(now, self.settings.window);
            entry.window = window;
            entry.started_at = SystemTime::now();
            entry.timer = spawn(name, window);
            refreshed.push(name.clone());
        }

        refreshed
    }

    /// Snapshot of all tracked nodes, ordered by name.
    pub fn snapshot(&self) -> Vec<OfflineSnapshot> {
        let entries = self.lock();
        let mut snapshot: Vec<OfflineSnapshot> = entries
            .iter()
            .map(|(name, entry)| OfflineSnapshot {
                name: name.clone(),
                window: entry.window,
                started_at: entry.started_at,
                active: !entry.timer.is_finished(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }
}
