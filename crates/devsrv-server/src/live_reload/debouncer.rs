//! Event debouncing for live reload.
//!
//! Collects filesystem events into batches. The first event of a batch opens
//! a window of the configured delay; everything recorded before the window
//! closes joins that batch, coalesced per path. A batch is therefore emitted
//! at most `delay` after any of its events happened.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Kind of filesystem event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FsEventKind {
    Created,
    Modified,
    Removed,
}

/// A debounced filesystem event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

/// Batching event debouncer, owned by a single watch task.
pub(crate) struct EventDebouncer {
    pending: HashMap<PathBuf, FsEventKind>,
    deadline: Option<Instant>,
    delay: Duration,
}

impl EventDebouncer {
    /// Create a new debouncer with the specified window length.
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            deadline: None,
            delay,
        }
    }

    /// Record an event into the current batch.
    pub fn record(&mut self, path: PathBuf, kind: FsEventKind) {
        self.record_at(path, kind, Instant::now());
    }

    fn record_at(&mut self, path: PathBuf, kind: FsEventKind, now: Instant) {
        self.deadline.get_or_insert(now + self.delay);

        match self.pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(kind);
            }
            Entry::Occupied(mut entry) => {
                if let Some(coalesced) = Self::coalesce(*entry.get(), kind) {
                    *entry.get_mut() = coalesced;
                } else {
                    entry.remove();
                }
            }
        }
    }

    /// Coalesce two event kinds.
    ///
    /// Returns `None` if both events should be discarded (Created + Removed).
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: FsEventKind, new: FsEventKind) -> Option<FsEventKind> {
        use FsEventKind::{Created, Modified, Removed};

        match (existing, new) {
            // Created + anything
            (Created, Created) => Some(Created),  // Duplicate
            (Created, Modified) => Some(Created), // Content included in create
            (Created, Removed) => None,           // File never existed for us

            // Modified + anything
            (Modified, Created) => Some(Created), // File was recreated
            (Modified, Modified) => Some(Modified), // Normal debounce
            (Modified, Removed) => Some(Removed), // File is gone

            // Removed + anything
            (Removed, Created) => Some(Modified), // File was replaced
            (Removed, Modified) => Some(Removed), // Invalid state, ignore new
            (Removed, Removed) => Some(Removed),  // Duplicate
        }
    }

    /// Take the current batch if its window has closed.
    ///
    /// Returns `None` while the window is open, when nothing was recorded, or
    /// when every event in the batch coalesced away. Events are sorted by path.
    pub fn drain_ready(&mut self) -> Option<Vec<FsEvent>> {
        self.drain_ready_at(Instant::now())
    }

    fn drain_ready_at(&mut self, now: Instant) -> Option<Vec<FsEvent>> {
        let deadline = self.deadline?;
        if deadline > now {
            return None;
        }
        self.deadline = None;

        let mut events: Vec<FsEvent> = self
            .pending
            .drain()
            .map(|(path, kind)| FsEvent { path, kind })
            .collect();
        if events.is_empty() {
            return None;
        }
        events.sort_by(|a, b| a.path.cmp(&b.path));
        Some(events)
    }

    /// Returns the instant the open window closes, for timer scheduling.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
