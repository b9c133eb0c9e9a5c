//! State shared between the dispatch thread and reader threads.
//!
//! One mutex guards everything; one condition variable is broadcast on every
//! change. Readers re-check their own predicate after each wake since a
//! broadcast only says that something changed, not what.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::namespace::Namespace;
use super::read::ReadTracker;
use super::window::{PieceWindow, WindowGeometry};
use crate::torrent::TorrentLayout;

/// Identifier of a registered read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadId(u64);

/// Counters exposed through `TorrentFs::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsStats {
    pub cursor: u32,
    pub pending_reads: usize,
    pub reads_completed: u64,
    /// Reads that had to block at least once before completing
    pub blocking_reads: u64,
    pub reads_interrupted: u64,
    pub pieces_delivered: u64,
    pub pieces_finished: u64,
}

/// Everything the mutex protects.
#[derive(Debug)]
pub struct SharedState {
    pub namespace: Namespace,
    /// Geometry captured when the namespace was built
    pub layout: Option<TorrentLayout>,
    pub window: PieceWindow,
    pub reads: BTreeMap<ReadId, ReadTracker>,
    /// Set once the dispatch loop has stopped; nothing will be delivered anymore
    pub closed: bool,
    pub stats: FsStats,
    next_read_id: u64,
}

impl SharedState {
    pub fn new(urgent_window_bytes: u64) -> Self {
        Self {
            namespace: Namespace::new(),
            layout: None,
            window: PieceWindow::new(urgent_window_bytes),
            reads: BTreeMap::new(),
            closed: false,
            stats: FsStats::default(),
            next_read_id: 0,
        }
    }

    pub fn geometry(&self) -> Option<WindowGeometry> {
        self.layout.as_ref().map(|layout| WindowGeometry {
            num_pieces: layout.num_pieces(),
            piece_length: layout.piece_length(),
        })
    }

    /// Adds a tracker to the pending-read set.
    pub fn register(&mut self, tracker: ReadTracker) -> ReadId {
        let id = ReadId(self.next_read_id);
        self.next_read_id += 1;
        self.reads.insert(id, tracker);
        id
    }

    /// Removes a tracker from the pending-read set, handing it back to its reader.
    pub fn unregister(&mut self, id: ReadId) -> Option<ReadTracker> {
        self.reads.remove(&id)
    }

    pub fn is_filled(&self, id: ReadId) -> bool {
        self.reads.get(&id).is_some_and(ReadTracker::is_filled)
    }

    pub fn snapshot(&self) -> FsStats {
        FsStats {
            cursor: self.window.cursor().as_u32(),
            pending_reads: self.reads.len(),
            ..self.stats
        }
    }
}

/// Mutex and condition variable pair guarding [`SharedState`].
#[derive(Debug)]
pub struct FsShared {
    state: Mutex<SharedState>,
    changed: Condvar,
}

impl FsShared {
    pub fn new(urgent_window_bytes: u64) -> Self {
        Self {
            state: Mutex::new(SharedState::new(urgent_window_bytes)),
            changed: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock()
    }

    /// Wakes every waiting reader.
    pub fn broadcast(&self) {
        self.changed.notify_all();
    }

    /// Releases the lock, sleeps until the next broadcast, then re-acquires it.
    pub fn wait(&self, guard: &mut MutexGuard<'_, SharedState>) {
        self.changed.wait(guard);
    }

    /// Like [`FsShared::wait`] but gives up at `deadline`; returns false on timeout.
    pub fn wait_until(&self, guard: &mut MutexGuard<'_, SharedState>, deadline: Instant) -> bool {
        !self.changed.wait_until(guard, deadline).timed_out()
    }

    /// Marks the state closed and wakes everyone so blocked reads can bail out.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.broadcast();
    }
}

/// Deadline helper that saturates instead of overflowing.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}
