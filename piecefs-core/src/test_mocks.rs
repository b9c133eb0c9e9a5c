//! Scriptable torrent engine for tests.
//!
//! Records every priority change and read request, and lets tests emit
//! notifications by hand. Piece content follows a fixed byte pattern so
//! reads can be checked without storing the expected data anywhere.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::torrent::{
    AddTorrentParams, EngineNotification, PieceIndex, PiecePriority, RateLimits, SessionSettings,
    TorrentEngine, TorrentError, TorrentLayout,
};

/// Byte stored at `offset` within the concatenated torrent content.
pub fn content_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// Expected content of `length` bytes starting at absolute `offset`.
pub fn content_range(offset: u64, length: usize) -> Vec<u8> {
    (offset..offset + length as u64).map(content_byte).collect()
}

#[derive(Debug, Default)]
struct MockState {
    layout: Option<TorrentLayout>,
    have: HashSet<PieceIndex>,
    priorities: HashMap<PieceIndex, PiecePriority>,
    priority_writes: Vec<(PieceIndex, PiecePriority)>,
    file_priorities: HashMap<usize, PiecePriority>,
    read_requests: Vec<PieceIndex>,
    rate_limits: Option<RateLimits>,
    settings: Option<SessionSettings>,
    added: Option<AddTorrentParams>,
    cache_enabled: bool,
    serve_reads: bool,
}

/// Mock engine driven entirely by the test.
#[derive(Debug)]
pub struct MockEngine {
    state: Mutex<MockState>,
    notifier: Sender<EngineNotification>,
}

impl MockEngine {
    /// Creates an engine that has no metadata yet.
    pub fn new() -> (Arc<Self>, Receiver<EngineNotification>) {
        let (notifier, notifications) = mpsc::channel();
        let engine = Self {
            state: Mutex::new(MockState::default()),
            notifier,
        };
        (Arc::new(engine), notifications)
    }

    /// Creates an engine that already knows `layout`.
    pub fn with_layout(layout: TorrentLayout) -> (Arc<Self>, Receiver<EngineNotification>) {
        let (engine, notifications) = Self::new();
        engine.set_layout(layout);
        (engine, notifications)
    }

    pub fn set_layout(&self, layout: TorrentLayout) {
        self.state.lock().layout = Some(layout);
    }

    /// Marks a piece downloaded without emitting anything.
    pub fn mark_have(&self, piece: PieceIndex) {
        self.state.lock().have.insert(piece);
    }

    /// Lets `cached_piece` answer for downloaded pieces.
    pub fn enable_cache(&self) {
        self.state.lock().cache_enabled = true;
    }

    /// Answers `request_piece_read` for downloaded pieces straight away.
    pub fn serve_reads(&self) {
        self.state.lock().serve_reads = true;
    }

    pub fn priority(&self, piece: PieceIndex) -> PiecePriority {
        self.state
            .lock()
            .priorities
            .get(&piece)
            .copied()
            .unwrap_or_default()
    }

    /// Every `set_piece_priority` call, in order.
    pub fn priority_writes(&self) -> Vec<(PieceIndex, PiecePriority)> {
        self.state.lock().priority_writes.clone()
    }

    pub fn file_priority(&self, file_index: usize) -> Option<PiecePriority> {
        self.state.lock().file_priorities.get(&file_index).copied()
    }

    pub fn read_requests(&self) -> Vec<PieceIndex> {
        self.state.lock().read_requests.clone()
    }

    pub fn rate_limits(&self) -> Option<RateLimits> {
        self.state.lock().rate_limits
    }

    pub fn settings(&self) -> Option<SessionSettings> {
        self.state.lock().settings
    }

    pub fn added_torrent(&self) -> Option<AddTorrentParams> {
        self.state.lock().added.clone()
    }

    /// Sends a notification as if the engine emitted it.
    pub fn notify(&self, notification: EngineNotification) {
        let _ = self.notifier.send(notification);
    }

    /// Bytes of a piece according to the content pattern.
    ///
    /// # Panics
    ///
    /// Panics if no layout has been set.
    pub fn piece_data(&self, piece: PieceIndex) -> Bytes {
        let state = self.state.lock();
        let layout = state.layout.as_ref().expect("mock engine has no layout");
        let start = u64::from(piece.as_u32()) * u64::from(layout.piece_length());
        Bytes::from(content_range(start, layout.piece_size(piece) as usize))
    }

    /// Marks a piece downloaded and emits `PieceFinished`.
    pub fn finish_piece(&self, piece: PieceIndex) {
        self.mark_have(piece);
        self.notify(EngineNotification::PieceFinished { piece });
    }

    /// Emits `PieceRead` with the piece's pattern bytes.
    pub fn deliver_piece(&self, piece: PieceIndex) {
        let data = self.piece_data(piece);
        self.notify(EngineNotification::PieceRead { piece, data });
    }
}

impl TorrentEngine for MockEngine {
    fn add_torrent(&self, params: AddTorrentParams) -> Result<(), TorrentError> {
        let has_metadata = {
            let mut state = self.state.lock();
            if state.added.is_some() {
                return Err(TorrentError::DuplicateTorrent);
            }
            state.added = Some(params);
            state.layout.is_some()
        };
        self.notify(EngineNotification::TorrentAdded { has_metadata });
        Ok(())
    }

    fn apply_settings(&self, settings: SessionSettings) {
        self.state.lock().settings = Some(settings);
    }

    fn layout(&self) -> Option<TorrentLayout> {
        self.state.lock().layout.clone()
    }

    fn have_piece(&self, piece: PieceIndex) -> bool {
        self.state.lock().have.contains(&piece)
    }

    fn set_piece_priority(&self, piece: PieceIndex, priority: PiecePriority) {
        let mut state = self.state.lock();
        state.priorities.insert(piece, priority);
        state.priority_writes.push((piece, priority));
    }

    fn set_file_priority(&self, file_index: usize, priority: PiecePriority) {
        self.state.lock().file_priorities.insert(file_index, priority);
    }

    fn request_piece_read(&self, piece: PieceIndex) {
        let serve = {
            let mut state = self.state.lock();
            state.read_requests.push(piece);
            state.serve_reads && state.have.contains(&piece)
        };
        if serve {
            self.deliver_piece(piece);
        }
    }

    fn set_rate_limits(&self, limits: RateLimits) {
        self.state.lock().rate_limits = Some(limits);
    }

    fn cached_piece(&self, piece: PieceIndex) -> Option<Bytes> {
        let cached = {
            let state = self.state.lock();
            state.cache_enabled && state.have.contains(&piece)
        };
        cached.then(|| self.piece_data(piece))
    }
}
