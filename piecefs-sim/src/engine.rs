//! Simulated torrent engine.
//!
//! A worker thread advances the swarm in fixed ticks. Each tick it may
//! deliver pending metadata, complete the highest-priority missing pieces
//! within the byte budget the rate limit allows, and answer queued piece
//! reads. Notifications are sent after the state lock is released.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use piecefs_core::torrent::{
    AddTorrentParams, EngineNotification, PieceIndex, PiecePriority, RateLimits, SessionSettings,
    TorrentEngine, TorrentError, TorrentLayout,
};

use crate::config::SimConfig;
use crate::piece_store::InMemoryPieceStore;
use crate::rng::DeterministicRng;

const DEFAULT_CACHE_PIECES: NonZeroUsize = NonZeroUsize::MIN;

/// Counters describing what the simulated swarm has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub pieces_downloaded: u64,
    pub bytes_downloaded: u64,
    pub reads_served: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataState {
    /// No torrent added yet
    Idle,
    Pending { ready_at: Instant },
    Known,
    Failed,
}

#[derive(Debug)]
struct SwarmState {
    metadata: MetadataState,
    added: bool,
    have: Vec<bool>,
    priorities: Vec<PiecePriority>,
    file_priorities: Vec<PiecePriority>,
    read_queue: VecDeque<PieceIndex>,
    limits: RateLimits,
    settings: SessionSettings,
    rng: DeterministicRng,
    cache: LruCache<PieceIndex, Bytes>,
    /// Bytes that may still be downloaded before the next refill
    budget: f64,
    last_tick: Instant,
    stats: SimStats,
}

impl SwarmState {
    fn new(config: &SimConfig, layout: Option<&TorrentLayout>) -> Self {
        let num_pieces = layout.map_or(0, TorrentLayout::num_pieces) as usize;
        let file_count = layout.map_or(0, TorrentLayout::file_count);
        let capacity = NonZeroUsize::new(config.cache_pieces).unwrap_or(DEFAULT_CACHE_PIECES);

        Self {
            metadata: MetadataState::Idle,
            added: false,
            have: vec![false; num_pieces],
            priorities: vec![PiecePriority::DontDownload; num_pieces],
            file_priorities: vec![PiecePriority::Normal; file_count],
            read_queue: VecDeque::new(),
            limits: RateLimits::default(),
            settings: SessionSettings::default(),
            rng: DeterministicRng::from_seed(config.seed),
            cache: LruCache::new(capacity),
            budget: 0.0,
            last_tick: Instant::now(),
            stats: SimStats::default(),
        }
    }

    fn have(&self, piece: PieceIndex) -> bool {
        self.have.get(piece.as_u32() as usize).copied().unwrap_or(false)
    }

    /// Effective download rate: the slower of the swarm and the engine limit.
    fn download_rate(&self, config: &SimConfig) -> Option<u64> {
        match (config.download_rate_bps, self.limits.download) {
            (Some(swarm), Some(limit)) => Some(swarm.min(limit)),
            (swarm, limit) => swarm.or(limit),
        }
    }

    /// Missing wanted pieces sharing the highest priority.
    fn best_candidates(&self) -> Vec<PieceIndex> {
        let mut best = PiecePriority::DontDownload;
        let mut candidates = Vec::new();
        for (index, priority) in self.priorities.iter().enumerate() {
            if !priority.is_wanted() || self.have[index] {
                continue;
            }
            if *priority > best {
                best = *priority;
                candidates.clear();
            }
            if *priority == best {
                candidates.push(PieceIndex::new(index as u32));
            }
        }
        candidates
    }
}

struct Inner {
    config: SimConfig,
    store: Option<InMemoryPieceStore>,
    state: Mutex<SwarmState>,
    notifier: Sender<EngineNotification>,
    stop: AtomicBool,
}

impl Inner {
    fn notify_all(&self, notifications: Vec<EngineNotification>) {
        for notification in notifications {
            if self.notifier.send(notification).is_err() {
                tracing::debug!("Notification receiver dropped");
                return;
            }
        }
    }

    fn step(&self) {
        let mut out = Vec::new();
        {
            let mut state = self.state.lock();
            let now = Instant::now();
            self.advance_metadata(&mut state, now, &mut out);
            if state.metadata == MetadataState::Known {
                self.download(&mut state, now, &mut out);
                self.serve_reads(&mut state, &mut out);
            }
            state.last_tick = now;
        }
        self.notify_all(out);
    }

    fn advance_metadata(&self, state: &mut SwarmState, now: Instant, out: &mut Vec<EngineNotification>) {
        let MetadataState::Pending { ready_at } = state.metadata else {
            return;
        };
        if now < ready_at {
            return;
        }

        if self.store.is_some() {
            tracing::info!("Simulated swarm delivered metadata");
            state.metadata = MetadataState::Known;
            out.push(EngineNotification::MetadataReceived);
        } else {
            tracing::warn!("Simulated swarm has no content to describe");
            state.metadata = MetadataState::Failed;
            out.push(EngineNotification::MetadataFailed {
                reason: "no peer could supply metadata".to_string(),
            });
        }
    }

    fn download(&self, state: &mut SwarmState, now: Instant, out: &mut Vec<EngineNotification>) {
        let Some(store) = &self.store else {
            return;
        };
        let layout = store.layout();

        let rate = state.download_rate(&self.config);
        if let Some(rate) = rate {
            let elapsed = now.duration_since(state.last_tick).as_secs_f64();
            state.budget += rate as f64 * elapsed;
        }

        for _ in 0..self.config.max_pieces_per_tick {
            let candidates = state.best_candidates();
            let Some(&piece) = state.rng.choose(&candidates) else {
                // Idle swarms do not bank bandwidth
                state.budget = 0.0;
                break;
            };

            let size = layout.piece_size(piece);
            if rate.is_some() {
                if state.budget < f64::from(size) {
                    break;
                }
                state.budget -= f64::from(size);
            }

            state.have[piece.as_u32() as usize] = true;
            state.stats.pieces_downloaded += 1;
            state.stats.bytes_downloaded += u64::from(size);
            tracing::trace!("Downloaded piece {} at {}", piece, state.priorities[piece.as_u32() as usize]);
            out.push(EngineNotification::PieceFinished { piece });
        }
    }

    fn serve_reads(&self, state: &mut SwarmState, out: &mut Vec<EngineNotification>) {
        let Some(store) = &self.store else {
            return;
        };
        while let Some(piece) = state.read_queue.pop_front() {
            let Some(data) = store.piece_data(piece) else {
                continue;
            };
            state.cache.put(piece, data.clone());
            state.stats.reads_served += 1;
            out.push(EngineNotification::PieceRead { piece, data });
        }
    }
}

/// Torrent engine backed by an in-memory swarm.
///
/// Every piece starts unwanted, so nothing downloads until a priority is
/// raised. Dropping the engine stops its worker thread.
pub struct SimulatedEngine {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedEngine {
    /// Creates the engine and starts its worker thread.
    ///
    /// With `store` set to `None` the swarm never has content: magnet links
    /// end in `MetadataFailed` and torrent files are refused.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - If the worker thread cannot be spawned
    pub fn spawn(
        store: Option<InMemoryPieceStore>,
        config: SimConfig,
    ) -> std::io::Result<(Arc<Self>, Receiver<EngineNotification>)> {
        let (notifier, notifications) = mpsc::channel();
        let state = SwarmState::new(&config, store.as_ref().map(InMemoryPieceStore::layout));
        let inner = Arc::new(Inner {
            config,
            store,
            state: Mutex::new(state),
            notifier,
            stop: AtomicBool::new(false),
        });

        let worker = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("piecefs-sim".to_string())
                .spawn(move || run_swarm(&inner))?
        };

        let engine = Self {
            inner,
            worker: Mutex::new(Some(worker)),
        };
        Ok((Arc::new(engine), notifications))
    }

    pub fn stats(&self) -> SimStats {
        self.inner.state.lock().stats
    }

    pub fn file_priority(&self, file_index: usize) -> Option<PiecePriority> {
        self.inner.state.lock().file_priorities.get(file_index).copied()
    }

    pub fn rate_limits(&self) -> RateLimits {
        self.inner.state.lock().limits
    }

    pub fn settings(&self) -> SessionSettings {
        self.inner.state.lock().settings
    }

    /// Stops the worker thread. Idempotent.
    pub fn shutdown(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("Simulation worker panicked");
            }
        }
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedEngine")
            .field("seed", &self.inner.config.seed)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl TorrentEngine for SimulatedEngine {
    fn add_torrent(&self, params: AddTorrentParams) -> Result<(), TorrentError> {
        if self.inner.stop.load(Ordering::SeqCst) {
            return Err(TorrentError::EngineShutdown);
        }

        let has_metadata = params.source.has_metadata();
        if has_metadata && self.inner.store.is_none() {
            return Err(TorrentError::InvalidLayout {
                reason: "simulated swarm has no content".to_string(),
            });
        }

        {
            let mut state = self.inner.state.lock();
            if state.added {
                return Err(TorrentError::DuplicateTorrent);
            }
            state.added = true;
            state.settings = params.settings;
            state.metadata = if has_metadata {
                MetadataState::Known
            } else {
                MetadataState::Pending {
                    ready_at: Instant::now() + self.inner.config.metadata_delay,
                }
            };
        }

        tracing::debug!("Simulated torrent saving to {}", params.save_path.display());
        self.inner
            .notify_all(vec![EngineNotification::TorrentAdded { has_metadata }]);
        Ok(())
    }

    fn apply_settings(&self, settings: SessionSettings) {
        self.inner.state.lock().settings = settings;
    }

    fn layout(&self) -> Option<TorrentLayout> {
        let state = self.inner.state.lock();
        if state.metadata != MetadataState::Known {
            return None;
        }
        self.inner.store.as_ref().map(|store| store.layout().clone())
    }

    fn have_piece(&self, piece: PieceIndex) -> bool {
        self.inner.state.lock().have(piece)
    }

    fn set_piece_priority(&self, piece: PieceIndex, priority: PiecePriority) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.priorities.get_mut(piece.as_u32() as usize) {
            *slot = priority;
        }
    }

    fn set_file_priority(&self, file_index: usize, priority: PiecePriority) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.file_priorities.get_mut(file_index) {
            *slot = priority;
        }
    }

    fn request_piece_read(&self, piece: PieceIndex) {
        let mut state = self.inner.state.lock();
        if !state.have(piece) {
            tracing::debug!("Read requested for missing piece {}", piece);
            return;
        }
        if !state.read_queue.contains(&piece) {
            state.read_queue.push_back(piece);
        }
    }

    fn set_rate_limits(&self, limits: RateLimits) {
        self.inner.state.lock().limits = limits;
    }

    fn cached_piece(&self, piece: PieceIndex) -> Option<Bytes> {
        self.inner.state.lock().cache.get(&piece).cloned()
    }
}

fn run_swarm(inner: &Inner) {
    tracing::debug!("Simulated swarm started with seed {}", inner.config.seed);
    while !inner.stop.load(Ordering::SeqCst) {
        inner.step();
        thread::sleep(inner.config.tick);
    }
    tracing::debug!("Simulated swarm stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use piecefs_core::torrent::MetadataSource;

    use super::*;

    fn store() -> InMemoryPieceStore {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        InMemoryPieceStore::from_files(1024, [("video.bin", data)]).unwrap()
    }

    fn magnet_params() -> AddTorrentParams {
        AddTorrentParams {
            source: MetadataSource::resolve(
                "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567",
            )
            .unwrap(),
            save_path: std::env::temp_dir(),
            settings: SessionSettings::default(),
        }
    }

    fn next_matching(
        notifications: &Receiver<EngineNotification>,
        matches: impl Fn(&EngineNotification) -> bool,
    ) -> EngineNotification {
        loop {
            let notification = notifications
                .recv_timeout(Duration::from_secs(5))
                .expect("timed out waiting for notification");
            if matches(&notification) {
                return notification;
            }
        }
    }

    #[test]
    fn test_magnet_metadata_arrives_after_delay() {
        let (engine, notifications) = SimulatedEngine::spawn(Some(store()), SimConfig::instant()).unwrap();
        assert!(engine.layout().is_none());

        engine.add_torrent(magnet_params()).unwrap();

        let added = next_matching(&notifications, |_| true);
        assert!(matches!(added, EngineNotification::TorrentAdded { has_metadata: false }));
        next_matching(&notifications, |n| matches!(n, EngineNotification::MetadataReceived));
        assert_eq!(engine.layout().unwrap().num_pieces(), 10);
    }

    #[test]
    fn test_empty_swarm_fails_metadata() {
        let (engine, notifications) = SimulatedEngine::spawn(None, SimConfig::instant()).unwrap();

        engine.add_torrent(magnet_params()).unwrap();

        let failed = next_matching(&notifications, |n| {
            matches!(n, EngineNotification::MetadataFailed { .. })
        });
        assert!(matches!(failed, EngineNotification::MetadataFailed { .. }));
        assert!(engine.layout().is_none());
    }

    #[test]
    fn test_duplicate_add_is_refused() {
        let (engine, _notifications) = SimulatedEngine::spawn(Some(store()), SimConfig::instant()).unwrap();
        engine.add_torrent(magnet_params()).unwrap();
        assert!(matches!(
            engine.add_torrent(magnet_params()),
            Err(TorrentError::DuplicateTorrent)
        ));
    }

    #[test]
    fn test_add_after_shutdown_is_refused() {
        let (engine, notifications) = SimulatedEngine::spawn(Some(store()), SimConfig::instant()).unwrap();
        engine.shutdown();

        assert!(matches!(
            engine.add_torrent(magnet_params()),
            Err(TorrentError::EngineShutdown)
        ));
        assert!(notifications.try_recv().is_err());
        assert!(engine.layout().is_none());
    }

    #[test]
    fn test_only_wanted_pieces_download() {
        let (engine, notifications) = SimulatedEngine::spawn(Some(store()), SimConfig::instant()).unwrap();
        engine.set_piece_priority(PieceIndex::new(7), PiecePriority::Urgent);
        engine.add_torrent(magnet_params()).unwrap();

        let finished = next_matching(&notifications, |n| {
            matches!(n, EngineNotification::PieceFinished { .. })
        });
        assert!(matches!(
            finished,
            EngineNotification::PieceFinished { piece } if piece == PieceIndex::new(7)
        ));

        thread::sleep(Duration::from_millis(20));
        assert!(engine.have_piece(PieceIndex::new(7)));
        assert!(!engine.have_piece(PieceIndex::new(0)));
        assert_eq!(engine.stats().pieces_downloaded, 1);
    }

    #[test]
    fn test_urgent_pieces_come_before_normal() {
        let (engine, notifications) = SimulatedEngine::spawn(Some(store()), SimConfig::instant()).unwrap();
        for piece in 0..10 {
            engine.set_piece_priority(PieceIndex::new(piece), PiecePriority::Normal);
        }
        engine.set_piece_priority(PieceIndex::new(4), PiecePriority::Urgent);
        engine.set_piece_priority(PieceIndex::new(5), PiecePriority::Urgent);
        engine.add_torrent(magnet_params()).unwrap();

        let mut order = Vec::new();
        while order.len() < 10 {
            if let EngineNotification::PieceFinished { piece } =
                next_matching(&notifications, |n| matches!(n, EngineNotification::PieceFinished { .. }))
            {
                order.push(piece.as_u32());
            }
        }

        let mut first_two = order[..2].to_vec();
        first_two.sort_unstable();
        assert_eq!(first_two, vec![4, 5]);
    }

    #[test]
    fn test_reads_are_served_and_cached() {
        let (engine, notifications) = SimulatedEngine::spawn(Some(store()), SimConfig::instant()).unwrap();
        engine.set_piece_priority(PieceIndex::new(2), PiecePriority::Urgent);
        engine.add_torrent(magnet_params()).unwrap();
        next_matching(&notifications, |n| {
            matches!(n, EngineNotification::PieceFinished { piece } if *piece == PieceIndex::new(2))
        });
        assert!(engine.cached_piece(PieceIndex::new(2)).is_none());

        engine.request_piece_read(PieceIndex::new(2));
        let read = next_matching(&notifications, |n| matches!(n, EngineNotification::PieceRead { .. }));

        let EngineNotification::PieceRead { piece, data } = read else {
            unreachable!();
        };
        assert_eq!(piece, PieceIndex::new(2));
        assert_eq!(data.len(), 1024);
        assert_eq!(data[0], (2048 % 251) as u8);
        assert_eq!(engine.cached_piece(PieceIndex::new(2)), Some(data));
    }

    #[test]
    fn test_rate_limit_slows_download() {
        let config = SimConfig {
            download_rate_bps: None,
            tick: Duration::from_millis(5),
            metadata_delay: Duration::from_millis(1),
            ..SimConfig::default()
        };
        let (engine, _notifications) = SimulatedEngine::spawn(Some(store()), config).unwrap();
        for piece in 0..10 {
            engine.set_piece_priority(PieceIndex::new(piece), PiecePriority::Normal);
        }
        engine.set_rate_limits(RateLimits {
            download: Some(10_240),
            upload: None,
        });
        engine.add_torrent(magnet_params()).unwrap();

        thread::sleep(Duration::from_millis(250));
        let downloaded = engine.stats().pieces_downloaded;
        assert!(downloaded >= 1, "nothing downloaded");
        assert!(downloaded < 10, "rate limit ignored: {downloaded} pieces");
    }

    #[test]
    fn test_same_seed_same_download_order() {
        fn order(seed: u64) -> Vec<u32> {
            let config = SimConfig {
                seed,
                ..SimConfig::instant()
            };
            let (engine, notifications) = SimulatedEngine::spawn(Some(store()), config).unwrap();
            for piece in 0..10 {
                engine.set_piece_priority(PieceIndex::new(piece), PiecePriority::Normal);
            }
            engine.add_torrent(magnet_params()).unwrap();
            let mut order = Vec::new();
            while order.len() < 10 {
                if let EngineNotification::PieceFinished { piece } = next_matching(&notifications, |n| {
                    matches!(n, EngineNotification::PieceFinished { .. })
                }) {
                    order.push(piece.as_u32());
                }
            }
            order
        }

        assert_eq!(order(99), order(99));
    }
}
