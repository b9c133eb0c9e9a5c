//! Event dispatch loop.
//!
//! A single dedicated thread drains the engine's notification channel and
//! applies each notification to the shared state. Engine threads never wait
//! on readers and readers never wait on engine threads; the only contact is
//! the brief critical sections in here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;

use super::TorrentFs;
use super::state::FsShared;
use crate::config::PiecefsConfig;
use crate::torrent::{
    EngineNotification, PieceIndex, PiecePriority, RateLimits, TorrentEngine,
};

/// Applies engine notifications to the shared state.
struct Dispatcher {
    shared: Arc<FsShared>,
    engine: Arc<dyn TorrentEngine>,
    rate_limits: RateLimits,
}

impl Dispatcher {
    fn handle(&self, notification: EngineNotification) {
        match notification {
            EngineNotification::PieceRead { piece, data } => self.on_piece_read(piece, &data),
            EngineNotification::PieceFinished { piece } => self.on_piece_finished(piece),
            EngineNotification::MetadataReceived => self.on_metadata(),
            EngineNotification::TorrentAdded { has_metadata: true } => self.on_metadata(),
            EngineNotification::TorrentAdded { has_metadata: false } => {
                tracing::info!("Torrent added, waiting for metadata from the swarm");
            }
            EngineNotification::MetadataFailed { reason } => {
                tracing::warn!("Metadata fetch failed, filesystem stays empty: {}", reason);
            }
            EngineNotification::Other { kind } => {
                tracing::trace!("Ignoring engine notification {}", kind);
            }
        }
    }

    fn on_piece_read(&self, piece: PieceIndex, data: &Bytes) {
        let mut state = self.shared.lock();
        let filled: usize = state
            .reads
            .values_mut()
            .map(|tracker| tracker.copy(piece, data))
            .sum();
        state.stats.pieces_delivered += 1;
        drop(state);

        tracing::debug!("Piece {} read ({} bytes), filled {} parts", piece, data.len(), filled);
        self.shared.broadcast();
    }

    fn on_piece_finished(&self, piece: PieceIndex) {
        let mut state = self.shared.lock();
        let engine = &*self.engine;

        let filled: usize = state
            .reads
            .values_mut()
            .map(|tracker| tracker.trigger(engine))
            .sum();

        if let Some(geometry) = state.geometry() {
            state.window.advance(engine, geometry);
        }
        state.stats.pieces_finished += 1;
        let cursor = state.window.cursor();
        drop(state);

        tracing::debug!("Piece {} finished, window cursor at {}", piece, cursor);
        if filled > 0 {
            self.shared.broadcast();
        }
    }

    fn on_metadata(&self) {
        let mut state = self.shared.lock();
        if state.namespace.is_built() {
            tracing::debug!("Metadata already applied, ignoring repeat notification");
            return;
        }

        let Some(layout) = self.engine.layout() else {
            tracing::warn!("Metadata notification arrived but the engine has no layout");
            return;
        };

        tracing::info!(
            "Got metadata: {} files, {} pieces of {} bytes",
            layout.file_count(),
            layout.num_pieces(),
            layout.piece_length()
        );

        self.engine.set_rate_limits(self.rate_limits);
        // Nothing downloads until a read opens a window
        for file_index in 0..layout.file_count() {
            self.engine.set_file_priority(file_index, PiecePriority::DontDownload);
        }
        for piece in 0..layout.num_pieces() {
            self.engine
                .set_piece_priority(PieceIndex::new(piece), PiecePriority::DontDownload);
        }

        state.namespace.build(&layout);
        state.layout = Some(layout);
        drop(state);

        self.shared.broadcast();
    }
}

/// Handle owning the dispatch thread.
///
/// Dropping the handle stops the loop and joins the thread.
#[derive(Debug)]
pub struct DispatcherHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    shared: Arc<FsShared>,
}

impl DispatcherHandle {
    /// Whether the dispatch thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Stops the loop, waits for the thread and wakes blocked readers.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Dispatch thread panicked");
            }
        }
        self.shared.close();
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Spawns the dispatch thread for `fs`, consuming the engine's notifications.
///
/// # Errors
///
/// - `std::io::Error` - If the thread cannot be spawned
pub fn spawn_dispatcher(
    fs: &TorrentFs,
    notifications: Receiver<EngineNotification>,
    config: &PiecefsConfig,
) -> std::io::Result<DispatcherHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let dispatcher = Dispatcher {
        shared: Arc::clone(&fs.shared),
        engine: Arc::clone(&fs.engine),
        rate_limits: config.network.rate_limits(),
    };
    let poll_interval = config.dispatch.poll_interval;

    let thread = {
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name(config.dispatch.thread_name.to_string())
            .spawn(move || run_dispatch_loop(dispatcher, notifications, &stop, poll_interval))?
    };

    Ok(DispatcherHandle {
        stop,
        thread: Some(thread),
        shared: Arc::clone(&fs.shared),
    })
}

fn run_dispatch_loop(
    dispatcher: Dispatcher,
    notifications: Receiver<EngineNotification>,
    stop: &AtomicBool,
    poll_interval: Duration,
) {
    tracing::debug!("Dispatch loop started");

    while !stop.load(Ordering::SeqCst) {
        match notifications.recv_timeout(poll_interval) {
            Ok(notification) => {
                tracing::trace!("Dispatching {}", notification.kind());
                dispatcher.handle(notification);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("Engine notification channel closed");
                break;
            }
        }
    }

    dispatcher.shared.close();
    tracing::debug!("Dispatch loop stopped");
}
