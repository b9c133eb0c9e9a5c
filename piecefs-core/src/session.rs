//! Startup and teardown of a mounted torrent.

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use crate::config::PiecefsConfig;
use crate::fs::{DispatcherHandle, TorrentFs, spawn_dispatcher};
use crate::storage::ScratchDir;
use crate::torrent::{AddTorrentParams, EngineNotification, MetadataSource, TorrentEngine};
use crate::{PiecefsError, Result};

/// A running torrent filesystem: scratch storage, dispatch thread and the
/// filesystem view bindings call into.
#[derive(Debug)]
pub struct Session {
    fs: TorrentFs,
    dispatcher: DispatcherHandle,
    scratch: ScratchDir,
}

impl Session {
    /// Prepares scratch storage, starts the dispatch loop and adds the torrent.
    ///
    /// The dispatch loop is running before the torrent is added, so no
    /// notification the engine emits while adding can be missed.
    ///
    /// # Errors
    ///
    /// - `PiecefsError::Configuration` - If the scratch directory cannot be prepared
    /// - `PiecefsError::Io` - If the dispatch thread cannot be spawned
    /// - `PiecefsError::Torrent` - If the engine refuses the torrent
    pub fn start(
        engine: Arc<dyn TorrentEngine>,
        notifications: Receiver<EngineNotification>,
        source: MetadataSource,
        config: &PiecefsConfig,
    ) -> Result<Self> {
        let scratch = ScratchDir::create(&config.storage).map_err(|e| {
            PiecefsError::Configuration {
                reason: e.to_string(),
            }
        })?;

        let fs = TorrentFs::new(Arc::clone(&engine), config);
        let dispatcher = spawn_dispatcher(&fs, notifications, config)?;

        let settings = config.network.session;
        engine.apply_settings(settings);
        engine.add_torrent(AddTorrentParams {
            source,
            save_path: scratch.path().to_path_buf(),
            settings,
        })?;

        tracing::info!("Session started, pieces saved under {}", scratch.path().display());

        Ok(Self {
            fs,
            dispatcher,
            scratch,
        })
    }

    pub fn fs(&self) -> &TorrentFs {
        &self.fs
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Stops the dispatch loop, releases blocked reads and removes scratch storage.
    ///
    /// # Errors
    ///
    /// - `PiecefsError::Storage` - If the scratch directory cannot be removed
    pub fn shutdown(self) -> Result<()> {
        let Self {
            fs,
            dispatcher,
            scratch,
        } = self;

        dispatcher.shutdown();
        tracing::info!("Session stopped: {:?}", fs.stats());
        scratch.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_mocks::MockEngine;
    use crate::torrent::{PieceIndex, PiecePriority, TorrentLayout};

    fn config(target: &Path) -> PiecefsConfig {
        let mut config = PiecefsConfig::for_testing();
        config.storage.target_root = Some(target.to_path_buf());
        config
    }

    fn magnet() -> MetadataSource {
        MetadataSource::resolve("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567")
            .unwrap()
    }

    #[test]
    fn test_start_adds_torrent_into_scratch_dir() {
        let target = tempfile::tempdir().unwrap();
        let layout = TorrentLayout::new(1024, [("a.txt", 10u64)]).unwrap();
        let (engine, notifications) = MockEngine::with_layout(layout);

        let session = Session::start(engine.clone(), notifications, magnet(), &config(target.path()))
            .unwrap();

        let scratch = session.scratch_path().to_path_buf();
        assert!(scratch.starts_with(target.path().canonicalize().unwrap()));
        assert!(scratch.is_dir());

        let added = engine.added_torrent().unwrap();
        assert_eq!(added.save_path, scratch);
        assert!(engine.settings().unwrap().announce_to_all_trackers);

        assert!(session.fs().wait_ready(Duration::from_secs(5)));
        assert_eq!(engine.priority(PieceIndex::new(0)), PiecePriority::DontDownload);

        session.shutdown().unwrap();
        assert!(!scratch.exists());
    }

    #[test]
    fn test_start_without_metadata_waits_for_swarm() {
        let target = tempfile::tempdir().unwrap();
        let (engine, notifications) = MockEngine::new();

        let session = Session::start(engine.clone(), notifications, magnet(), &config(target.path()))
            .unwrap();
        assert!(!session.fs().wait_ready(Duration::from_millis(30)));

        engine.set_layout(TorrentLayout::new(1024, [("late.bin", 4096u64)]).unwrap());
        engine.notify(EngineNotification::MetadataReceived);
        assert!(session.fs().wait_ready(Duration::from_secs(5)));

        session.shutdown().unwrap();
    }

    #[test]
    fn test_engine_refusal_is_reported() {
        let target = tempfile::tempdir().unwrap();
        let (engine, notifications) = MockEngine::new();
        engine
            .add_torrent(AddTorrentParams {
                source: magnet(),
                save_path: target.path().to_path_buf(),
                settings: Default::default(),
            })
            .unwrap();

        let result = Session::start(engine, notifications, magnet(), &config(target.path()));
        assert!(matches!(result, Err(PiecefsError::Torrent(_))));
    }
}
