//! In-memory piece storage for simulation environments
//!
//! Holds the concatenated content of every file and cuts pieces out of it
//! on demand, so the simulated swarm serves real bytes.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use piecefs_core::torrent::{PieceIndex, TorrentLayout};

use crate::SimError;

/// Torrent content and layout held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryPieceStore {
    layout: TorrentLayout,
    content: Bytes,
}

impl InMemoryPieceStore {
    /// Builds a store from `(path, contents)` pairs laid out in order.
    ///
    /// # Errors
    /// - `SimError::Torrent` - Zero piece length or an empty path
    pub fn from_files<P: Into<String>>(
        piece_length: u32,
        files: impl IntoIterator<Item = (P, Vec<u8>)>,
    ) -> Result<Self, SimError> {
        let mut content = BytesMut::new();
        let mut entries = Vec::new();
        for (path, data) in files {
            entries.push((path.into(), data.len() as u64));
            content.extend_from_slice(&data);
        }

        let layout = TorrentLayout::new(piece_length, entries)?;
        Ok(Self {
            layout,
            content: content.freeze(),
        })
    }

    /// Builds a store from every regular file below `root`, in sorted path order.
    ///
    /// Paths in the layout are relative to `root` and use `/` separators.
    ///
    /// # Errors
    /// - `SimError::ContentDirectory` - `root` or a file below it cannot be read
    /// - `SimError::Torrent` - Zero piece length
    pub fn from_dir(root: &Path, piece_length: u32) -> Result<Self, SimError> {
        let mut paths = Vec::new();
        collect_files(root, &mut paths)?;
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let data = std::fs::read(&path).map_err(|source| SimError::ContentDirectory {
                path: path.clone(),
                source,
            })?;
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push((relative, data));
        }

        tracing::debug!("Loaded {} files from {}", files.len(), root.display());
        Self::from_files(piece_length, files)
    }

    pub fn layout(&self) -> &TorrentLayout {
        &self.layout
    }

    /// Bytes of one piece, or `None` past the last piece.
    pub fn piece_data(&self, piece: PieceIndex) -> Option<Bytes> {
        if piece.as_u32() >= self.layout.num_pieces() {
            return None;
        }
        let start = u64::from(piece.as_u32()) * u64::from(self.layout.piece_length());
        let start = start as usize;
        let end = start + self.layout.piece_size(piece) as usize;
        Some(self.content.slice(start..end))
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SimError> {
    let read_error = |source: std::io::Error| SimError::ContentDirectory {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
