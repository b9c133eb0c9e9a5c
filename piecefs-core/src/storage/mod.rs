//! Scratch storage for downloaded piece data.
//!
//! The layout inside the scratch directory belongs to the torrent engine.
//! This module only decides where it lives and makes sure it exists.

pub mod scratch;

use std::path::PathBuf;

pub use scratch::{ScratchDir, resolve_target_root};

/// Errors that occur while preparing storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The target root could not be created
    #[error("Failed to create target {path}: {source}")]
    TargetUnavailable {
        /// Directory that could not be created
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The per-run scratch directory could not be generated
    #[error("Failed to generate scratch directory under {root}: {source}")]
    ScratchUnavailable {
        /// Root the scratch directory was created in
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
