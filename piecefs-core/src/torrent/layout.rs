//! Piece and file geometry of a torrent once its metadata is known.

use super::{PieceIndex, TorrentError};

/// Single file inside the torrent content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path with `/` separated components, as listed in the metadata.
    pub path: String,
    /// File length in bytes.
    pub size: u64,
    /// Byte offset of the file's first byte within the concatenated content.
    pub offset: u64,
}

/// Location of a file byte range inside the piece space.
///
/// `length` is the requested length, not yet clamped to the piece boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceSlice {
    pub piece: PieceIndex,
    pub start: u32,
    pub length: u64,
}

/// Piece length, piece count and file list of a torrent.
///
/// Files are laid out back to back in listing order, and the content is cut
/// into `piece_length` chunks. Only the final piece may be shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentLayout {
    piece_length: u32,
    total_length: u64,
    files: Vec<FileInfo>,
}

impl TorrentLayout {
    /// Builds the layout from a piece length and `(path, size)` pairs.
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidLayout` - If piece length is zero or a path is empty
    pub fn new<P: Into<String>>(
        piece_length: u32,
        files: impl IntoIterator<Item = (P, u64)>,
    ) -> Result<Self, TorrentError> {
        if piece_length == 0 {
            return Err(TorrentError::InvalidLayout {
                reason: "piece length must be non-zero".to_string(),
            });
        }

        let mut offset = 0u64;
        let mut entries = Vec::new();
        for (path, size) in files {
            let path = path.into();
            if path.trim_matches('/').is_empty() {
                return Err(TorrentError::InvalidLayout {
                    reason: format!("file {} has an empty path", entries.len()),
                });
            }
            entries.push(FileInfo { path, size, offset });
            offset += size;
        }

        Ok(Self {
            piece_length,
            total_length: offset,
            files: entries,
        })
    }

    /// Nominal size of every piece except possibly the last.
    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    /// Total number of pieces covering the content.
    pub fn num_pieces(&self) -> u32 {
        self.total_length.div_ceil(u64::from(self.piece_length)) as u32
    }

    /// Total content length in bytes.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn file_at(&self, index: usize) -> Option<&FileInfo> {
        self.files.get(index)
    }

    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    /// Actual size of a piece; the final piece holds whatever remains.
    pub fn piece_size(&self, piece: PieceIndex) -> u32 {
        let piece_start = u64::from(piece.as_u32()) * u64::from(self.piece_length);
        let remaining = self.total_length.saturating_sub(piece_start);
        remaining.min(u64::from(self.piece_length)) as u32
    }

    /// Maps a byte range of one file onto the piece containing its first byte.
    ///
    /// Returns `None` for an unknown file index.
    pub fn map_file_range(&self, file_index: usize, offset: u64, length: u64) -> Option<PieceSlice> {
        let file = self.files.get(file_index)?;
        let absolute = file.offset + offset;
        let piece_length = u64::from(self.piece_length);

        Some(PieceSlice {
            piece: PieceIndex::new((absolute / piece_length) as u32),
            start: (absolute % piece_length) as u32,
            length,
        })
    }

    /// Range of pieces overlapping a file, as `first..end` (end exclusive).
    pub fn file_pieces(&self, file_index: usize) -> Option<std::ops::Range<u32>> {
        let file = self.files.get(file_index)?;
        let piece_length = u64::from(self.piece_length);
        let first = (file.offset / piece_length) as u32;
        if file.size == 0 {
            return Some(first..first);
        }
        let last = ((file.offset + file.size - 1) / piece_length) as u32;
        Some(first..last + 1)
    }
}
