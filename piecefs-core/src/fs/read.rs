//! Read request decomposition and completion tracking.
//!
//! A read of `(offset, length)` on a file is cut into piece-aligned parts.
//! Each part is filled exactly once, by the dispatch loop, with a slice of
//! the delivered piece; the issuing reader copies the slices out after its
//! wait ends.

use std::ops::Range;

use bytes::Bytes;

use super::namespace::FileEntry;
use crate::torrent::{PieceIndex, TorrentEngine, TorrentLayout};

/// Reasons a read cannot be decomposed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecomposeError {
    /// Offset at or past the end of the file; callers treat this as an empty read.
    #[error("Offset {offset} is beyond file size {file_size}")]
    OutOfRange { offset: u64, file_size: u64 },

    #[error("File index {index} is not part of the torrent layout")]
    UnknownFile { index: usize },

    #[error("Piece {piece} has no room for offset {start}")]
    InconsistentLayout { piece: PieceIndex, start: u32 },
}

/// Portion of a read falling inside a single piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub piece: PieceIndex,
    /// Offset of the first wanted byte inside the piece
    pub start: u32,
    pub length: u32,
    /// Region of the caller's buffer this part lands in
    pub target: Range<usize>,
    data: Option<Bytes>,
}

impl Part {
    pub fn is_filled(&self) -> bool {
        self.data.is_some()
    }

    /// Fills the part from a whole piece's bytes. Only the first fill counts.
    fn fill(&mut self, piece_data: &Bytes) -> bool {
        if self.data.is_some() {
            return false;
        }

        let start = self.start as usize;
        let end = start + self.length as usize;
        if piece_data.len() < end {
            tracing::warn!(
                "Piece {} delivered {} bytes, part needs {}..{}",
                self.piece,
                piece_data.len(),
                start,
                end
            );
            return false;
        }

        self.data = Some(piece_data.slice(start..end));
        true
    }
}

/// Splits a file byte range into piece-aligned parts.
///
/// The length is clamped to the end of the file. Parts come out in ascending
/// piece order, without gaps or overlaps, and their lengths sum to the
/// clamped length.
///
/// # Errors
///
/// - `DecomposeError::OutOfRange` - If `offset` is at or past the end of the file
/// - `DecomposeError::UnknownFile` - If the file is not in `layout`
/// - `DecomposeError::InconsistentLayout` - If the layout maps into an empty piece
pub fn decompose(
    layout: &TorrentLayout,
    file: &FileEntry,
    offset: u64,
    length: u64,
) -> Result<Vec<Part>, DecomposeError> {
    if offset >= file.size {
        return Err(DecomposeError::OutOfRange {
            offset,
            file_size: file.size,
        });
    }

    let mut remaining = length.min(file.size - offset);
    let mut offset = offset;
    let mut target = 0usize;
    let mut parts = Vec::new();

    while remaining > 0 {
        let slice = layout
            .map_file_range(file.index, offset, remaining)
            .ok_or(DecomposeError::UnknownFile { index: file.index })?;

        let room = layout.piece_size(slice.piece).saturating_sub(slice.start);
        let part_length = u64::from(room).min(slice.length);
        if part_length == 0 {
            return Err(DecomposeError::InconsistentLayout {
                piece: slice.piece,
                start: slice.start,
            });
        }

        let part_length = part_length as usize;
        parts.push(Part {
            piece: slice.piece,
            start: slice.start,
            length: part_length as u32,
            target: target..target + part_length,
            data: None,
        });

        remaining -= part_length as u64;
        offset += part_length as u64;
        target += part_length;
    }

    Ok(parts)
}

/// Parts of one outstanding read and their fill state.
#[derive(Debug, Clone, Default)]
pub struct ReadTracker {
    parts: Vec<Part>,
}

impl ReadTracker {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Piece holding the first requested byte.
    pub fn lead_piece(&self) -> Option<PieceIndex> {
        self.parts.first().map(|part| part.piece)
    }

    /// Total bytes this read returns once filled.
    pub fn size(&self) -> u64 {
        self.parts.iter().map(|part| u64::from(part.length)).sum()
    }

    pub fn is_filled(&self) -> bool {
        self.parts.iter().all(Part::is_filled)
    }

    /// Fills every unfilled part of `piece`; returns how many were filled.
    pub fn copy(&mut self, piece: PieceIndex, piece_data: &Bytes) -> usize {
        self.parts
            .iter_mut()
            .filter(|part| part.piece == piece)
            .map(|part| part.fill(piece_data))
            .filter(|filled| *filled)
            .count()
    }

    /// Requests delivery of every downloaded piece an unfilled part waits on.
    ///
    /// Pieces the engine can hand over from its cache are filled right away.
    /// Safe to call repeatedly; returns how many parts were filled here.
    pub fn trigger(&mut self, engine: &dyn TorrentEngine) -> usize {
        let mut filled = 0;
        for part in self.parts.iter_mut().filter(|part| !part.is_filled()) {
            if !engine.have_piece(part.piece) {
                continue;
            }
            match engine.cached_piece(part.piece) {
                Some(data) if part.fill(&data) => filled += 1,
                _ => engine.request_piece_read(part.piece),
            }
        }
        filled
    }

    /// Copies the filled parts into `buffer`, returning the bytes written.
    ///
    /// Unfilled parts and regions past the end of `buffer` are skipped.
    pub fn write_into(&self, buffer: &mut [u8]) -> usize {
        let mut written = 0;
        for part in &self.parts {
            let Some(data) = &part.data else {
                continue;
            };
            let Some(destination) = buffer.get_mut(part.target.clone()) else {
                continue;
            };
            destination.copy_from_slice(data);
            written += data.len();
        }
        written
    }
}
