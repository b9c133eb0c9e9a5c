//! Sliding piece-priority window.
//!
//! Engines pick pieces rarest-first by default, which starves a sequential
//! reader. The window overrides per-piece priorities around a single cursor:
//! an urgent run of pieces starting at the next missing piece, followed by a
//! normal-priority run long enough to cover the pending read. There is one
//! window per process; whichever read recomputes last steers it.

use crate::torrent::{PieceIndex, PiecePriority, TorrentEngine};

/// Piece geometry the window walks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub num_pieces: u32,
    pub piece_length: u32,
}

/// Pieces touched by one recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpan {
    pub cursor: PieceIndex,
    pub urgent: u32,
    pub normal: u32,
}

/// Cursor and sizing of the priority window.
#[derive(Debug, Clone)]
pub struct PieceWindow {
    cursor: PieceIndex,
    urgent_bytes: u64,
}

impl PieceWindow {
    pub fn new(urgent_bytes: u64) -> Self {
        Self {
            cursor: PieceIndex::new(0),
            urgent_bytes,
        }
    }

    /// First piece of the current window.
    pub fn cursor(&self) -> PieceIndex {
        self.cursor
    }

    /// Number of pieces the urgent run spans, never less than one.
    pub fn urgent_pieces(&self, piece_length: u32) -> u64 {
        self.urgent_bytes.div_ceil(u64::from(piece_length.max(1))).max(1)
    }

    /// Re-centers the window on the first missing piece at or after `start`.
    ///
    /// Downloaded pieces are skipped while walking and keep their priority;
    /// pieces before `start` are never touched. Returns `None` without
    /// changing the cursor when nothing at or after `start` is missing.
    pub fn recompute(
        &mut self,
        engine: &dyn TorrentEngine,
        geometry: WindowGeometry,
        start: PieceIndex,
        read_size: u64,
    ) -> Option<WindowSpan> {
        let first = next_missing(engine, geometry, start.as_u32())?;
        self.cursor = PieceIndex::new(first);

        let mut span = WindowSpan {
            cursor: self.cursor,
            urgent: 0,
            normal: 0,
        };

        let mut tail = first;
        for _ in 0..self.urgent_pieces(geometry.piece_length) {
            let Some(piece) = next_missing(engine, geometry, tail) else {
                return Some(span);
            };
            engine.set_piece_priority(PieceIndex::new(piece), PiecePriority::Urgent);
            span.urgent += 1;
            tail = piece + 1;
        }

        let normal_pieces = read_size.div_ceil(u64::from(geometry.piece_length.max(1)));
        for _ in 0..normal_pieces {
            let Some(piece) = next_missing(engine, geometry, tail) else {
                break;
            };
            engine.set_piece_priority(PieceIndex::new(piece), PiecePriority::Normal);
            span.normal += 1;
            tail = piece + 1;
        }

        tracing::trace!(
            "Window at piece {}: {} urgent, {} normal",
            span.cursor,
            span.urgent,
            span.normal
        );

        Some(span)
    }

    /// Slides the window past pieces that completed since the last recompute.
    pub fn advance(
        &mut self,
        engine: &dyn TorrentEngine,
        geometry: WindowGeometry,
    ) -> Option<WindowSpan> {
        self.recompute(engine, geometry, self.cursor, 0)
    }
}

fn next_missing(engine: &dyn TorrentEngine, geometry: WindowGeometry, from: u32) -> Option<u32> {
    (from..geometry.num_pieces).find(|&piece| !engine.have_piece(PieceIndex::new(piece)))
}
