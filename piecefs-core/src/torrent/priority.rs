//! Per-piece download priority levels understood by the torrent engine.

use std::fmt;

/// Download priority of a single piece.
///
/// Higher levels always preempt lower ones in the engine's own scheduling.
/// The numeric values follow the usual 0..=7 engine range so adapters can
/// pass `as_u8()` straight through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PiecePriority {
    /// Piece is not downloaded at all.
    #[default]
    DontDownload = 0,
    /// Lowest downloading level, used for the read-ahead tail of the window.
    Normal = 1,
    /// Highest level, used for the pieces right at the read cursor.
    Urgent = 7,
}

impl PiecePriority {
    /// Returns the raw engine priority value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true if the engine should fetch pieces at this level.
    pub fn is_wanted(self) -> bool {
        self != PiecePriority::DontDownload
    }
}

impl fmt::Display for PiecePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PiecePriority::DontDownload => write!(f, "dont-download"),
            PiecePriority::Normal => write!(f, "normal"),
            PiecePriority::Urgent => write!(f, "urgent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering_matches_engine_values() {
        assert!(PiecePriority::Urgent > PiecePriority::Normal);
        assert!(PiecePriority::Normal > PiecePriority::DontDownload);
        assert_eq!(PiecePriority::Urgent.as_u8(), 7);
        assert_eq!(PiecePriority::Normal.as_u8(), 1);
        assert_eq!(PiecePriority::default(), PiecePriority::DontDownload);
    }

    #[test]
    fn test_only_dont_download_is_unwanted() {
        assert!(!PiecePriority::DontDownload.is_wanted());
        assert!(PiecePriority::Normal.is_wanted());
        assert!(PiecePriority::Urgent.is_wanted());
    }
}
