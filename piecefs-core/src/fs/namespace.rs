//! Path to file and path to directory-children mappings.
//!
//! Built once from the torrent layout when metadata arrives and read-only
//! afterwards. Before that only the empty root directory exists.

use std::collections::{BTreeMap, BTreeSet};

use crate::torrent::TorrentLayout;

pub const ROOT: &str = "/";

/// File visible in the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path, always starting with `/`
    pub path: String,
    /// Index of the file in the torrent layout
    pub index: usize,
    /// Byte offset of the file within the torrent content
    pub offset: u64,
    pub size: u64,
}

/// Result of resolving a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Directory(Vec<String>),
    File { size: u64 },
    NotFound,
}

/// Files and directories of the mounted torrent.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    files: BTreeMap<String, FileEntry>,
    dirs: BTreeMap<String, BTreeSet<String>>,
    built: bool,
}

impl Namespace {
    /// Empty namespace holding only the root directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `build` has run.
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Populates the mappings from the layout's file list.
    ///
    /// Returns false without touching anything if already built. Empty
    /// path components are skipped, so `a//b` and `/a/b` both land at `/a/b`.
    pub fn build(&mut self, layout: &TorrentLayout) -> bool {
        if self.built {
            return false;
        }

        for (index, file) in layout.files().iter().enumerate() {
            let mut parent = String::new();
            let mut path = String::new();

            for component in file.path.split('/').filter(|c| !c.is_empty()) {
                let dir_key = if parent.is_empty() { ROOT } else { parent.as_str() };
                self.dirs
                    .entry(dir_key.to_string())
                    .or_default()
                    .insert(component.to_string());

                path.push('/');
                path.push_str(component);
                parent.clone_from(&path);
            }

            if path.is_empty() {
                continue;
            }

            if self.files.contains_key(&path) {
                tracing::warn!("Duplicate file path {} in torrent, keeping first entry", path);
                continue;
            }

            self.files.insert(
                path.clone(),
                FileEntry {
                    path,
                    index,
                    offset: file.offset,
                    size: file.size,
                },
            );
        }

        self.built = true;
        true
    }

    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Directories are the root plus every path that has children.
    pub fn is_dir(&self, path: &str) -> bool {
        path == ROOT || self.dirs.contains_key(path)
    }

    /// Sorted immediate child names of a directory.
    pub fn children(&self, path: &str) -> Option<Vec<String>> {
        if !self.is_dir(path) {
            return None;
        }
        Some(
            self.dirs
                .get(path)
                .map(|names| names.iter().cloned().collect())
                .unwrap_or_default(),
        )
    }

    pub fn lookup(&self, path: &str) -> Lookup {
        if let Some(children) = self.children(path) {
            return Lookup::Directory(children);
        }
        match self.files.get(path) {
            Some(entry) => Lookup::File { size: entry.size },
            None => Lookup::NotFound,
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TorrentLayout {
        TorrentLayout::new(
            16384,
            [
                ("Movie/movie.mkv", 50_000u64),
                ("Movie/Subs/en.srt", 1_000),
                ("Movie/Subs/fr.srt", 1_200),
                ("readme.txt", 10),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_namespace_has_only_root() {
        let namespace = Namespace::new();
        assert!(!namespace.is_built());
        assert_eq!(namespace.lookup("/"), Lookup::Directory(vec![]));
        assert_eq!(namespace.lookup("/Movie"), Lookup::NotFound);
    }

    #[test]
    fn test_build_creates_files_and_directories() {
        let mut namespace = Namespace::new();
        assert!(namespace.build(&layout()));

        assert_eq!(
            namespace.lookup("/"),
            Lookup::Directory(vec!["Movie".to_string(), "readme.txt".to_string()])
        );
        assert_eq!(
            namespace.lookup("/Movie"),
            Lookup::Directory(vec!["Subs".to_string(), "movie.mkv".to_string()])
        );
        assert_eq!(
            namespace.lookup("/Movie/Subs"),
            Lookup::Directory(vec!["en.srt".to_string(), "fr.srt".to_string()])
        );
        assert_eq!(namespace.lookup("/Movie/movie.mkv"), Lookup::File { size: 50_000 });

        let subs = namespace.file("/Movie/Subs/fr.srt").unwrap();
        assert_eq!(subs.index, 2);
        assert_eq!(subs.offset, 51_000);
    }

    #[test]
    fn test_every_path_starts_with_slash() {
        let mut namespace = Namespace::new();
        namespace.build(&layout());
        assert!(namespace.files().all(|entry| entry.path.starts_with('/')));
    }

    #[test]
    fn test_second_build_is_noop() {
        let mut namespace = Namespace::new();
        namespace.build(&layout());
        let before: Vec<FileEntry> = namespace.files().cloned().collect();

        let other = TorrentLayout::new(16384, [("other.bin", 5u64)]).unwrap();
        assert!(!namespace.build(&other));

        let after: Vec<FileEntry> = namespace.files().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(namespace.lookup("/other.bin"), Lookup::NotFound);
    }

    #[test]
    fn test_empty_components_are_skipped() {
        let layout = TorrentLayout::new(16, [("a//b.txt", 3u64)]).unwrap();
        let mut namespace = Namespace::new();
        namespace.build(&layout);
        assert_eq!(namespace.lookup("/a/b.txt"), Lookup::File { size: 3 });
        assert!(namespace.is_dir("/a"));
    }

    #[test]
    fn test_files_are_not_directories() {
        let mut namespace = Namespace::new();
        namespace.build(&layout());
        assert!(namespace.children("/readme.txt").is_none());
        assert!(namespace.is_file("/readme.txt"));
        assert!(!namespace.is_dir("/readme.txt"));
    }
}
