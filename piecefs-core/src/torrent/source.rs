//! Resolution of the user-supplied metadata argument.
//!
//! Accepts magnet links and paths to `.torrent` files. Web URLs are refused
//! outright since nothing here can fetch them.

use std::path::{Path, PathBuf};

use super::TorrentError;

const BTIH_PREFIX: &str = "xt=urn:btih:";

/// Where the torrent's metadata comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    /// Metadata must be fetched from the swarm.
    Magnet(MagnetLink),
    /// Canonical path of a local `.torrent` file.
    TorrentFile(PathBuf),
}

/// Magnet link components the engine needs to join the swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub uri: String,
    /// Lowercased btih value, 40 hex or 32 base32 characters.
    pub info_hash: String,
    pub display_name: Option<String>,
}

impl MetadataSource {
    /// Classifies and validates a metadata argument.
    ///
    /// # Errors
    ///
    /// - `TorrentError::UnsupportedSource` - If the argument is an HTTP(S) URL
    /// - `TorrentError::InvalidMagnetLink` - If a magnet URI is malformed
    /// - `TorrentError::MetadataNotFound` - If a file path does not resolve
    pub fn resolve(argument: &str) -> Result<Self, TorrentError> {
        if argument.starts_with("http:") || argument.starts_with("https:") {
            return Err(TorrentError::UnsupportedSource {
                reason: "No HTTP or HTTPS support yet".to_string(),
            });
        }

        if argument.starts_with("magnet:") {
            return parse_magnet_link(argument).map(MetadataSource::Magnet);
        }

        let path = Path::new(argument);
        let canonical = path
            .canonicalize()
            .map_err(|source| TorrentError::MetadataNotFound {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(MetadataSource::TorrentFile(canonical))
    }

    /// Whether the engine starts out with metadata in hand.
    pub fn has_metadata(&self) -> bool {
        matches!(self, MetadataSource::TorrentFile(_))
    }
}

fn parse_magnet_link(uri: &str) -> Result<MagnetLink, TorrentError> {
    let magnet = magnet_url::Magnet::new(uri).map_err(|e| TorrentError::InvalidMagnetLink {
        reason: e.to_string(),
    })?;

    let info_hash = extract_info_hash(uri)?;

    Ok(MagnetLink {
        uri: uri.to_string(),
        info_hash,
        display_name: magnet.display_name().map(|s| s.to_string()),
    })
}

fn extract_info_hash(uri: &str) -> Result<String, TorrentError> {
    let query = uri.split_once('?').map(|(_, query)| query).unwrap_or_default();

    let value = query
        .split('&')
        .find_map(|param| param.strip_prefix(BTIH_PREFIX))
        .ok_or_else(|| TorrentError::InvalidMagnetLink {
            reason: format!("missing btih info hash in {uri}"),
        })?;

    let valid = match value.len() {
        40 => value.chars().all(|c| c.is_ascii_hexdigit()),
        32 => value
            .chars()
            .all(|c| c.is_ascii_alphabetic() || ('2'..='7').contains(&c)),
        _ => false,
    };

    if !valid {
        return Err(TorrentError::InvalidMagnetLink {
            reason: format!("malformed btih info hash: {value}"),
        });
    }

    Ok(value.to_ascii_lowercase())
}
