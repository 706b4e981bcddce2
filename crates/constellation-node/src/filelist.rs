//! YAML lists of files to download and to share
//!
//! ```yaml
//! # download_files.yml
//! - path: downloads/book.txt
//!   peer: 10.0.0.7:8181
//!   content_id: 3a4f...
//!   chunk_count: 6
//!
//! # share_files.yml
//! - path: library/book.txt
//!   content_id: 3a4f...
//! ```

use anyhow::Context;
use constellation_core::{InboundDescriptor, OutboundDescriptor, PeerAddress};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One entry of the download list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub path: PathBuf,
    pub peer: PeerAddress,
    #[serde(alias = "hash_sum")]
    pub content_id: String,
    #[serde(alias = "chunks")]
    pub chunk_count: u32,
}

/// One entry of the share list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareEntry {
    pub path: PathBuf,
    #[serde(alias = "hash_sum")]
    pub content_id: String,
}

impl DownloadEntry {
    /// Build the descriptor, creating the destination file if needed
    pub fn into_descriptor(self) -> constellation_core::Result<OutboundDescriptor> {
        OutboundDescriptor::new(self.path, self.peer, self.content_id, self.chunk_count)
    }
}

impl ShareEntry {
    /// Build the descriptor; fails if the source file is missing
    pub fn into_descriptor(self) -> constellation_core::Result<InboundDescriptor> {
        InboundDescriptor::new(self.path, self.content_id)
    }
}

/// Parse a list document. An empty or null document is an empty list.
pub fn parse_list<T: DeserializeOwned>(content: &str) -> anyhow::Result<Vec<T>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Option<Vec<T>> = serde_yaml::from_str(content)?;
    Ok(entries.unwrap_or_default())
}

fn read_list<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    tracing::debug!("Load collection from {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("file list not found: {}", path.display()))?;
    parse_list(&content).with_context(|| format!("file list is not valid YAML: {}", path.display()))
}

/// Load the download list and build a descriptor per entry
pub fn load_downloads(path: &Path) -> anyhow::Result<Vec<OutboundDescriptor>> {
    read_list::<DownloadEntry>(path)?
        .into_iter()
        .map(|entry| {
            let destination = entry.path.clone();
            entry
                .into_descriptor()
                .with_context(|| format!("download entry {}", destination.display()))
        })
        .collect()
}

/// Load the share list and build a descriptor per entry
pub fn load_shares(path: &Path) -> anyhow::Result<Vec<InboundDescriptor>> {
    read_list::<ShareEntry>(path)?
        .into_iter()
        .map(|entry| {
            let source = entry.path.clone();
            entry
                .into_descriptor()
                .with_context(|| format!("share entry {}", source.display()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_documents() {
        assert!(parse_list::<ShareEntry>("").unwrap().is_empty());
        assert!(parse_list::<ShareEntry>("  \n").unwrap().is_empty());
        assert!(parse_list::<ShareEntry>("~").unwrap().is_empty());
        assert!(parse_list::<DownloadEntry>("null").unwrap().is_empty());
        assert!(parse_list::<DownloadEntry>("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_hash_sum_aliases() {
        let entries: Vec<DownloadEntry> = parse_list(
            r#"
- path: /test_files/book
  peer: peer_address:8080
  hash_sum: c6e6f16b8a077ef5fbc8d59d0b931b9
  chunks: 1
"#,
        )
        .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, PathBuf::from("/test_files/book"));
        assert_eq!(entries[0].peer, PeerAddress::new("peer_address", 8080));
        assert_eq!(entries[0].content_id, "c6e6f16b8a077ef5fbc8d59d0b931b9");
        assert_eq!(entries[0].chunk_count, 1);
    }

    #[test]
    fn test_malformed_peer_is_rejected() {
        let result = parse_list::<DownloadEntry>(
            "- {path: book, peer: wrong_address, content_id: x, chunk_count: 1}\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_yaml_is_rejected() {
        assert!(parse_list::<ShareEntry>("- path: [unclosed\n").is_err());
    }

    #[test]
    fn test_load_missing_list() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_downloads(&temp_dir.path().join("absent.yml")).is_err());
        assert!(load_shares(&temp_dir.path().join("absent.yml")).is_err());
    }

    #[test]
    fn test_load_downloads_creates_destinations() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("book");
        let list = temp_dir.path().join("download_files.yml");
        std::fs::write(
            &list,
            format!(
                "- path: {}\n  peer: localhost:8181\n  content_id: abc\n  chunk_count: 6\n",
                destination.display()
            ),
        )
        .unwrap();

        let descriptors = load_downloads(&list).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].chunk_count, 6);
        assert!(destination.is_file());
    }

    #[test]
    fn test_load_shares_requires_sources() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("book");
        let list = temp_dir.path().join("share_files.yml");
        std::fs::write(
            &list,
            format!("- path: {}\n  hash_sum: abc\n", source.display()),
        )
        .unwrap();

        assert!(load_shares(&list).is_err());

        std::fs::write(&source, b"Hello, world").unwrap();
        let descriptors = load_shares(&list).unwrap();
        assert_eq!(descriptors[0].content_id, "abc");
    }
}
