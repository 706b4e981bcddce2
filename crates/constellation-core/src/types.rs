//! Core data types for Constellation

use crate::error::{Error, Result};
use crate::proto::MAX_CONTENT_ID_LEN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Address of a remote provider, as `host:port`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for PeerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidPeerAddress(s.to_string());

        let (host, port) = s.split_once(':').ok_or_else(invalid)?;
        let host_ok = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-');
        if !host_ok || port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(value: PeerAddress) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A file this node wants to download from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundDescriptor {
    /// Destination of the finished download
    pub path: PathBuf,
    /// Provider to download from
    pub peer: PeerAddress,
    /// Lookup key sent during the handshake
    pub content_id: String,
    /// Number of chunks to request
    pub chunk_count: u32,
}

impl OutboundDescriptor {
    /// Describe a download, creating an empty destination file if none exists yet
    pub fn new(
        path: impl Into<PathBuf>,
        peer: PeerAddress,
        content_id: impl Into<String>,
        chunk_count: u32,
    ) -> Result<Self> {
        let path = path.into();
        let content_id = content_id.into();
        warn_if_truncated(&content_id);

        if !path.is_file() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
        }

        Ok(Self {
            path,
            peer,
            content_id,
            chunk_count,
        })
    }
}

/// A local file this node can serve to peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDescriptor {
    /// Source file on disk
    pub path: PathBuf,
    /// Key peers use to ask for this file
    pub content_id: String,
}

impl InboundDescriptor {
    /// Describe a served file; the source must already exist
    pub fn new(path: impl Into<PathBuf>, content_id: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::SourceNotFound(path));
        }

        let content_id = content_id.into();
        warn_if_truncated(&content_id);

        Ok(Self { path, content_id })
    }
}

fn warn_if_truncated(content_id: &str) {
    if content_id.len() > MAX_CONTENT_ID_LEN {
        tracing::warn!(
            "Content id {} is {} bytes, providers only read the first {}",
            content_id,
            content_id.len(),
            MAX_CONTENT_ID_LEN
        );
    }
}

/// Helper to format a hash as hex string
pub fn hash_to_hex(hash: &[u8]) -> String {
    hex::encode(hash)
}

/// Suggest a content id for a file: the hex BLAKE3 digest of its bytes.
///
/// Content ids are only lookup keys; nothing on the wire checks them against
/// the transferred data.
pub fn content_id_for_file(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hash_to_hex(hasher.finalize().as_bytes()))
}
