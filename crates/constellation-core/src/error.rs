//! Error types for Constellation

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Peer's address must be defined as host:port. Got {0}")]
    InvalidPeerAddress(String),

    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Peer rejected content id {content_id}: got {response:?}")]
    HandshakeRejected { content_id: String, response: String },

    #[error("Content id {0:?} not found in catalog")]
    ContentNotFound(String),

    #[error("Invalid chunk index: {0:?}")]
    InvalidChunkIndex(String),

    #[error("Timed out after {0:?} waiting for peer")]
    Timeout(Duration),

    #[error("Empty response for chunk {index}")]
    EmptyResponse { index: u32 },

    #[error("Chunk {index} is not staged, cannot merge {total} chunks")]
    MissingChunk { index: u32, total: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
