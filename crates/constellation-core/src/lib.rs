//! Constellation Core - Shared types, wire protocol, and chunk staging
//!
//! This crate provides the building blocks shared by both ends of a
//! Constellation transfer: file descriptors, the raw TCP wire constants,
//! and the on-disk staging area that makes downloads resumable.

pub mod chunk;
pub mod error;
pub mod proto;
pub mod types;

pub use chunk::{ChunkStore, DownloadProgress};
pub use error::{Error, Result};
pub use types::*;

/// Default chunk size: 4 KB
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;
