//! Wire protocol
//!
//! The protocol has no framing: each message is whatever a single bounded
//! read returns. A session looks like this:
//!
//! ```text
//! requester                      provider
//!   content id (<= 65 bytes)  ->
//!                             <-  "ok" | "error"
//!   "0"                       ->
//!                             <-  bytes [0, chunk_size)
//!   "1"                       ->
//!                             <-  bytes [chunk_size, 2 * chunk_size)
//!   ...
//!   <close>                   ->  session ends
//! ```

use crate::error::{Error, Result};

/// Largest content id a provider reads during the handshake
pub const MAX_CONTENT_ID_LEN: usize = 65;

/// Largest chunk index request, in decimal characters
pub const MAX_CHUNK_INDEX_LEN: usize = 32;

/// Handshake reply for a known content id
pub const HANDSHAKE_OK: &[u8] = b"ok";

/// Handshake reply for an unknown content id
pub const HANDSHAKE_ERROR: &[u8] = b"error";

/// Encode a chunk request
pub fn encode_chunk_index(index: u32) -> Vec<u8> {
    index.to_string().into_bytes()
}

/// Decode a chunk request received from a requester
pub fn decode_chunk_index(data: &[u8]) -> Result<u64> {
    let invalid = || Error::InvalidChunkIndex(String::from_utf8_lossy(data).into_owned());

    let text = std::str::from_utf8(data).map_err(|_| invalid())?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    text.parse::<u64>().map_err(|_| invalid())
}

/// Byte offset of a chunk within its file
pub fn chunk_offset(index: u64, chunk_size: usize) -> Result<u64> {
    index
        .checked_mul(chunk_size as u64)
        .ok_or_else(|| Error::InvalidChunkIndex(index.to_string()))
}
