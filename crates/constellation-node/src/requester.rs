//! Requester module
//!
//! Downloads one file from one provider, chunk by chunk, staging every
//! chunk on disk so an interrupted download picks up where it stopped.

use crate::config::TransferOptions;
use constellation_core::proto::{self, HANDSHAKE_ERROR, HANDSHAKE_OK};
use constellation_core::{ChunkStore, Error, OutboundDescriptor, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Outcome of a successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    /// Chunks requested from the peer during this run
    pub fetched: u32,
    /// Chunks found already staged by an earlier run
    pub skipped: u32,
    /// Size of the merged file
    pub bytes: u64,
}

/// Client side of a transfer
pub struct Requester {
    descriptor: OutboundDescriptor,
    chunk_size: usize,
    options: TransferOptions,
    store: ChunkStore,
}

impl Requester {
    /// Create a new requester
    pub fn new(descriptor: OutboundDescriptor, chunk_size: usize, options: TransferOptions) -> Self {
        let store = ChunkStore::for_destination(&descriptor.path);
        Self {
            descriptor,
            chunk_size,
            options,
            store,
        }
    }

    pub fn descriptor(&self) -> &OutboundDescriptor {
        &self.descriptor
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Connect to the peer and download every missing chunk.
    ///
    /// The connection step never gives up; everything after it fails the
    /// fetch on the first problem. Staged chunks survive a failure, so
    /// calling `fetch` again resumes.
    pub async fn fetch(&self) -> Result<FetchReport> {
        let mut stream = self.connect().await;
        let result = self.transfer(&mut stream).await;
        let _ = stream.shutdown().await;
        result
    }

    /// Open a connection to the peer, retrying at a fixed interval until it works
    pub async fn connect(&self) -> TcpStream {
        let peer = &self.descriptor.peer;
        loop {
            match TcpStream::connect((peer.host.as_str(), peer.port)).await {
                Ok(stream) => {
                    tracing::debug!("{}: Connected to {}", self.descriptor.content_id, peer);
                    return stream;
                }
                Err(e) => {
                    tracing::warn!(
                        "{}: {} ({}), retrying in {:?}",
                        self.descriptor.content_id,
                        e,
                        peer,
                        self.options.connect_backoff
                    );
                    tokio::time::sleep(self.options.connect_backoff).await;
                }
            }
        }
    }

    /// Run the handshake, the chunk loop and the merge over an open stream
    pub async fn transfer<S>(&self, stream: &mut S) -> Result<FetchReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.handshake(stream).await?;

        let total = self.descriptor.chunk_count;
        let staged = self.store.progress(total);
        if !staged.staged.is_empty() {
            tracing::info!(
                "{}: Resuming with {}/{} chunks staged ({:.0}%)",
                self.descriptor.content_id,
                staged.staged.len(),
                total,
                staged.progress()
            );
        }

        let mut report = FetchReport {
            fetched: 0,
            skipped: 0,
            bytes: 0,
        };

        for index in 0..total {
            if self.store.has_chunk(index) {
                report.skipped += 1;
                continue;
            }

            tracing::debug!("{}: Requesting chunk {}", self.descriptor.content_id, index);
            stream.write_all(&proto::encode_chunk_index(index)).await?;
            stream.flush().await?;

            let chunk = read_response(stream, self.chunk_size, self.options.read_timeout).await?;
            if chunk.is_empty() {
                return Err(Error::EmptyResponse { index });
            }

            self.store.write_chunk(index, &chunk)?;
            report.fetched += 1;
        }

        report.bytes = self.store.merge_into(&self.descriptor.path, total)?;

        tracing::info!(
            "{}: Downloaded {} ({} bytes, {} chunks fetched, {} resumed)",
            self.descriptor.content_id,
            self.descriptor.path.display(),
            report.bytes,
            report.fetched,
            report.skipped
        );

        Ok(report)
    }

    async fn handshake<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let content_id = &self.descriptor.content_id;
        tracing::debug!("{}: Sending content id", content_id);
        stream.write_all(content_id.as_bytes()).await?;
        stream.flush().await?;

        // At least 5 bytes so "error" arrives whole even with tiny chunk sizes
        let max = self.chunk_size.max(HANDSHAKE_ERROR.len());
        let response = read_response(stream, max, self.options.read_timeout).await?;
        tracing::debug!("{}: Got response: {:?}", content_id, String::from_utf8_lossy(&response));

        if response != HANDSHAKE_OK {
            tracing::info!("{}: Can't get the file from {}", content_id, self.descriptor.peer);
            return Err(Error::HandshakeRejected {
                content_id: content_id.clone(),
                response: String::from_utf8_lossy(&response).into_owned(),
            });
        }

        Ok(())
    }
}

/// Run every requester in its own task and collect the outcomes in input order.
///
/// A failed fetch is logged and reported; it never stops the others.
pub async fn fetch_all(requesters: Vec<Requester>) -> Vec<(OutboundDescriptor, Result<FetchReport>)> {
    let handles: Vec<_> = requesters
        .into_iter()
        .map(|requester| {
            let descriptor = requester.descriptor().clone();
            (descriptor, tokio::spawn(async move { requester.fetch().await }))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (descriptor, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        };
        if let Err(e) = &result {
            tracing::error!(
                "{}: Error while fetching {}: {}",
                descriptor.content_id,
                descriptor.path.display(),
                e
            );
        }
        results.push((descriptor, result));
    }

    results
}

/// A single read of at most `max` bytes, bounded by `timeout`
async fn read_response<S>(stream: &mut S, max: usize, timeout: Duration) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; max];
    let n = tokio::time::timeout(timeout, stream.read(&mut buffer))
        .await
        .map_err(|_| Error::Timeout(timeout))??;
    buffer.truncate(n);
    Ok(buffer)
}
