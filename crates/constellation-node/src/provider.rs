//! Provider module for serving files to other peers
//!
//! Every accepted connection is one session: a handshake naming the content
//! id, then any number of chunk requests until the requester hangs up.

use crate::catalog::Catalog;
use constellation_core::proto::{
    self, HANDSHAKE_ERROR, HANDSHAKE_OK, MAX_CHUNK_INDEX_LEN, MAX_CONTENT_ID_LEN,
};
use constellation_core::{Error, Result};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, ToSocketAddrs};

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub content_id: String,
    pub chunks_served: u64,
    pub bytes_sent: u64,
}

/// Server side of a transfer
#[derive(Clone)]
pub struct Provider {
    catalog: Arc<Catalog>,
    chunk_size: usize,
}

impl Provider {
    /// Create a new provider
    pub fn new(catalog: Catalog, chunk_size: usize) -> Self {
        Self {
            catalog: Arc::new(catalog),
            chunk_size,
        }
    }

    /// Get access to the catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Bind a listener for `serve`
    pub async fn bind(address: impl ToSocketAddrs) -> Result<TcpListener> {
        Ok(TcpListener::bind(address).await?)
    }

    /// Accept connections forever, one task per session
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "Serving {} file(s) on {}",
            self.catalog.len(),
            listener.local_addr()?
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Error accepting connection: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            tracing::debug!("Accepted connection from {}", peer);
            let provider = self.clone();
            tokio::spawn(async move {
                match provider.handle(stream).await {
                    Ok(report) => tracing::info!(
                        "{}: Served {} chunks ({} bytes) to {}",
                        report.content_id,
                        report.chunks_served,
                        report.bytes_sent,
                        peer
                    ),
                    Err(Error::ContentNotFound(content_id)) => tracing::info!(
                        "File with content id {} not found, requested by {}",
                        content_id,
                        peer
                    ),
                    Err(e) => tracing::error!("Session with {} failed: {}", peer, e),
                }
            });
        }
    }

    /// Run one session over an accepted stream
    pub async fn handle<S>(&self, mut stream: S) -> Result<SessionReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut request = [0u8; MAX_CONTENT_ID_LEN];
        let n = stream.read(&mut request).await?;
        let content_id = String::from_utf8_lossy(&request[..n]).into_owned();

        let Some(file) = self.catalog.lookup(&content_id) else {
            stream.write_all(HANDSHAKE_ERROR).await?;
            let _ = stream.shutdown().await;
            return Err(Error::ContentNotFound(content_id));
        };

        stream.write_all(HANDSHAKE_OK).await?;
        stream.flush().await?;

        let mut source = tokio::fs::File::open(&file.path).await?;
        let mut report = SessionReport {
            content_id,
            chunks_served: 0,
            bytes_sent: 0,
        };

        let mut request = [0u8; MAX_CHUNK_INDEX_LEN];
        loop {
            let n = stream.read(&mut request).await?;
            if n == 0 {
                break;
            }

            let index = proto::decode_chunk_index(&request[..n])?;
            tracing::debug!("{}: Got chunk id: {}", report.content_id, index);

            source
                .seek(SeekFrom::Start(proto::chunk_offset(index, self.chunk_size)?))
                .await?;
            let mut chunk = Vec::with_capacity(self.chunk_size);
            (&mut source)
                .take(self.chunk_size as u64)
                .read_to_end(&mut chunk)
                .await?;

            // Past the end of the file there is nothing to send
            if chunk.is_empty() {
                tracing::debug!("{}: Chunk {} is past the end of file", report.content_id, index);
                continue;
            }
            stream.write_all(&chunk).await?;
            stream.flush().await?;

            report.chunks_served += 1;
            report.bytes_sent += chunk.len() as u64;
        }

        let _ = stream.shutdown().await;
        Ok(report)
    }
}
