//! Chunk staging and reassembly
//!
//! Each download stages its chunks in a directory next to the destination,
//! one file per chunk index. A staged chunk is never re-requested, so an
//! interrupted download resumes by simply running again.

use crate::error::{Error, Result};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const STAGING_SUFFIX: &str = "_chunks";
const PART_EXTENSION: &str = "part";
const MERGED_NAME: &str = "merged.part";

/// Number of chunks needed to carry `file_len` bytes
pub fn chunk_count(file_len: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    file_len.div_ceil(chunk_size as u64)
}

/// Staging area for one download
#[derive(Debug, Clone)]
pub struct ChunkStore {
    /// `<stem>_chunks` directory beside the destination
    dir: PathBuf,
}

impl ChunkStore {
    /// Staging area for the given destination file
    pub fn for_destination(destination: &Path) -> Self {
        let stem = destination
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir_name = format!("{}{}", stem, STAGING_SUFFIX);
        let dir = match destination.parent() {
            Some(parent) => parent.join(dir_name),
            None => PathBuf::from(dir_name),
        };

        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the staged file for a chunk
    pub fn chunk_path(&self, index: u32) -> PathBuf {
        self.dir.join(index.to_string())
    }

    pub fn has_chunk(&self, index: u32) -> bool {
        self.chunk_path(index).is_file()
    }

    /// Durably stage a chunk. The staging directory is created on first use.
    pub fn write_chunk(&self, index: u32, data: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let final_path = self.chunk_path(index);
        let part_path = final_path.with_extension(PART_EXTENSION);
        {
            let mut file = std::fs::File::create(&part_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        std::fs::rename(&part_path, &final_path)?;

        tracing::trace!("Staged chunk {} ({} bytes)", index, data.len());
        Ok(())
    }

    /// Read back a staged chunk
    pub fn read_chunk(&self, index: u32) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.chunk_path(index))?)
    }

    /// Which of the first `total_chunks` chunks are already staged
    pub fn progress(&self, total_chunks: u32) -> DownloadProgress {
        let mut progress = DownloadProgress::new(total_chunks);
        progress.staged = (0..total_chunks).filter(|i| self.has_chunk(*i)).collect();
        progress
    }

    /// Concatenate chunks `0..total_chunks` into `destination` and remove
    /// the staging directory.
    ///
    /// The merged bytes go to a temporary file inside the staging directory
    /// first and are renamed over the destination, so a failed merge leaves
    /// the destination untouched and every chunk still staged.
    pub fn merge_into(&self, destination: &Path, total_chunks: u32) -> Result<u64> {
        if let Some(index) = (0..total_chunks).find(|i| !self.has_chunk(*i)) {
            return Err(Error::MissingChunk {
                index,
                total: total_chunks,
            });
        }

        std::fs::create_dir_all(&self.dir)?;
        let merged_path = self.dir.join(MERGED_NAME);

        let mut total_written = 0u64;
        {
            let mut writer = BufWriter::new(std::fs::File::create(&merged_path)?);
            // Numeric order: chunk 10 follows chunk 9
            for index in 0..total_chunks {
                let mut chunk = std::fs::File::open(self.chunk_path(index))?;
                total_written += std::io::copy(&mut chunk, &mut writer)?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        std::fs::rename(&merged_path, destination)?;
        self.discard()?;

        tracing::debug!(
            "Merged {} chunks ({} bytes) into {}",
            total_chunks,
            total_written,
            destination.display()
        );

        Ok(total_written)
    }

    /// Delete the staging directory and everything in it
    pub fn discard(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Staging progress for one download
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Expected total chunks
    pub total_chunks: u32,
    /// Chunk indices already staged, ascending
    pub staged: Vec<u32>,
}

impl DownloadProgress {
    pub fn new(total_chunks: u32) -> Self {
        Self {
            total_chunks,
            staged: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.staged.len() as u32 == self.total_chunks
    }

    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        (self.staged.len() as f64 / self.total_chunks as f64) * 100.0
    }

    pub fn missing_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| self.staged.binary_search(i).is_err())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_dir_is_sibling() {
        let store = ChunkStore::for_destination(Path::new("/downloads/book.txt"));
        assert_eq!(store.dir(), Path::new("/downloads/book_chunks"));

        let store = ChunkStore::for_destination(Path::new("book"));
        assert_eq!(store.dir(), Path::new("book_chunks"));
    }

    #[test]
    fn test_staging_is_lazy() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::for_destination(&temp_dir.path().join("book"));

        assert!(!store.dir().exists());
        assert!(!store.has_chunk(0));

        store.write_chunk(0, b"He").unwrap();
        assert!(store.dir().is_dir());
        assert!(store.has_chunk(0));
        assert_eq!(store.read_chunk(0).unwrap(), b"He");
        assert!(!store.chunk_path(0).with_extension("part").exists());
    }

    #[test]
    fn test_merge_uses_numeric_order() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("book");
        let store = ChunkStore::for_destination(&destination);

        // Stage out of order to make sure arrival order doesn't matter
        for index in (0..12u32).rev() {
            store.write_chunk(index, format!("<{}>", index).as_bytes()).unwrap();
        }

        let written = store.merge_into(&destination, 12).unwrap();
        let merged = std::fs::read_to_string(&destination).unwrap();

        assert_eq!(merged, "<0><1><2><3><4><5><6><7><8><9><10><11>");
        assert_eq!(written, merged.len() as u64);
        let nine = merged.find("<9>").unwrap();
        let ten = merged.find("<10>").unwrap();
        let eleven = merged.find("<11>").unwrap();
        assert!(nine < ten && ten < eleven);
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_merge_requires_every_chunk() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("book");
        std::fs::write(&destination, b"previous").unwrap();
        let store = ChunkStore::for_destination(&destination);

        store.write_chunk(0, b"He").unwrap();
        store.write_chunk(2, b"o,").unwrap();

        let err = store.merge_into(&destination, 3).unwrap_err();
        assert!(matches!(err, Error::MissingChunk { index: 1, total: 3 }));

        // Nothing was lost
        assert_eq!(std::fs::read(&destination).unwrap(), b"previous");
        assert!(store.has_chunk(0));
        assert!(store.has_chunk(2));
    }

    #[test]
    fn test_merge_zero_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("empty");
        let store = ChunkStore::for_destination(&destination);

        assert_eq!(store.merge_into(&destination, 0).unwrap(), 0);
        assert_eq!(std::fs::read(&destination).unwrap(), b"");
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_discard_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::for_destination(&temp_dir.path().join("book"));
        store.discard().unwrap();
    }

    #[test]
    fn test_download_progress() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::for_destination(&temp_dir.path().join("book"));

        let progress = store.progress(5);
        assert!(!progress.is_complete());
        assert_eq!(progress.missing_chunks(), vec![0, 1, 2, 3, 4]);

        store.write_chunk(0, b"a").unwrap();
        store.write_chunk(2, b"b").unwrap();

        let progress = store.progress(5);
        assert_eq!(progress.staged, vec![0, 2]);
        assert_eq!(progress.missing_chunks(), vec![1, 3, 4]);
        assert!((progress.progress() - 40.0).abs() < 0.1);

        for index in [1, 3, 4] {
            store.write_chunk(index, b"c").unwrap();
        }
        let progress = store.progress(5);
        assert!(progress.is_complete());
        assert!((progress.progress() - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(12, 2), 6);
        assert_eq!(chunk_count(13, 2), 7);
        assert_eq!(chunk_count(0, 2), 0);
        assert_eq!(chunk_count(1, 4096), 1);
    }
}
