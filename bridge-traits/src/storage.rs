//! Storage and File System Abstractions
//!
//! Provides the file I/O trait data sources and cache strategies use to reach
//! the underlying bytes.

use async_trait::async_trait;
use bytes::Bytes;
use core_async::io::{AsyncReadExt, BoxedReader, BoxedWriter};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn sniff(fs: &dyn FileSystemAccess, path: &Path) -> Result<Bytes> {
///     // Never pulls more than 64 KiB into memory.
///     fs.read_prefix(path, 64 * 1024).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's cache directory
    ///
    /// This directory is suitable for files that can be deleted by the system
    /// when storage is low.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    ///
    /// For large files, consider using `open_read_stream` instead.
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for streaming reads
    async fn open_read_stream(&self, path: &Path) -> Result<BoxedReader>;

    /// Create or truncate a file for streaming writes, creating missing
    /// parent directories.
    ///
    /// Written bytes are complete once the writer has been shut down.
    async fn open_write_stream(&self, path: &Path) -> Result<BoxedWriter>;

    /// Read at most `limit` bytes from the start of a file.
    async fn read_prefix(&self, path: &Path, limit: usize) -> Result<Bytes> {
        let reader = self.open_read_stream(path).await?;
        let mut buffer = Vec::with_capacity(limit.min(64 * 1024));
        reader.take(limit as u64).read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// The default implementation reads and discards the bytes before
    /// `offset`; adapters with seekable handles should override it.
    async fn read_range(&self, path: &Path, offset: u64, length: usize) -> Result<Bytes> {
        let mut reader = self.open_read_stream(path).await?;
        let mut skipped = (&mut reader).take(offset);
        core_async::io::copy(&mut skipped, &mut core_async::io::sink()).await?;

        let mut buffer = Vec::with_capacity(length.min(64 * 1024));
        reader.take(length as u64).read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}
