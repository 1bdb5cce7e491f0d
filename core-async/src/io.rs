//! Async I/O traits and utilities.
//!
//! Re-exports tokio's I/O traits so byte sources can be passed across crate
//! boundaries without each crate naming tokio.

pub use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite,
    AsyncWriteExt, BufReader, BufWriter, ReadBuf, copy, sink,
};

/// Boxed, type-erased async reader handed out by data sources.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed async writer for streamed file writes.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
