//! # Local Provider
//!
//! Serves media from a directory tree on the local file system.
//!
//! ## Overview
//!
//! This module provides:
//! - Directory and file listing with case-insensitive extension filtering
//! - Item discovery with content sniffing and metadata enrichment
//! - Caching through the strategy selected by `CoreConfig::cache_mode`
//! - Streaming and byte-range reads of the underlying files

pub mod error;
pub mod source;

pub use error::{LocalSourceError, Result};
pub use source::LocalDataSource;
