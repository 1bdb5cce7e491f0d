//! # Metadata Module
//!
//! Best-effort descriptive metadata for discovered media.
//!
//! ## Overview
//!
//! This module handles:
//! - MIME type sniffing from a bounded prefix of the file ([`sniff`])
//! - Audio tag extraction (ID3, Vorbis, MP4, FLAC) through `lofty` ([`extractor`])
//! - Embedded cover art extraction
//!
//! Data sources call into this crate while discovering an item. Nothing here
//! is allowed to fail discovery: a file without tags simply yields an empty
//! [`ExtractedMetadata`](bridge_traits::ExtractedMetadata).

pub mod error;
pub mod extractor;
pub mod sniff;

pub use error::{MetadataError, Result};
pub use extractor::LoftyMetadataProvider;
pub use sniff::{sniff, SniffedType};
