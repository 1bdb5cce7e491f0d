//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the Media Deck core:
//! - Logging and tracing infrastructure, plus the default error sink
//! - Configuration management
//! - Event fan-out (observer lists and the broadcast event bus)
//!
//! Every other core crate builds on these conventions: errors are reported
//! through the configured `ErrorSink`, events flow through
//! [`events::EventHandlers`], and logs go through `tracing`.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
