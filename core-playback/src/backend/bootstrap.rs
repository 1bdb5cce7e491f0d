//! Process-wide engine bootstrap.
//!
//! Native engines typically need one global setup step (plugin discovery,
//! library loading) before any player instance exists. Hosts call
//! [`initialize`] once at startup; backends refuse to construct before that.
//! Later calls never reinitialize.

use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::info;

use crate::error::{PlaybackError, Result};

/// Options recorded by the first [`initialize`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Directory the native engine loads plugins from.
    pub plugin_path: Option<PathBuf>,
    /// Extra arguments handed to every engine instance.
    pub engine_args: Vec<String>,
}

static BOOTSTRAP: OnceLock<BootstrapOptions> = OnceLock::new();

/// Runs the global setup. Returns `true` if this call performed it.
pub fn initialize(options: BootstrapOptions) -> bool {
    let mut performed = false;
    BOOTSTRAP.get_or_init(|| {
        performed = true;
        info!(
            plugin_path = ?options.plugin_path,
            args = options.engine_args.len(),
            "Media engine bootstrap complete"
        );
        options
    });
    performed
}

pub fn is_initialized() -> bool {
    BOOTSTRAP.get().is_some()
}

/// Options of the completed bootstrap.
pub fn options() -> Option<&'static BootstrapOptions> {
    BOOTSTRAP.get()
}

pub(crate) fn ensure_initialized(component: &str) -> Result<&'static BootstrapOptions> {
    BOOTSTRAP.get().ok_or_else(|| {
        PlaybackError::NotInitialized(format!(
            "{component} requires bootstrap::initialize() to run first"
        ))
    })
}
