//! Media Deck umbrella crate.
//!
//! Re-exports the [`core_service`] façade and, behind the matching features,
//! the local directory source (`local-source`) and the tag-based metadata
//! provider (`tag-metadata`). Host applications depend on this crate and
//! enable features instead of wiring each workspace crate individually.

#[cfg(any(
    feature = "desktop-shims",
    feature = "local-source",
    feature = "tag-metadata"
))]
pub use core_service::*;

#[cfg(feature = "local-source")]
pub use provider_local;

#[cfg(feature = "tag-metadata")]
pub use core_metadata;
