#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions)]

//! The empirical reuse model: which widgets an action has historically
//! led to, how often, and under which attributes.
//!
//! One mutable store per session plus any number of read-only sibling
//! platform models loaded from disk, matched against local actions by
//! widget-attribute similarity.

use std::path::{Path, PathBuf};

/// Binary model file codec and schema records.
pub mod codec;
/// Read-only sibling-platform models, match cache, and widget index.
pub mod external;
/// The mutable in-memory reuse store.
pub mod store;

pub use codec::{read_model, stable_hash64, write_model, CodecError, WidgetReuseModel};
pub use external::{ActionMatch, ExternalModelRegistry, ExternalPlatformModel};
pub use store::{ActionAttributes, ReuseEntry, ReuseStore, WidgetObservation};

/// Platform tags a sibling model may be published under.
pub const PLATFORM_TAGS: [&str; 5] = ["phone", "tablet", "tv", "car", "watch"];

/// Extension of serialized reuse models.
pub const MODEL_FILE_EXTENSION: &str = "fbm";

/// Path of the local model for a package: `fastbot_<package>.fbm`.
#[must_use]
pub fn local_model_path(base_dir: impl AsRef<Path>, package: &str) -> PathBuf {
    base_dir
        .as_ref()
        .join(format!("fastbot_{package}.{MODEL_FILE_EXTENSION}"))
}

/// Path of a sibling platform model: `fastbot_<package>.<platform>.fbm`.
#[must_use]
pub fn platform_model_path(base_dir: impl AsRef<Path>, package: &str, platform: &str) -> PathBuf {
    base_dir
        .as_ref()
        .join(format!("fastbot_{package}.{platform}.{MODEL_FILE_EXTENSION}"))
}
