//! Bob Settings
//!
//! Structured configuration merging for coding-agent settings files. The
//! merge itself is a pure function over JSON value trees; reading and
//! writing happen only at the edges through a [`SettingsStore`].

mod error;
mod merge;
pub mod preset;
mod store;

pub use error::SettingsError;
pub use merge::{MergePolicy, merge, would_change};
pub use preset::Preset;
pub use store::{
  FsSettingsStore, MergeReport, SettingsStore, merge_file, parse_existing, plan_merge,
  preserve_malformed,
};
