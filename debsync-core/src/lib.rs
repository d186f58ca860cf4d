//! debsync core library: domain types, archive configuration, errors.
//!
//! - [`types`]: newtypes, artifact kinds, distribution entries
//! - [`config`]: load / save / init of `.debsync/archive.yaml`
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{ArchiveConfig, ToolConfig};
pub use error::ConfigError;
pub use types::{
    ArtifactKind, Codename, DistributionEntry, DistributionName, PackageName, StateId,
};
