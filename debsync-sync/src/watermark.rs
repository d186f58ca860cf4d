//! The archive-wide "last synchronized" reference.
//!
//! The watermark is never stored explicitly. It is the newest recorded state
//! that changed the published output area, so every successful registration
//! advances it and a pass with nothing new leaves it where it was.

use chrono::{DateTime, Utc};

use debsync_core::{ArchiveConfig, StateId};

use crate::error::HierarchyError;
use crate::hierarchy::Hierarchy;

/// Current watermark; `None` when the archive has never been published to.
pub fn current<H: Hierarchy + ?Sized>(
    hierarchy: &H,
    config: &ArchiveConfig,
) -> Result<Option<StateId>, HierarchyError> {
    let published = hierarchy.root().join(&config.published_dir);
    hierarchy.last_state_touching(&published)
}

/// Human-readable age of a timestamp, e.g. `42s`, `5m`, `3h`, `2d`.
pub fn format_age(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
