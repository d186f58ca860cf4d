//! # debsync-sync
//!
//! Incremental synchronization of a package archive from its distribution
//! projects.
//!
//! Call [`update_archive`] to run one pass: it refreshes every distribution
//! from its upstream, finds the package projects that changed since the
//! archive was last published to, and feeds their `.changes`, `.dsc` and
//! `.deb` files to the archive tool in that order, each file at most once.
//! [`plan_archive`] computes the same registrations without running anything.

pub mod adapter;
pub mod classifier;
pub mod descriptor;
pub mod detector;
pub mod error;
pub mod hash_cache;
pub mod hierarchy;
pub mod local;
pub mod outcome;
pub mod pipeline;
pub mod state_store;
pub mod update;
pub mod walker;
pub mod watermark;

pub use adapter::{ArchiveTool, RegisterRequest, RepreproTool, ToolError};
pub use error::{HierarchyError, SyncError};
pub use hierarchy::Hierarchy;
pub use local::LocalHierarchy;
pub use outcome::{Outcome, OutcomeRecord, Status};
pub use pipeline::{CandidateSet, PlannedRegistration, Step};
pub use update::{plan_archive, update_archive, PackagePlan, PassReport};
