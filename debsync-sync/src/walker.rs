//! Distribution refresh.
//!
//! Brings the distribution layer in line with the configured upstreams and
//! records the result as one archive state.

use std::path::PathBuf;

use debsync_core::{ArchiveConfig, Codename, DistributionName, StateId};

use crate::error::HierarchyError;
use crate::hierarchy::Hierarchy;
use crate::outcome::Outcome;

/// Message of the state recorded after refreshing all distributions.
pub const REFRESH_MESSAGE: &str = "Update distribution subdatasets";

/// A distribution project inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub name: DistributionName,
    /// Absolute path of the distribution project.
    pub path: PathBuf,
}

impl Distribution {
    pub fn codename(&self) -> Codename {
        self.name.codename()
    }
}

/// Result of [`refresh_distributions`].
#[derive(Debug, Default)]
pub struct Refresh {
    /// Distributions that now match their upstream.
    pub distributions: Vec<Distribution>,
    /// One [`Outcome::Unavailable`] per distribution that could not be reset.
    pub failures: Vec<Outcome>,
    /// The recorded state, `None` when nothing changed.
    pub state: Option<StateId>,
}

/// Every distribution listed in the archive config, in config order.
pub fn configured_distributions<H: Hierarchy + ?Sized>(
    hierarchy: &H,
    config: &ArchiveConfig,
) -> Vec<Distribution> {
    config
        .distributions
        .iter()
        .map(|entry| Distribution {
            name: entry.name.clone(),
            path: hierarchy.root().join(config.distribution_path(&entry.name)),
        })
        .collect()
}

/// Reset every configured distribution (recursively) to its upstream.
///
/// A distribution that cannot be reached is reported in
/// [`Refresh::failures`] and left out of [`Refresh::distributions`]; the
/// others are still refreshed.
pub fn refresh_distributions<H: Hierarchy + ?Sized>(
    hierarchy: &mut H,
    config: &ArchiveConfig,
) -> Result<Refresh, HierarchyError> {
    let layer = hierarchy.root().join(&config.distributions_dir);
    hierarchy.ensure_present(&layer)?;

    let mut refresh = Refresh::default();
    for dist in configured_distributions(hierarchy, config) {
        match hierarchy.reset_to_upstream(&dist.path, true) {
            Ok(()) => {
                tracing::debug!("refreshed distribution {}", dist.name);
                refresh.distributions.push(dist);
            }
            Err(e) => {
                tracing::warn!("cannot refresh distribution {}: {e}", dist.name);
                refresh.failures.push(Outcome::Unavailable {
                    project: dist.path,
                    reason: e.to_string(),
                });
            }
        }
    }

    refresh.state = hierarchy.record_state(REFRESH_MESSAGE, None)?;
    Ok(refresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use debsync_core::config;
    use tempfile::TempDir;

    use crate::local::LocalHierarchy;
    use crate::state_store;

    #[test]
    fn refresh_reports_unreachable_and_continues() {
        let archive = TempDir::new().unwrap();
        let upstream = TempDir::new().unwrap();
        fs::create_dir_all(upstream.path().join("packages/hello")).unwrap();
        fs::write(upstream.path().join("packages/hello/hello_1.0-1.dsc"), "x").unwrap();

        config::init_at(archive.path()).unwrap();
        config::add_distribution_at(
            archive.path(),
            "bookworm".into(),
            archive.path().join("missing-upstream"),
        )
        .unwrap();
        let cfg = config::add_distribution_at(
            archive.path(),
            "trixie".into(),
            upstream.path().to_path_buf(),
        )
        .unwrap();
        let mut h = LocalHierarchy::new(archive.path().to_path_buf(), cfg.clone());

        let refresh = refresh_distributions(&mut h, &cfg).unwrap();
        let names: Vec<_> = refresh.distributions.iter().map(|d| d.name.0.as_str()).collect();
        assert_eq!(names, vec!["trixie"]);
        assert_eq!(refresh.failures.len(), 1);
        assert!(matches!(
            &refresh.failures[0],
            Outcome::Unavailable { project, .. } if project.ends_with("distributions/bookworm")
        ));
        assert!(archive
            .path()
            .join("distributions/trixie/packages/hello/hello_1.0-1.dsc")
            .is_file());

        let head = state_store::history_at(archive.path()).unwrap();
        assert_eq!(head[0].message, REFRESH_MESSAGE);
        assert_eq!(refresh.state, Some(head[0].id.clone()));
    }

    #[test]
    fn second_refresh_without_upstream_changes_records_nothing() {
        let archive = TempDir::new().unwrap();
        let upstream = TempDir::new().unwrap();
        fs::write(upstream.path().join("README"), "x").unwrap();
        config::init_at(archive.path()).unwrap();
        let cfg = config::add_distribution_at(
            archive.path(),
            "sid".into(),
            upstream.path().to_path_buf(),
        )
        .unwrap();
        let mut h = LocalHierarchy::new(archive.path().to_path_buf(), cfg.clone());

        assert!(refresh_distributions(&mut h, &cfg).unwrap().state.is_some());
        assert!(refresh_distributions(&mut h, &cfg).unwrap().state.is_none());
    }

    #[test]
    fn codename_comes_from_name_prefix() {
        let dist = Distribution {
            name: "bullseye-nonfree".into(),
            path: PathBuf::from("/a/distributions/bullseye-nonfree"),
        };
        assert_eq!(dist.codename(), Codename::from("bullseye"));
    }
}
