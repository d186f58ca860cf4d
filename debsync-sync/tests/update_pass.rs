use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use debsync_core::{config, ArchiveConfig, ArtifactKind, Codename};
use debsync_core::StateId;
use debsync_sync::hierarchy::DiffEntry;
use debsync_sync::state_store::Provenance;
use debsync_sync::{
    plan_archive, state_store, update_archive, ArchiveTool, Hierarchy, HierarchyError,
    LocalHierarchy, Outcome, PassReport, RegisterRequest, Status, Step, ToolError,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Stands in for reprepro: remembers every request and publishes a marker
/// file under `www/pool`, which is what advances the watermark.
struct FakeTool {
    root: PathBuf,
    calls: Vec<RegisterRequest>,
    fail: bool,
}

impl FakeTool {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            calls: Vec::new(),
            fail: false,
        }
    }

    fn summary(&self) -> Vec<(ArtifactKind, String, usize)> {
        self.calls
            .iter()
            .map(|c| (c.kind, file_name(&c.artifact), c.inputs.len()))
            .collect()
    }
}

impl ArchiveTool for FakeTool {
    fn command_line(&self, request: &RegisterRequest) -> Vec<String> {
        vec![
            "fake-reprepro".to_string(),
            request.kind.to_string(),
            request.codename.to_string(),
            file_name(&request.artifact),
        ]
    }

    fn register(&mut self, request: &RegisterRequest) -> Result<(), ToolError> {
        self.calls.push(request.clone());
        if self.fail {
            return Err(ToolError::Exit {
                code: Some(254),
                stderr: "cannot lock database".into(),
            });
        }
        let pool = self.root.join("www/pool").join(&request.codename.0);
        fs::create_dir_all(&pool).expect("create pool");
        fs::write(pool.join(file_name(&request.artifact)), request.kind.to_string())
            .expect("publish");
        Ok(())
    }
}

struct Archive {
    root: TempDir,
    upstreams: TempDir,
    config: ArchiveConfig,
}

impl Archive {
    fn new(distributions: &[&str]) -> Self {
        let root = TempDir::new().expect("archive");
        let upstreams = TempDir::new().expect("upstreams");
        let mut config = config::init_at(root.path()).expect("init");
        for name in distributions {
            let upstream = upstreams.path().join(name);
            fs::create_dir_all(upstream.join("packages")).expect("upstream");
            config = config::add_distribution_at(root.path(), (*name).into(), upstream)
                .expect("add distribution");
        }
        Self {
            root,
            upstreams,
            config,
        }
    }

    /// Write a file into a package of a distribution's upstream.
    fn publish(&self, dist: &str, package: &str, name: &str, content: &str) {
        let dir = self.upstreams.path().join(dist).join("packages").join(package);
        fs::create_dir_all(&dir).expect("package dir");
        fs::write(dir.join(name), content).expect("write artifact");
    }

    fn hierarchy(&self) -> LocalHierarchy {
        LocalHierarchy::new(self.root.path().to_path_buf(), self.config.clone())
    }

    fn update(&self, tool: &mut FakeTool) -> PassReport {
        let mut hierarchy = self.hierarchy();
        update_archive(&mut hierarchy, &self.config, tool, |_| ControlFlow::Continue(()))
            .expect("update pass")
    }
}

/// A local hierarchy whose diff fails for one scope.
struct BrokenScope {
    inner: LocalHierarchy,
    broken: PathBuf,
}

impl Hierarchy for BrokenScope {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn ensure_present(&mut self, path: &Path) -> Result<(), HierarchyError> {
        self.inner.ensure_present(path)
    }

    fn reset_to_upstream(&mut self, project: &Path, recursive: bool) -> Result<(), HierarchyError> {
        self.inner.reset_to_upstream(project, recursive)
    }

    fn record_state(
        &mut self,
        message: &str,
        provenance: Option<Provenance>,
    ) -> Result<Option<StateId>, HierarchyError> {
        self.inner.record_state(message, provenance)
    }

    fn last_state_touching(&self, scope: &Path) -> Result<Option<StateId>, HierarchyError> {
        self.inner.last_state_touching(scope)
    }

    fn diff(
        &self,
        from: Option<&StateId>,
        scope: &Path,
        depth: usize,
    ) -> Result<Vec<DiffEntry>, HierarchyError> {
        if scope == self.broken {
            return Err(HierarchyError::NotPresent {
                path: scope.to_path_buf(),
            });
        }
        self.inner.diff(from, scope, depth)
    }

    fn materialize(&mut self, path: &Path) -> Result<(), HierarchyError> {
        self.inner.materialize(path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .expect("file name")
        .to_string_lossy()
        .into_owned()
}

fn dsc(source: &str, version: &str, files: &[&str]) -> String {
    let mut text = format!("Format: 3.0 (quilt)\nSource: {source}\nVersion: {version}\nFiles:\n");
    for f in files {
        text.push_str(&format!(" d41d8cd98f00b204e9800998ecf8427e 0 {f}\n"));
    }
    text
}

fn changes(source: &str, version: &str, distribution: &str, files: &[&str]) -> String {
    let mut text = format!(
        "Format: 1.8\nSource: {source}\nVersion: {version}\nDistribution: {distribution}\nFiles:\n"
    );
    for f in files {
        text.push_str(&format!(" d41d8cd98f00b204e9800998ecf8427e 0 misc optional {f}\n"));
    }
    text
}

fn publish_hello(archive: &Archive, dist: &str, declared: &str) {
    archive.publish(
        dist,
        "hello",
        "hello_1.0-1.dsc",
        &dsc(
            "hello",
            "1.0-1",
            &["hello_1.0.orig.tar.gz", "hello_1.0-1.debian.tar.gz"],
        ),
    );
    archive.publish(dist, "hello", "hello_1.0.orig.tar.gz", "orig");
    archive.publish(dist, "hello", "hello_1.0-1.debian.tar.gz", "debian");
    archive.publish(
        dist,
        "hello",
        "hello_1.0-1_amd64.changes",
        &changes("hello", "1.0-1", declared, &["hello_1.0-1_amd64.deb"]),
    );
    archive.publish(dist, "hello", "hello_1.0-1_amd64.deb", "deb");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn new_source_and_build_register_once_each() {
    let archive = Archive::new(&["trixie"]);
    publish_hello(&archive, "trixie", "trixie");
    let mut tool = FakeTool::new(archive.root.path());

    let report = archive.update(&mut tool);

    assert_eq!(report.watermark, None);
    assert!(report.is_clean(), "{:?}", report.outcomes);
    assert_eq!(
        tool.summary(),
        vec![
            (ArtifactKind::Manifest, "hello_1.0-1_amd64.changes".to_string(), 2),
            (ArtifactKind::Source, "hello_1.0-1.dsc".to_string(), 3),
        ]
    );
    assert!(tool.calls.iter().all(|c| c.codename == Codename::from("trixie")));

    let actions: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| o.record(archive.root.path()))
        .map(|r| (r.status, r.action, r.path))
        .collect();
    assert_eq!(
        actions,
        vec![
            (Status::Ok, "register.manifest".to_string(), "distributions/trixie".to_string()),
            (Status::Ok, "register.source".to_string(), "distributions/trixie".to_string()),
        ]
    );
}

#[test]
fn second_pass_without_changes_is_a_noop() {
    let archive = Archive::new(&["trixie"]);
    publish_hello(&archive, "trixie", "trixie");
    let mut tool = FakeTool::new(archive.root.path());

    let first = archive.update(&mut tool);
    assert_eq!(first.outcomes.len(), 2);

    let second = archive.update(&mut tool);
    assert!(second.outcomes.is_empty(), "{:?}", second.outcomes);
    assert!(second.watermark.is_some());
    assert_eq!(tool.calls.len(), 2);
}

#[test]
fn manifest_binaries_never_register_standalone() {
    let archive = Archive::new(&["trixie"]);
    archive.publish(
        "trixie",
        "tools",
        "tools_2.1_amd64.changes",
        &changes("tools", "2.1", "trixie", &["tools_2.1_amd64.deb", "tools-doc_2.1_all.deb"]),
    );
    archive.publish("trixie", "tools", "tools_2.1_amd64.deb", "b1");
    archive.publish("trixie", "tools", "tools-doc_2.1_all.deb", "b2");
    archive.publish("trixie", "tools", "extra_0.3_all.deb", "b3");
    let mut tool = FakeTool::new(archive.root.path());

    archive.update(&mut tool);

    assert_eq!(
        tool.summary(),
        vec![
            (ArtifactKind::Manifest, "tools_2.1_amd64.changes".to_string(), 3),
            (ArtifactKind::Binary, "extra_0.3_all.deb".to_string(), 1),
        ]
    );
    let inputs: Vec<_> = tool.calls[0].inputs.iter().map(|p| file_name(p)).collect();
    assert_eq!(
        inputs,
        vec!["tools_2.1_amd64.changes", "tools_2.1_amd64.deb", "tools-doc_2.1_all.deb"]
    );
}

#[test]
fn only_changed_distribution_is_reprocessed() {
    let archive = Archive::new(&["bookworm", "trixie"]);
    archive.publish("bookworm", "alpha", "alpha_1_all.deb", "a");
    archive.publish("trixie", "beta", "beta_1_all.deb", "b");
    let mut tool = FakeTool::new(archive.root.path());
    archive.update(&mut tool);
    assert_eq!(tool.calls.len(), 2);

    archive.publish("bookworm", "alpha", "alpha_2_all.deb", "a2");
    let report = archive.update(&mut tool);

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(tool.calls.len(), 3);
    assert_eq!(file_name(&tool.calls[2].artifact), "alpha_2_all.deb");
    assert_eq!(tool.calls[2].codename, Codename::from("bookworm"));
}

#[test]
fn flavored_distribution_targets_base_codename() {
    let archive = Archive::new(&["bullseye-nonfree"]);
    publish_hello(&archive, "bullseye-nonfree", "bullseye");
    let mut tool = FakeTool::new(archive.root.path());

    let report = archive.update(&mut tool);

    assert!(report.is_clean(), "{:?}", report.outcomes);
    assert_eq!(tool.calls.len(), 2);
    assert!(tool.calls.iter().all(|c| c.codename == Codename::from("bullseye")));
}

#[test]
fn mismatched_manifest_is_rejected_with_its_binaries() {
    let archive = Archive::new(&["trixie"]);
    publish_hello(&archive, "trixie", "bookworm");
    let mut tool = FakeTool::new(archive.root.path());

    let report = archive.update(&mut tool);

    assert!(!report.is_clean());
    let statuses: Vec<_> = report.outcomes.iter().map(Outcome::status).collect();
    assert_eq!(statuses, vec![Status::Impossible, Status::Ok]);
    assert_eq!(
        tool.summary(),
        vec![(ArtifactKind::Source, "hello_1.0-1.dsc".to_string(), 3)]
    );
}

#[test]
fn unreachable_distribution_does_not_stop_the_pass() {
    let archive = Archive::new(&["sid", "trixie"]);
    fs::remove_dir_all(archive.upstreams.path().join("sid")).expect("drop upstream");
    archive.publish("trixie", "gamma", "gamma_1_all.deb", "g");
    let mut tool = FakeTool::new(archive.root.path());

    let report = archive.update(&mut tool);

    assert_eq!(report.outcomes.len(), 2);
    assert!(matches!(
        &report.outcomes[0],
        Outcome::Unavailable { project, .. } if project.ends_with("distributions/sid")
    ));
    assert_eq!(report.outcomes[0].record(archive.root.path()).action, "update.refresh");
    assert!(report.outcomes[1].is_ok());
}

#[test]
fn failed_manifest_is_not_retried_within_the_pass() {
    let archive = Archive::new(&["trixie"]);
    publish_hello(&archive, "trixie", "trixie");
    let mut tool = FakeTool::new(archive.root.path());
    tool.fail = true;

    let report = archive.update(&mut tool);

    let kinds: Vec<_> = tool.calls.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ArtifactKind::Manifest, ArtifactKind::Source]);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o, Outcome::Failed { reason, .. } if reason.contains("254"))));
    assert_eq!(state_store::history_at(archive.root.path()).expect("history").len(), 1);
}

#[test]
fn sink_break_stops_issuing_registrations() {
    let archive = Archive::new(&["trixie"]);
    publish_hello(&archive, "trixie", "trixie");
    let mut tool = FakeTool::new(archive.root.path());
    let mut hierarchy = archive.hierarchy();

    let mut seen = 0;
    let report = update_archive(&mut hierarchy, &archive.config, &mut tool, |outcome| {
        seen += 1;
        assert!(outcome.is_ok());
        ControlFlow::Break(())
    })
    .expect("update pass");

    assert!(report.stopped);
    assert_eq!(seen, 1);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(tool.calls.len(), 1);
}

#[test]
fn dry_run_plans_without_side_effects() {
    let archive = Archive::new(&["trixie"]);
    let pkg = archive.root.path().join("distributions/trixie/packages/hello");
    fs::create_dir_all(&pkg).expect("pkg dir");
    fs::write(
        pkg.join("hello_1.0-1.dsc"),
        dsc("hello", "1.0-1", &["hello_1.0.orig.tar.gz"]),
    )
    .expect("dsc");
    fs::write(pkg.join("hello_1.0.orig.tar.gz"), "orig").expect("orig");
    fs::write(pkg.join("hello_1.0-1_all.deb"), "deb").expect("deb");

    let mut hierarchy = archive.hierarchy();
    let plans = plan_archive(&mut hierarchy, &archive.config).expect("plan");

    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].package.name.0, "hello");
    let planned: Vec<_> = plans[0]
        .steps
        .iter()
        .map(|s| match s {
            Step::Register(p) => (p.kind, p.inputs.len()),
            Step::Settled(o) => panic!("unexpected {o:?}"),
        })
        .collect();
    assert_eq!(
        planned,
        vec![(ArtifactKind::Source, 2), (ArtifactKind::Binary, 1)]
    );
    assert!(state_store::head_at(archive.root.path()).expect("head").is_none());
}

#[test]
fn package_diff_failure_is_reported_and_the_pass_goes_on() {
    let archive = Archive::new(&["trixie"]);
    archive.publish("trixie", "aaa", "aaa_1_all.deb", "a");
    archive.publish("trixie", "zzz", "zzz_1_all.deb", "z");
    let broken = archive.root.path().join("distributions/trixie/packages/zzz");
    let mut hierarchy = BrokenScope {
        inner: archive.hierarchy(),
        broken: broken.clone(),
    };
    let mut tool = FakeTool::new(archive.root.path());
    let mut streamed = 0;

    let report = update_archive(&mut hierarchy, &archive.config, &mut tool, |_| {
        streamed += 1;
        ControlFlow::Continue(())
    })
    .expect("a single package must not abort the pass");

    assert_eq!(streamed, 2);
    assert_eq!(tool.summary(), vec![(ArtifactKind::Binary, "aaa_1_all.deb".to_string(), 1)]);
    assert!(matches!(
        &report.outcomes[1],
        Outcome::Unavailable { project, .. } if *project == broken
    ));
    assert_eq!(report.outcomes[1].status(), Status::Error);
}

#[test]
fn distribution_diff_failure_is_reported_and_the_pass_goes_on() {
    let archive = Archive::new(&["bookworm", "trixie"]);
    archive.publish("bookworm", "alpha", "alpha_1_all.deb", "a");
    archive.publish("trixie", "beta", "beta_1_all.deb", "b");
    let broken = archive.root.path().join("distributions/bookworm/packages");
    let mut hierarchy = BrokenScope {
        inner: archive.hierarchy(),
        broken,
    };
    let mut tool = FakeTool::new(archive.root.path());

    let report = update_archive(&mut hierarchy, &archive.config, &mut tool, |_| {
        ControlFlow::Continue(())
    })
    .expect("a single distribution must not abort the pass");

    assert_eq!(tool.summary(), vec![(ArtifactKind::Binary, "beta_1_all.deb".to_string(), 1)]);
    assert!(matches!(
        &report.outcomes[0],
        Outcome::Unavailable { project, .. }
            if *project == archive.root.path().join("distributions/bookworm")
    ));
}
