//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Retag-and-push pipeline
//!
//! Archives are processed one at a time. Each reference found in an
//! archive is parsed, retargeted under the destination, tagged and pushed.
//! A failure is recorded against its image and processing moves on.

use std::fmt;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

use crate::engine::{repo_tags, ContainerRuntime, ImageReference, DEFAULT_REGISTRY};

/// Step at which an image failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Archive,
    Parse,
    Load,
    Tag,
    Push,
}

impl Stage {
    /// Stages whose failures are logged at error level.
    pub fn is_publish(self) -> bool {
        matches!(self, Stage::Tag | Stage::Push)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Archive => "archive",
            Stage::Parse => "parse",
            Stage::Load => "load",
            Stage::Tag => "tag",
            Stage::Push => "push",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Status {
    Pushed,
    /// Dry run: the target was computed but nothing was sent to the runtime.
    Planned,
    Failed { stage: Stage, message: String },
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pushed => f.write_str("pushed"),
            Status::Planned => f.write_str("planned"),
            Status::Failed { stage, message } => write!(f, "{} failed: {}", stage, message),
        }
    }
}

/// Result for one source image (or for a whole archive that could not be read).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetagOutcome {
    pub archive: PathBuf,
    pub source: Option<String>,
    pub target: Option<ImageReference>,
    #[serde(flatten)]
    pub status: Status,
}

impl RetagOutcome {
    fn failed(
        archive: &Path,
        source: Option<&str>,
        target: Option<ImageReference>,
        stage: Stage,
        error: impl fmt::Display,
    ) -> Self {
        let message = error.to_string();
        let subject = match source {
            Some(source) => source.to_string(),
            None => archive.display().to_string(),
        };
        if stage.is_publish() {
            error!("{}: {} failed: {}", subject, stage, message);
        } else {
            warn!("{}: {} failed: {}", subject, stage, message);
        }

        RetagOutcome {
            archive: archive.to_path_buf(),
            source: source.map(str::to_string),
            target,
            status: Status::Failed { stage, message },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, Status::Failed { .. })
    }
}

/// Where retagged images go.
#[derive(Debug, Clone, Copy)]
pub struct RetagPlan<'a> {
    /// Registry and path prefix, e.g. `registry.example.com/team`.
    pub destination: &'a str,
    /// Tag for every target; each source keeps its own tag when unset.
    pub new_tag: Option<&'a str>,
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub outcomes: Vec<RetagOutcome>,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "ARCHIVE")]
    archive: String,
    #[tabled(rename = "SOURCE")]
    source: String,
    #[tabled(rename = "TARGET")]
    target: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

impl Report {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// True when at least one image was handled and none failed.
    pub fn succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.failures() == 0
    }

    pub fn to_table(&self) -> String {
        let rows = self.outcomes.iter().map(|o| ReportRow {
            archive: o
                .archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| o.archive.display().to_string()),
            source: o.source.clone().unwrap_or_else(|| "-".to_string()),
            target: o
                .target
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            status: o.status.to_string(),
        });

        Table::new(rows).with(Style::sharp()).to_string()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Run the pipeline over `archives`.
///
/// With no runtime this is a dry run: archives are read and targets are
/// computed, but nothing is loaded, tagged or pushed.
pub fn run(
    runtime: Option<&dyn ContainerRuntime>,
    archives: &[PathBuf],
    plan: &RetagPlan<'_>,
) -> Report {
    let mut report = Report::default();
    for archive in archives {
        process_archive(runtime, archive, plan, &mut report.outcomes);
    }

    info!(
        "Processed {} image(s) from {} archive(s), {} failed",
        report.outcomes.len(),
        archives.len(),
        report.failures()
    );
    report
}

fn process_archive(
    runtime: Option<&dyn ContainerRuntime>,
    archive: &Path,
    plan: &RetagPlan<'_>,
    outcomes: &mut Vec<RetagOutcome>,
) {
    let size = std::fs::metadata(archive)
        .map(|m| ByteSize(m.len()).to_string())
        .unwrap_or_else(|_| "unknown size".to_string());
    info!("Processing {} ({})", archive.display(), size);

    let mut sources = match repo_tags(archive) {
        Ok(sources) => sources,
        Err(e) => {
            outcomes.push(RetagOutcome::failed(archive, None, None, Stage::Archive, e));
            return;
        }
    };

    let mut available = None;
    if let Some(runtime) = runtime {
        match runtime.load(archive) {
            Ok(loaded) if sources.is_empty() => sources = loaded,
            Ok(_) => {}
            Err(e) => {
                outcomes.push(RetagOutcome::failed(archive, None, None, Stage::Load, e));
                return;
            }
        }

        match runtime.list_images() {
            Ok(images) => available = Some(images),
            Err(e) => warn!("Could not list images after loading: {}", e),
        }
    }

    if sources.is_empty() {
        outcomes.push(RetagOutcome::failed(
            archive,
            None,
            None,
            Stage::Archive,
            "archive records no image references",
        ));
        return;
    }

    for source in &sources {
        outcomes.push(retag_one(runtime, archive, source, available.as_deref(), plan));
    }
}

fn retag_one(
    runtime: Option<&dyn ContainerRuntime>,
    archive: &Path,
    source: &str,
    available: Option<&[String]>,
    plan: &RetagPlan<'_>,
) -> RetagOutcome {
    let parsed = match ImageReference::parse(source) {
        Ok(parsed) => parsed,
        Err(e) => return RetagOutcome::failed(archive, Some(source), None, Stage::Parse, e),
    };

    let target = match parsed.retarget(plan.destination, plan.new_tag) {
        Ok(target) => target,
        Err(e) => return RetagOutcome::failed(archive, Some(source), None, Stage::Parse, e),
    };

    let outcome = |status| RetagOutcome {
        archive: archive.to_path_buf(),
        source: Some(source.to_string()),
        target: Some(target.clone()),
        status,
    };

    let Some(runtime) = runtime else {
        info!("Would tag {} as {}", parsed, target);
        return outcome(Status::Planned);
    };

    if let Some(available) = available {
        let listed = available
            .iter()
            .filter_map(|image| ImageReference::parse(image).ok())
            .any(|image| same_image(&image, &parsed));
        if !listed {
            warn!("{} is not listed by the runtime after loading", parsed);
        }
    }

    if let Err(e) = runtime.tag(&parsed, &target) {
        return RetagOutcome::failed(archive, Some(source), Some(target.clone()), Stage::Tag, e);
    }
    info!("Tagged {} as {}", parsed, target);

    if let Err(e) = runtime.push(&target) {
        return RetagOutcome::failed(archive, Some(source), Some(target.clone()), Stage::Push, e);
    }
    info!("Pushed {}", target);

    outcome(Status::Pushed)
}

/// Compare two references the way the default registry resolves them,
/// so `nginx` and `docker.io/library/nginx` match.
fn same_image(a: &ImageReference, b: &ImageReference) -> bool {
    fn normalized(r: &ImageReference) -> (&str, &str) {
        let registry = r.registry_or_default();
        let repository = if registry == DEFAULT_REGISTRY {
            r.repository()
                .strip_prefix("library/")
                .unwrap_or(r.repository())
        } else {
            r.repository()
        };
        (registry, repository)
    }

    normalized(a) == normalized(b) && a.tag() == b.tag() && a.digest() == b.digest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::archive::tests::write_archive;
    use crate::engine::runtime::tests::FakeRuntime;
    use tempfile::TempDir;

    const PLAN: RetagPlan<'static> = RetagPlan {
        destination: "registry.example.com/team",
        new_tag: Some("2024.1"),
    };

    fn archive_with(dir: &TempDir, name: &str, tags: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let manifest = serde_json::json!([{
            "Config": "blobs/sha256/cfg",
            "RepoTags": tags,
            "Layers": [],
        }]);
        write_archive(&path, Some(&manifest.to_string()), true);
        path
    }

    #[test]
    fn test_tags_and_pushes_every_source() {
        let dir = TempDir::new().unwrap();
        let archive = archive_with(&dir, "web.tar.gz", &["quay.io/proj/web:v1", "api:latest"]);
        let runtime = FakeRuntime {
            loaded: vec!["quay.io/proj/web:v1".to_string(), "api:latest".to_string()],
            ..Default::default()
        };

        let report = run(Some(&runtime), &[archive.clone()], &PLAN);

        assert!(report.succeeded());
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(
            *runtime.calls.borrow(),
            vec![
                format!("load {}", archive.display()),
                "list".to_string(),
                "tag quay.io/proj/web:v1 registry.example.com/team/web:2024.1".to_string(),
                "push registry.example.com/team/web:2024.1".to_string(),
                "tag api:latest registry.example.com/team/api:2024.1".to_string(),
                "push registry.example.com/team/api:2024.1".to_string(),
            ]
        );
    }

    #[test]
    fn test_failures_are_recorded_and_processing_continues() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("a-broken.tar");
        write_archive(&broken, None, false);
        let archive = archive_with(
            &dir,
            "b-images.tar.gz",
            &["Bad/Name:v1", "web:v1", "api:v1", "db:v1"],
        );

        let runtime = FakeRuntime {
            fail_tag_for: Some("api:v1".to_string()),
            fail_push_for: Some("registry.example.com/team/db:2024.1".to_string()),
            ..Default::default()
        };

        let report = run(Some(&runtime), &[broken, archive], &PLAN);
        let statuses: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| match &o.status {
                Status::Failed { stage, .. } => stage.to_string(),
                other => other.to_string(),
            })
            .collect();

        assert_eq!(statuses, vec!["archive", "parse", "pushed", "tag", "push"]);
        assert_eq!(report.failures(), 4);
        assert!(!report.succeeded());
    }

    #[test]
    fn test_publish_stages() {
        assert!(Stage::Tag.is_publish());
        assert!(Stage::Push.is_publish());
        assert!(!Stage::Archive.is_publish());
        assert!(!Stage::Parse.is_publish());
        assert!(!Stage::Load.is_publish());
    }

    #[test]
    fn test_load_failure_skips_archive() {
        let dir = TempDir::new().unwrap();
        let archive = archive_with(&dir, "web.tar.gz", &["web:v1"]);
        let runtime = FakeRuntime {
            fail_load: true,
            ..Default::default()
        };

        let report = run(Some(&runtime), &[archive], &PLAN);
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(
            report.outcomes[0].status,
            Status::Failed {
                stage: Stage::Load,
                ..
            }
        ));
        assert_eq!(runtime.calls.borrow().len(), 1);
    }

    #[test]
    fn test_sources_fall_back_to_loaded_references() {
        let dir = TempDir::new().unwrap();
        let archive = archive_with(&dir, "untagged.tar.gz", &[]);
        let runtime = FakeRuntime {
            loaded: vec!["ghcr.io/org/worker:v3".to_string()],
            ..Default::default()
        };

        let plan = RetagPlan {
            destination: "registry.example.com/team",
            new_tag: None,
        };
        let report = run(Some(&runtime), &[archive], &plan);

        assert!(report.succeeded());
        assert_eq!(
            report.outcomes[0].target.as_ref().map(ToString::to_string),
            Some("registry.example.com/team/worker:v3".to_string())
        );
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let archive = archive_with(&dir, "web.tar.gz", &["web:v1"]);

        let report = run(None, &[archive], &PLAN);

        assert!(report.succeeded());
        assert_eq!(report.outcomes[0].status, Status::Planned);
        assert!(report.to_table().contains("registry.example.com/team/web:2024.1"));
    }

    #[test]
    fn test_empty_report_is_not_success() {
        let report = run(None, &[], &PLAN);
        assert!(!report.succeeded());
    }

    #[test]
    fn test_json_report() {
        let dir = TempDir::new().unwrap();
        let archive = archive_with(&dir, "web.tar.gz", &["web:v1"]);
        let report = run(None, &[archive], &PLAN);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let outcome = &json["outcomes"][0];
        assert_eq!(outcome["source"], "web:v1");
        assert_eq!(outcome["target"], "registry.example.com/team/web:2024.1");
        assert_eq!(outcome["status"], "planned");
    }

    #[test]
    fn test_same_image_normalizes_default_registry() {
        let a = ImageReference::parse("nginx:1.25").unwrap();
        let b = ImageReference::parse("docker.io/library/nginx:1.25").unwrap();
        let c = ImageReference::parse("ghcr.io/library/nginx:1.25").unwrap();
        assert!(same_image(&a, &b));
        assert!(!same_image(&a, &c));
    }
}
