//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Command line interface

pub mod config;
pub mod retag;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, warn};

use crate::engine::{find_archives, ContainerRuntime, DockerCli};
use config::{FileConfig, Settings};
use retag::RetagPlan;

/// Retag saved container images and push them to a new registry.
///
/// Every `*.tar`, `*.tar.gz` and `*.tgz` archive in DIRECTORY is loaded,
/// each image it contains is tagged as DESTINATION/NAME:TAG and pushed.
#[derive(Parser, Debug)]
#[command(name = "retag_and_push_from_dir", version)]
pub struct Cli {
    /// Directory containing saved image archives
    pub directory: PathBuf,

    /// Registry and path prefix for retagged images (e.g. registry.example.com/team)
    #[arg(short, long, env = "RETAG_DESTINATION")]
    pub destination: Option<String>,

    /// Tag applied to every retagged image (defaults to each source tag)
    #[arg(short = 't', long, env = "RETAG_NEW_TAG")]
    pub new_tag: Option<String>,

    /// Docker binary name or path
    #[arg(long, env = "RETAG_DOCKER")]
    pub docker: Option<String>,

    /// Config file (defaults to <config dir>/retag/config.toml when present)
    #[arg(short, long, env = "RETAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also scan subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Show what would be tagged and pushed without touching the runtime
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn execute(cli: &Cli) -> Result<ExitCode> {
    let file = FileConfig::discover(cli.config.as_deref()).context("Failed to load configuration")?;
    let settings = Settings::resolve(cli, file)?;
    debug!("Settings: {:?}", settings);

    if !cli.directory.is_dir() {
        bail!(
            "Image directory {} does not exist or is not a directory",
            cli.directory.display()
        );
    }

    let archives = find_archives(&cli.directory, settings.recursive)
        .with_context(|| format!("Failed to scan {}", cli.directory.display()))?;
    if archives.is_empty() {
        warn!("No image archives found in {}", cli.directory.display());
    }

    let docker;
    let runtime: Option<&dyn ContainerRuntime> = if settings.dry_run {
        None
    } else {
        docker = DockerCli::locate(&settings.docker).context("Container runtime unavailable")?;
        debug!("Runtime binary: {}", docker.binary().display());
        Some(&docker)
    };

    let plan = RetagPlan {
        destination: &settings.destination,
        new_tag: settings.new_tag.as_deref(),
    };
    let report = retag::run(runtime, &archives, &plan);

    if settings.json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else if !report.outcomes.is_empty() {
        println!("{}", report.to_table());
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
