//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Container runtime access
//!
//! The retag pipeline only needs four operations from a runtime, so they
//! are expressed as the [`ContainerRuntime`] trait. [`DockerCli`] drives the
//! `docker` binary; tests substitute an in-memory fake.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::{debug, trace};

use super::reference::ImageReference;

/// Prefix docker prints for each image restored by `docker load`.
const LOADED_IMAGE_PREFIX: &str = "Loaded image: ";

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Runtime binary '{name}' not found: {source}")]
    NotFound {
        name: String,
        source: which::Error,
    },
    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Operations the retag pipeline performs against a container runtime.
pub trait ContainerRuntime {
    /// References of all images known to the runtime.
    fn list_images(&self) -> Result<Vec<String>, RuntimeError>;

    /// Load a saved image archive, returning the references it restored.
    fn load(&self, archive: &Path) -> Result<Vec<String>, RuntimeError>;

    fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<(), RuntimeError>;

    fn push(&self, reference: &ImageReference) -> Result<(), RuntimeError>;
}

/// Runtime backed by the docker command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Locate `program` (a name on PATH or an explicit path).
    pub fn locate(program: &str) -> Result<Self, RuntimeError> {
        let binary = which::which(program).map_err(|source| RuntimeError::NotFound {
            name: program.to_string(),
            source,
        })?;

        debug!("Using container runtime at {:?}", binary);
        Ok(Self { binary })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        trace!("Running: {}", command);

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

impl ContainerRuntime for DockerCli {
    fn list_images(&self) -> Result<Vec<String>, RuntimeError> {
        let output = self.run(&[
            "image",
            "ls",
            "--format",
            "{{.Repository}}:{{.Tag}}",
        ])?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.contains("<none>"))
            .map(str::to_string)
            .collect())
    }

    fn load(&self, archive: &Path) -> Result<Vec<String>, RuntimeError> {
        let archive = archive.to_string_lossy();
        let output = self.run(&["load", "-i", &*archive])?;
        Ok(parse_loaded_images(&String::from_utf8_lossy(&output.stdout)))
    }

    fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<(), RuntimeError> {
        let (source, target) = (source.to_string(), target.to_string());
        self.run(&["tag", source.as_str(), target.as_str()])?;
        Ok(())
    }

    fn push(&self, reference: &ImageReference) -> Result<(), RuntimeError> {
        let reference = reference.to_string();
        self.run(&["push", reference.as_str()])?;
        Ok(())
    }
}

/// Extract references from `docker load` output.
/// Image-ID-only loads (`Loaded image ID: sha256:...`) carry no reference.
fn parse_loaded_images(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(LOADED_IMAGE_PREFIX))
        .map(|reference| reference.trim().to_string())
        .filter(|reference| !reference.is_empty())
        .collect()
}
