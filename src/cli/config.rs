//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Configuration file and settings resolution
//!
//! Command line flags and their environment variables win over the TOML
//! file, which wins over built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::cli::Cli;
use crate::engine::validation::{validate_tag, ValidationError};

/// Runtime binary used when neither flag nor file names one.
pub const DEFAULT_DOCKER: &str = "docker";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("No destination given; pass --destination or set it in the config file")]
    MissingDestination,
    #[error("Invalid --new-tag: {0}")]
    InvalidTag(#[from] ValidationError),
}

/// Defaults read from `config.toml`.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub destination: Option<String>,
    pub new_tag: Option<String>,
    pub docker: Option<String>,
    pub recursive: Option<bool>,
}

impl FileConfig {
    /// `<config_dir>/retag/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("retag").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load an explicitly requested file, or the default one if present.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub destination: String,
    pub new_tag: Option<String>,
    pub docker: String,
    pub recursive: bool,
    pub dry_run: bool,
    pub json: bool,
}

impl Settings {
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let destination = cli
            .destination
            .clone()
            .or(file.destination)
            .ok_or(ConfigError::MissingDestination)?;

        let new_tag = cli.new_tag.clone().or(file.new_tag);
        if let Some(tag) = &new_tag {
            validate_tag(tag)?;
        }

        Ok(Settings {
            destination,
            new_tag,
            docker: cli
                .docker
                .clone()
                .or(file.docker)
                .unwrap_or_else(|| DEFAULT_DOCKER.to_string()),
            recursive: cli.recursive || file.recursive.unwrap_or(false),
            dry_run: cli.dry_run,
            json: cli.json,
        })
    }
}
