//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Saved image archives (`docker save` output)

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

const MANIFEST_FILE: &str = "manifest.json";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ARCHIVE_SUFFIXES: [&str; 3] = [".tar", ".tar.gz", ".tgz"];

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read archive {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Archive {0} has no manifest.json")]
    MissingManifest(PathBuf),
    #[error("Invalid manifest.json in {path}: {source}")]
    InvalidManifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to scan directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One image entry of a `docker save` manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveManifestEntry {
    pub config: String,
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
    #[serde(default)]
    pub layers: Vec<String>,
}

/// Whether a file name looks like a saved image archive.
pub fn is_image_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
        .unwrap_or(false)
}

/// List image archives under `dir`, sorted by path.
/// Only the top level is scanned unless `recursive` is set. Symlinked
/// archives are included; symlinked directories are not descended into.
pub fn find_archives(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ArchiveError> {
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut archives = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).max_depth(max_depth) {
        let entry = entry?;
        // `Path::is_file` resolves symlinks, the entry's own file type does not
        if entry.path().is_file() && is_image_archive(entry.path()) {
            archives.push(entry.into_path());
        }
    }

    archives.sort();
    Ok(archives)
}

/// Read `manifest.json` from a plain or gzip-compressed archive.
///
/// Tar has no index, so the archive is streamed until the manifest is found.
/// `docker save` writes it last, which means a compressed archive is
/// decompressed in full here and again by `docker load`.
pub fn read_manifest(path: &Path) -> Result<Vec<ArchiveManifestEntry>, ArchiveError> {
    let io_err = |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);
    let is_gzip = reader.fill_buf().map_err(io_err)?.starts_with(&GZIP_MAGIC);
    let reader: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;

        let is_manifest = {
            let entry_path = entry.path().map_err(io_err)?;
            entry_path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE)
                && entry_path
                    .parent()
                    .map_or(true, |p| p.as_os_str().is_empty() || p == Path::new("."))
        };
        if !is_manifest {
            continue;
        }

        let mut contents = String::new();
        entry.read_to_string(&mut contents).map_err(io_err)?;
        return serde_json::from_str(&contents).map_err(|source| ArchiveError::InvalidManifest {
            path: path.to_path_buf(),
            source,
        });
    }

    Err(ArchiveError::MissingManifest(path.to_path_buf()))
}

/// All `RepoTags` recorded in an archive, in manifest order.
pub fn repo_tags(path: &Path) -> Result<Vec<String>, ArchiveError> {
    Ok(read_manifest(path)?
        .into_iter()
        .flat_map(|entry| entry.repo_tags.unwrap_or_default())
        .collect())
}
