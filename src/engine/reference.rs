//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Image reference parsing
//!
//! Splits references like `myregistry.com:5000/team/app:v2` or
//! `alpine@sha256:abcd` into registry, repository, tag and digest.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::validation::{
    validate_digest, validate_registry, validate_repository, validate_tag, ValidationError,
};

/// Registry assumed when a reference does not name one.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag assumed when a reference carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Image reference cannot be empty")]
    Empty,
    #[error("Ambiguous image reference '{reference}': {reason}")]
    Ambiguous {
        reference: String,
        reason: &'static str,
    },
    #[error("Malformed image reference '{reference}': {source}")]
    Malformed {
        reference: String,
        source: ValidationError,
    },
}

impl ParseError {
    fn malformed(reference: &str, source: ValidationError) -> Self {
        ParseError::Malformed {
            reference: reference.to_string(),
            source,
        }
    }
}

/// A parsed container image reference.
///
/// Values are immutable once parsed. Serialises as its canonical string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference string.
    ///
    /// - `ubuntu` → default registry, `ubuntu:latest`
    /// - `myregistry.com:5000/team/app:v2` → registry `myregistry.com:5000`
    /// - `alpine@sha256:abcd` → digest only, no tag
    pub fn parse(reference: &str) -> Result<Self, ParseError> {
        if reference.is_empty() {
            return Err(ParseError::Empty);
        }

        // Digest is everything after the last '@'
        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((rest, digest)) => {
                if rest.contains('@') {
                    return Err(ParseError::Ambiguous {
                        reference: reference.to_string(),
                        reason: "multiple '@' delimiters",
                    });
                }
                validate_digest(digest).map_err(|e| ParseError::malformed(reference, e))?;
                (rest, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A ':' only separates a tag when it follows the last '/';
        // earlier ones belong to a registry port.
        let last_slash = name_tag.rfind('/');
        let tag_separator = name_tag
            .rfind(':')
            .filter(|&colon| last_slash.map_or(true, |slash| colon > slash));

        let (name, tag) = match tag_separator {
            Some(colon) => {
                let tag = &name_tag[colon + 1..];
                validate_tag(tag).map_err(|e| ParseError::malformed(reference, e))?;
                (&name_tag[..colon], Some(tag.to_string()))
            }
            None => (name_tag, None),
        };

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag,
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if first.contains('.') || first.contains(':') => {
                validate_registry(first).map_err(|e| ParseError::malformed(reference, e))?;
                (Some(first.to_string()), rest)
            }
            _ => (None, name),
        };

        validate_repository(repository).map_err(|e| ParseError::malformed(reference, e))?;

        Ok(ImageReference {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Explicit registry, if the reference named one.
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// Registry the reference resolves against.
    pub fn registry_or_default(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Final path segment of the repository (`app` in `team/app`).
    pub fn name(&self) -> &str {
        self.repository
            .rsplit_once('/')
            .map_or(self.repository.as_str(), |(_, name)| name)
    }

    /// Repository path before the final segment (`team` in `team/app`),
    /// empty for single-segment repositories.
    pub fn namespace(&self) -> &str {
        self.repository
            .rsplit_once('/')
            .map_or("", |(namespace, _)| namespace)
    }

    /// Reference string with the registry always spelled out.
    pub fn full_name(&self) -> String {
        let mut s = format!("{}/{}", self.registry_or_default(), self.repository);
        if let Some(tag) = &self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }

    /// Build `<destination>/<name>:<tag>` from this reference.
    ///
    /// `tag` falls back to this reference's tag, then to `latest`. The
    /// result is parsed, so an invalid destination is reported as a
    /// `ParseError`.
    pub fn retarget(&self, destination: &str, tag: Option<&str>) -> Result<Self, ParseError> {
        let tag = tag.or(self.tag()).unwrap_or(DEFAULT_TAG);
        let destination = destination.trim_end_matches('/');
        let target = if destination.is_empty() {
            format!("{}:{}", self.name(), tag)
        } else {
            format!("{}/{}:{}", destination, self.name(), tag)
        };
        Self::parse(&target)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageReference {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageReference> for String {
    fn from(reference: ImageReference) -> Self {
        reference.to_string()
    }
}
