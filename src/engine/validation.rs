//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Shape checks for the components of an image reference

use thiserror::Error;

/// Longest tag accepted by registries.
const MAX_TAG_LENGTH: usize = 128;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid registry: {0}")]
    InvalidRegistry(String),
    #[error("Invalid repository: {0}")]
    InvalidRepository(String),
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
}

/// Validate a registry host with an optional `:port` suffix.
/// Hosts are letters, digits, dots and hyphens; ports are digits only.
pub fn validate_registry(registry: &str) -> Result<(), ValidationError> {
    let (host, port) = match registry.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (registry, None),
    };

    if host.is_empty() {
        return Err(ValidationError::InvalidRegistry(
            "Registry host cannot be empty".to_string(),
        ));
    }

    for ch in host.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '-' {
            return Err(ValidationError::InvalidRegistry(format!(
                "Invalid character '{}' in registry host",
                ch
            )));
        }
    }

    if let Some(port) = port {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidRegistry(format!(
                "Registry port must be numeric, got '{}'",
                port
            )));
        }
    }

    Ok(())
}

/// Validate a repository path.
/// Only lowercase alphanumerics, `.`, `_`, `-` and `/` are allowed,
/// and every `/`-separated segment must be non-empty.
pub fn validate_repository(repository: &str) -> Result<(), ValidationError> {
    if repository.is_empty() {
        return Err(ValidationError::InvalidRepository(
            "Repository cannot be empty".to_string(),
        ));
    }

    for ch in repository.chars() {
        let allowed = ch.is_ascii_lowercase()
            || ch.is_ascii_digit()
            || ch == '.'
            || ch == '_'
            || ch == '-'
            || ch == '/';
        if !allowed {
            return Err(ValidationError::InvalidRepository(format!(
                "Invalid character '{}' in repository",
                ch
            )));
        }
    }

    if repository.split('/').any(str::is_empty) {
        return Err(ValidationError::InvalidRepository(format!(
            "Empty path segment in repository '{}'",
            repository
        )));
    }

    Ok(())
}

/// Validate a tag: up to 128 characters of `[A-Za-z0-9_.-]`,
/// not starting with `.` or `-`.
pub fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    if tag.is_empty() {
        return Err(ValidationError::InvalidTag(
            "Tag cannot be empty".to_string(),
        ));
    }

    if tag.len() > MAX_TAG_LENGTH {
        return Err(ValidationError::InvalidTag(format!(
            "Tag exceeds maximum length of {} characters",
            MAX_TAG_LENGTH
        )));
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(ValidationError::InvalidTag(
            "Tag must start with a letter, number or underscore".to_string(),
        ));
    }

    for ch in tag.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' && ch != '.' && ch != '-' {
            return Err(ValidationError::InvalidTag(format!(
                "Invalid character '{}' in tag",
                ch
            )));
        }
    }

    Ok(())
}

/// Validate a digest of the form `algorithm:hex`.
pub fn validate_digest(digest: &str) -> Result<(), ValidationError> {
    let Some((algorithm, hex_part)) = digest.split_once(':') else {
        return Err(ValidationError::InvalidDigest(format!(
            "Digest '{}' must have the form algorithm:hex",
            digest
        )));
    };

    if algorithm.is_empty() {
        return Err(ValidationError::InvalidDigest(
            "Digest algorithm cannot be empty".to_string(),
        ));
    }

    for ch in algorithm.chars() {
        let allowed = ch.is_ascii_lowercase()
            || ch.is_ascii_digit()
            || ch == '+'
            || ch == '.'
            || ch == '_'
            || ch == '-';
        if !allowed {
            return Err(ValidationError::InvalidDigest(format!(
                "Invalid character '{}' in digest algorithm",
                ch
            )));
        }
    }

    if hex_part.is_empty() {
        return Err(ValidationError::InvalidDigest(
            "Digest hex cannot be empty".to_string(),
        ));
    }

    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidDigest(
            "Digest must contain only hex characters after the algorithm".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_registries() {
        assert!(validate_registry("docker.io").is_ok());
        assert!(validate_registry("myregistry.com:5000").is_ok());
        assert!(validate_registry("localhost:5000").is_ok());
        assert!(validate_registry("my-registry.example.com").is_ok());
    }

    #[test]
    fn test_invalid_registries() {
        assert!(validate_registry("").is_err());
        assert!(validate_registry(":5000").is_err());
        assert!(validate_registry("host:").is_err());
        assert!(validate_registry("host:50a0").is_err());
        assert!(validate_registry("bad_host.io").is_err());
    }

    #[test]
    fn test_valid_repositories() {
        assert!(validate_repository("ubuntu").is_ok());
        assert!(validate_repository("team/app").is_ok());
        assert!(validate_repository("group/sub_group/my-app.v2").is_ok());
    }

    #[test]
    fn test_invalid_repositories() {
        assert!(validate_repository("").is_err());
        assert!(validate_repository("Repo/UPPER").is_err());
        assert!(validate_repository("team//app").is_err());
        assert!(validate_repository("/app").is_err());
        assert!(validate_repository("app/").is_err());
        assert!(validate_repository("has space").is_err());
    }

    #[test]
    fn test_tag_validation() {
        assert!(validate_tag("latest").is_ok());
        assert!(validate_tag("v1.0.0-rc_1").is_ok());
        assert!(validate_tag("_internal").is_ok());
        assert!(validate_tag("a".repeat(128).as_str()).is_ok());

        assert!(validate_tag("").is_err());
        assert!(validate_tag(".hidden").is_err());
        assert!(validate_tag("-dash").is_err());
        assert!(validate_tag("with/slash").is_err());
        assert!(validate_tag("a".repeat(129).as_str()).is_err());
    }

    #[test]
    fn test_digest_validation() {
        let valid = "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4";
        assert!(validate_digest(valid).is_ok());
        assert!(validate_digest("sha256:abcd").is_ok());

        assert!(validate_digest("sha256").is_err()); // No separator
        assert!(validate_digest(":abcd").is_err()); // Empty algorithm
        assert!(validate_digest("sha256:").is_err()); // Empty hex
        assert!(validate_digest("sha256:gggg").is_err()); // Invalid hex
        assert!(validate_digest("SHA256:abcd").is_err()); // Uppercase algorithm
    }
}
