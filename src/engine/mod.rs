//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Image references, saved archives and runtime access

pub mod archive;
pub mod reference;
pub mod runtime;
pub mod validation;

pub use archive::{find_archives, repo_tags, ArchiveError};
pub use reference::{ImageReference, ParseError, DEFAULT_REGISTRY, DEFAULT_TAG};
pub use runtime::{ContainerRuntime, DockerCli, RuntimeError};
pub use validation::ValidationError;
