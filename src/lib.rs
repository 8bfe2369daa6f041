//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Container image reference parsing and saved-image retagging
//!
//! [`engine::ImageReference`] splits references such as
//! `myregistry.com:5000/team/app:v2` into their parts. The [`cli`] module
//! drives the `retag_and_push_from_dir` tool on top of it.

pub mod cli;
pub mod engine;
