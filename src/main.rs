//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Retag and push saved container images

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use retag::cli::{self, Cli};

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    init_tracing(args.verbose, args.quiet);

    cli::execute(&args)
}

/// Log to stderr; `RUST_LOG` takes precedence over the flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
