// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Measures how long the GPU takes to finish frames presented to a Wayland
//! compositor.
//!
//! Each retired frame is printed to stdout as `Frame <n>: <ms> ms`. Logs go
//! to stderr; `RUST_LOG` overrides the default `info` filter.

mod cli;
mod report;

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use crate::cli::Cli;
use crate::report::LineSink;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match measure(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn measure(cli: &Cli) -> Result<ExitCode> {
    let config = cli.session_config();
    info!("framefence {}", env!("CARGO_PKG_VERSION"));

    let mut sink = LineSink::new(io::stdout().lock());
    let outcome =
        framefence_backend_wayland::run(&config, &mut sink).context("session setup failed")?;

    info!("{}", sink.stats());
    Ok(ExitCode::from(outcome.exit_code()))
}
