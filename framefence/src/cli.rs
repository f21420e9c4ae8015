// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command-line surface.

use clap::Parser;
use framefence_backend_wayland::{DEFAULT_ITERATIONS, SessionConfig};
use framefence_core::frame_loop::LoopConfig;
use framefence_core::scheduler::PacingMode;
use framefence_core::window::{Size, SizePolicy};

#[derive(Debug, Parser)]
#[command(name = "framefence", version)]
#[command(about = "Measure GPU completion latency of frames presented to a Wayland compositor")]
pub(crate) struct Cli {
    /// Fractal iterations per pixel; raises the GPU cost of every frame
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_ITERATIONS)]
    pub(crate) iterations: u32,

    /// Render at a fixed size instead of the one the compositor proposes
    #[arg(short, long, value_name = "WxH", value_parser = parse_size)]
    pub(crate) fixed_size: Option<Size>,

    /// Stop submitting after N frames and exit once they are measured
    #[arg(short = 'l', long, value_name = "N")]
    pub(crate) max_frames: Option<u64>,

    /// Submit frames as fast as possible, ignoring frame callbacks
    #[arg(short, long, conflicts_with = "chain")]
    pub(crate) unsynchronized: bool,

    /// Submit each frame only after the previous one was presented
    #[arg(short, long)]
    pub(crate) chain: bool,

    /// Multisample count for the EGL config
    #[arg(short, long, value_name = "N")]
    pub(crate) samples: Option<u32>,

    /// Enable debug logging
    #[arg(short, long)]
    pub(crate) debug: bool,
}

impl Cli {
    pub(crate) fn pacing(&self) -> PacingMode {
        if self.unsynchronized {
            PacingMode::Unthrottled
        } else if self.chain {
            PacingMode::SelfChaining
        } else {
            PacingMode::VsyncGated
        }
    }

    pub(crate) fn session_config(&self) -> SessionConfig {
        SessionConfig {
            iterations: self.iterations,
            samples: self.samples,
            frame_loop: LoopConfig {
                pacing: self.pacing(),
                max_frames: self.max_frames,
                size_policy: SizePolicy {
                    fixed: self.fixed_size,
                },
            },
        }
    }
}

/// Parses `WIDTHxHEIGHT`, both positive.
pub(crate) fn parse_size(value: &str) -> Result<Size, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let parse = |dim: &str| {
        dim.trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid dimension `{dim}`: {err}"))
    };
    let size = Size::new(parse(width)?, parse(height)?);
    if size.width == 0 || size.height == 0 {
        return Err(format!("dimensions must be positive, got {size}"));
    }
    Ok(size)
}
