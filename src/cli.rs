// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::ResourceFormat;

/// Command-line arguments for `tilegraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tilegraph",
    version,
    about = "Rasterize a tiled scene through a prioritized task graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML), or a directory holding `Tilegraph.toml`.
    ///
    /// If omitted, the nearest `Tilegraph.toml` in the current directory or
    /// one of its parents is used.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of scheduling rounds. Overrides `[scene].rounds`.
    #[arg(long, value_name = "N")]
    pub rounds: Option<u32>,

    /// Worker threads. Overrides `[pool].workers`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Destination pixel format. Overrides `[playback].format`.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ResourceFormat>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TILEGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the config and print the tiling, but don't raster anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
