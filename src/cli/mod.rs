//! CLI module for TrimCut
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

pub use args::{ClipArgs, InspectArgs, PlanArgs};

/// TrimCut - frame-accurate, lossless video trimming
///
/// Copies whole GOPs without re-encoding and re-encodes only the partial GOPs
/// at the edges of a selection, driving FFmpeg as external processes.
#[derive(Parser, Debug)]
#[command(name = "trimcut")]
#[command(about = "Frame-accurate, lossless video trimming driven by FFmpeg")]
#[command(version)]
pub struct Cli {
    /// Logging level (overrides the config file; RUST_LOG overrides both)
    #[arg(long, global = true, env = "TRIMCUT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file path
    #[arg(long, global = true, env = "TRIMCUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long, global = true, env = "TRIMCUT_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,

    /// ffprobe executable
    #[arg(long, global = true, env = "TRIMCUT_FFPROBE")]
    pub ffprobe: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show media properties and keyframe statistics
    Inspect(InspectArgs),
    /// Show the copy/re-encode segments a selection would be exported as
    Plan(PlanArgs),
    /// Export a selection to a new file
    Clip(ClipArgs),
}
