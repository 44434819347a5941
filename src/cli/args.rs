//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Also list every keyframe timestamp
    #[arg(long)]
    pub keyframes: bool,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Input video file path
    #[arg(short, long, required_unless_present = "keyframes")]
    pub input: Option<PathBuf>,

    /// Saved `timestamp,flag` probe report to plan against instead of probing
    #[arg(long, requires = "duration", conflicts_with = "input")]
    pub keyframes: Option<PathBuf>,

    /// Media duration in seconds, required with --keyframes
    #[arg(long)]
    pub duration: Option<f64>,

    /// Start time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub start: String,

    /// End time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub end: String,

    /// Planning mode: lossless or accurate
    #[arg(long, default_value = "accurate")]
    pub mode: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the clip command
#[derive(Args, Debug)]
pub struct ClipArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Start time (HH:MM:SS.ms, MM:SS.ms, or seconds), default: start of media
    #[arg(short, long)]
    pub start: Option<String>,

    /// End time (HH:MM:SS.ms, MM:SS.ms, or seconds), default: end of media
    #[arg(short, long)]
    pub end: Option<String>,

    /// Output file path (default: <stem>_cut_<N>.<ext> beside the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Planning mode: lossless or accurate
    #[arg(long, default_value = "accurate")]
    pub mode: String,

    /// Constant Rate Factor (0-51) for re-encoded boundaries without a known bit rate
    #[arg(long, value_parser = crf_in_range)]
    pub crf: Option<u8>,

    /// Encoding preset for re-encoded boundaries
    #[arg(long)]
    pub preset: Option<String>,

    /// Skip probing segment files before joining them
    #[arg(long)]
    pub no_verify: bool,

    /// Print the job report as JSON when done
    #[arg(long)]
    pub json: bool,
}

fn crf_in_range(value: &str) -> Result<u8, String> {
    clap_num::number_range(value, 0, 51)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crf_bounds() {
        assert_eq!(crf_in_range("0"), Ok(0));
        assert_eq!(crf_in_range("51"), Ok(51));
        assert!(crf_in_range("52").is_err());
        assert!(crf_in_range("abc").is_err());
    }
}
