//! TrimCut command-line front end
//!
//! # Usage
//!
//! ```bash
//! trimcut inspect --input video.mp4
//! trimcut plan --input video.mp4 --start 00:01:00 --end 00:02:00.500 --mode accurate
//! trimcut clip --input video.mp4 --start 61.2 --end 75 --output highlight.mp4
//! ```

use anyhow::Result;
use clap::Parser;

use trimcut::cli::{commands, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    commands::run(cli).await
}
