//! Command implementations

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::{init_logging, TomlConfigAdapter, TrimConfig};
use crate::app::{AppContainer, MediaHandle};
use crate::cli::args::{ClipArgs, InspectArgs, PlanArgs};
use crate::cli::{Cli, Commands};
use crate::domain::model::{ClipPlan, MediaInfo, PlanMode, Selection, TimeSpec};
use crate::error::TrimError;
use crate::output::next_output_path;
use crate::planner::{ClipPlanner, GopStats, KeyframeIndex};

/// Load configuration, install logging and run the selected command
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = TomlConfigAdapter::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.log_json {
        config.logging.json = true;
    }
    if cli.ffmpeg.is_some() {
        config.tools.ffmpeg = cli.ffmpeg.clone();
    }
    if cli.ffprobe.is_some() {
        config.tools.ffprobe = cli.ffprobe.clone();
    }
    if let Commands::Clip(args) = &cli.command {
        apply_clip_overrides(&mut config, args);
    }
    config.validate()?;
    init_logging(&config.logging)?;

    let container = AppContainer::new(&config);
    match cli.command {
        Commands::Inspect(args) => inspect(args, &container, &config).await,
        Commands::Plan(args) => plan(args, &container, &config).await,
        Commands::Clip(args) => clip(args, &container, &config).await,
    }
}

fn apply_clip_overrides(config: &mut TrimConfig, args: &ClipArgs) {
    if let Some(crf) = args.crf {
        config.export.crf = crf;
    }
    if let Some(preset) = &args.preset {
        config.export.preset = preset.clone();
    }
    if args.no_verify {
        config.export.verify_segments = false;
    }
}

#[derive(Serialize)]
struct InspectReport<'a> {
    media: &'a MediaInfo,
    keyframe_count: usize,
    gop: Option<GopStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keyframes: Option<&'a [f64]>,
}

/// Execute the inspect command
pub async fn inspect(args: InspectArgs, container: &AppContainer, config: &TrimConfig) -> Result<()> {
    let handle = open(&args.input, container, config).await?;
    let info = handle.info();
    let index = handle.keyframes();

    if args.json {
        let report = InspectReport {
            media: info,
            keyframe_count: index.len(),
            gop: index.gop_stats(),
            keyframes: args.keyframes.then(|| index.entries()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File:       {}", info.path.display());
    println!("Container:  {}", info.container);
    println!(
        "Duration:   {} ({:.3}s)",
        TimeSpec::from_seconds(info.duration),
        info.duration
    );
    let mut video = format!("{} @ {} fps", info.video_codec, info.frame_rate);
    if let (Some(w), Some(h)) = (info.width, info.height) {
        video.push_str(&format!(", {w}x{h}"));
    }
    if let Some(pix_fmt) = &info.pixel_format {
        video.push_str(&format!(", {pix_fmt}"));
    }
    if let Some(rate) = info.video_bit_rate {
        video.push_str(&format!(", {} kb/s", rate / 1000));
    }
    println!("Video:      {video}");
    println!(
        "Audio:      {}",
        info.audio_codec.as_deref().unwrap_or("none")
    );
    match index.gop_stats() {
        Some(gop) => println!(
            "Keyframes:  {} (GOP avg {:.3}s, min {:.3}s, max {:.3}s)",
            gop.keyframe_count, gop.avg_gop_duration, gop.min_gop_duration, gop.max_gop_duration
        ),
        None => println!("Keyframes:  {}", index.len()),
    }
    if args.keyframes {
        for t in index.entries() {
            println!("  {}", TimeSpec::from_seconds(*t));
        }
    }
    Ok(())
}

/// Execute the plan command
pub async fn plan(args: PlanArgs, container: &AppContainer, config: &TrimConfig) -> Result<()> {
    let index = match (&args.keyframes, &args.input) {
        (Some(report), _) => {
            let duration = args
                .duration
                .context("--duration is required with --keyframes")?;
            let content = std::fs::read_to_string(report)
                .with_context(|| format!("Failed to read {}", report.display()))?;
            KeyframeIndex::build(content.lines(), duration)?
        }
        (None, Some(input)) => {
            let handle = open(input, container, config).await?;
            handle.keyframes().as_ref().clone()
        }
        (None, None) => anyhow::bail!("either --input or --keyframes is required"),
    };

    let selection = parse_selection(Some(&args.start), Some(&args.end), index.duration())?;
    let mode = PlanMode::parse(&args.mode)?;
    let plan = ClipPlanner::new().plan(&selection, &index, mode)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

/// Execute the clip command
pub async fn clip(args: ClipArgs, container: &AppContainer, config: &TrimConfig) -> Result<()> {
    let handle = open(&args.input, container, config).await?;
    let selection = parse_selection(
        args.start.as_deref(),
        args.end.as_deref(),
        handle.info().duration,
    )?;
    let mode = PlanMode::parse(&args.mode)?;
    let plan = handle.plan(&selection, mode)?;
    print_plan_to_log(&plan);

    let output = match args.output {
        Some(path) => path,
        None => next_output_path(&args.input)?,
    };

    let job = container.executor().submit(&handle, plan, &output)?;
    let mut progress = job.subscribe_progress();
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let percent = *progress.borrow_and_update();
            eprint!("\rExporting... {percent:5.1}%");
            let _ = std::io::stderr().flush();
        }
    });

    let outcome = tokio::select! {
        result = job.wait() => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling export");
            job.cancel();
            job.wait().await
        }
    };
    printer.abort();
    eprintln!();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&job.report())?);
    }
    match outcome {
        Ok(path) => {
            info!("Export complete");
            if !args.json {
                println!("{}", path.display());
            }
            Ok(())
        }
        Err(TrimError::Cancelled) => anyhow::bail!("Export cancelled; no output was written"),
        Err(e) => Err(e).context("Export failed"),
    }
}

async fn open(path: &Path, container: &AppContainer, config: &TrimConfig) -> Result<MediaHandle> {
    MediaHandle::open(path, container.probe(), config.navigation)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Selection from optional time strings, defaulting to the media edges
fn parse_selection(start: Option<&str>, end: Option<&str>, duration: f64) -> Result<Selection> {
    let start = match start {
        Some(s) => TimeSpec::parse(s).with_context(|| format!("Invalid start time '{s}'"))?,
        None => TimeSpec::from_seconds(0.0),
    };
    let end = match end {
        Some(e) => TimeSpec::parse(e).with_context(|| format!("Invalid end time '{e}'"))?,
        None => TimeSpec::from_seconds(duration),
    };
    let selection = Selection::from_time_specs(start, end)?;
    selection.validate_within(duration)?;
    Ok(selection)
}

fn print_plan(plan: &ClipPlan) {
    println!("Mode:       {}", plan.mode);
    println!("Requested:  {}", plan.requested);
    println!(
        "Exported:   {} - {}",
        TimeSpec::from_seconds(plan.effective_start()),
        TimeSpec::from_seconds(plan.effective_end())
    );
    for segment in &plan.segments {
        println!(
            "  {:<8} {} - {} ({:.3}s)",
            segment.mode.to_string(),
            TimeSpec::from_seconds(segment.start),
            TimeSpec::from_seconds(segment.end),
            segment.duration()
        );
    }
}

fn print_plan_to_log(plan: &ClipPlan) {
    info!(
        "Plan: {} segment(s), {:.3}s copied of {:.3}s",
        plan.segments.len(),
        plan.copy_duration(),
        plan.duration()
    );
    for segment in &plan.segments {
        info!("  {}", segment);
    }
}
