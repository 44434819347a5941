//! FFmpeg execution adapter
//!
//! Each [`ToolRequest`] becomes one `ffmpeg` child process. Progress is read
//! from `-progress pipe:1` on stdout, diagnostics from stderr. A run only
//! counts as successful when ffmpeg exits cleanly *and* its progress stream
//! reached `progress=end`.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, instrument, warn};

use crate::error::{TrimError, TrimResult};
use crate::ports::{CancelSignal, ExecutePort, ProgressSink, ReencodeParams, ToolRequest};
use crate::utils::{spawn_error, tool_command};

/// Name of the concat list written into the request's work directory
pub const CONCAT_LIST_FILE: &str = "concat.txt";

/// Encoder settings used for re-encoded segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    /// x264/x265 preset
    pub preset: String,
    /// Constant rate factor when the source bit rate is unknown
    pub crf: u8,
    /// Encoder threads
    pub threads: usize,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            preset: "medium".to_string(),
            crf: 18,
            threads: num_cpus::get(),
        }
    }
}

/// One parsed `key=value` line of ffmpeg's progress stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Seconds of output written so far
    OutTime(f64),
    /// `progress=continue`
    Continue,
    /// `progress=end`, the final block
    End,
}

/// Parse one line of `-progress` output. Unknown keys and `N/A` values yield `None`.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    match key.trim() {
        // out_time_ms carries microseconds as well
        "out_time_us" | "out_time_ms" => value
            .parse::<i64>()
            .ok()
            .map(|us| ProgressEvent::OutTime(us.max(0) as f64 / 1_000_000.0)),
        "out_time" => parse_clock(value).map(ProgressEvent::OutTime),
        "progress" if value == "end" => Some(ProgressEvent::End),
        "progress" => Some(ProgressEvent::Continue),
        _ => None,
    }
}

/// Parse `HH:MM:SS.micro`
fn parse_clock(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours = parts.next()?.parse::<f64>().ok()?;
    let minutes = parts.next()?.parse::<f64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || hours < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// FFmpeg-based execution adapter
#[derive(Debug, Clone)]
pub struct FfmpegAdapter {
    program: PathBuf,
    settings: EncodeSettings,
}

impl FfmpegAdapter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            settings: EncodeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EncodeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for `request`
    pub fn build_args(&self, request: &ToolRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-nostats", "-v", "error"]
            .iter()
            .map(OsString::from)
            .collect();
        args.extend(["-progress", "pipe:1"].map(OsString::from));

        match request {
            ToolRequest::StreamCopy {
                source,
                start,
                end,
                output,
            } => {
                push_range(&mut args, source, *start, *end);
                push_stream_maps(&mut args);
                args.extend(["-c", "copy", "-avoid_negative_ts", "make_zero"].map(OsString::from));
                push_output(&mut args, output);
            }
            ToolRequest::Reencode {
                source,
                start,
                end,
                params,
                output,
            } => {
                push_range(&mut args, source, *start, *end);
                push_stream_maps(&mut args);
                self.push_video_encoder(&mut args, params);
                push_audio_encoder(&mut args, params);
                args.extend(["-avoid_negative_ts", "make_zero"].map(OsString::from));
                push_output(&mut args, output);
            }
            ToolRequest::Concat {
                work_dir, output, ..
            } => {
                args.extend(["-f", "concat", "-safe", "0", "-i"].map(OsString::from));
                args.push(work_dir.join(CONCAT_LIST_FILE).into_os_string());
                args.extend(["-map", "0", "-c", "copy"].map(OsString::from));
                push_output(&mut args, output);
            }
        }
        args
    }

    fn push_video_encoder(&self, args: &mut Vec<OsString>, params: &ReencodeParams) {
        let encoder = video_encoder(&params.video_codec);
        args.extend(["-c:v", encoder].map(OsString::from));
        if let Some(pix_fmt) = &params.pixel_format {
            args.extend(["-pix_fmt", pix_fmt.as_str()].map(OsString::from));
        }
        if let (Some(width), Some(height)) = (params.width, params.height) {
            args.push("-s:v".into());
            args.push(format!("{width}x{height}").into());
        }
        match params.video_bit_rate {
            Some(rate) => {
                args.push("-b:v".into());
                args.push(rate.to_string().into());
            }
            None => {
                args.push("-crf".into());
                args.push(self.settings.crf.to_string().into());
            }
        }
        if matches!(encoder, "libx264" | "libx265") {
            args.extend(["-preset", self.settings.preset.as_str()].map(OsString::from));
        }
        args.push("-threads".into());
        args.push(self.settings.threads.max(1).to_string().into());
    }

    async fn run_process(
        &self,
        request: &ToolRequest,
        progress: ProgressSink<'_>,
        mut cancel: CancelSignal,
    ) -> TrimResult<()> {
        let args = self.build_args(request);
        debug!(program = %self.program.display(), ?args, "Running ffmpeg");

        let mut child = tool_command(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.program, e))?;

        // drained concurrently so a full stderr pipe cannot stall ffmpeg
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let mut reached_end = false;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => match parse_progress_line(&line) {
                            Some(ProgressEvent::OutTime(seconds)) => progress(seconds),
                            Some(ProgressEvent::End) => reached_end = true,
                            Some(ProgressEvent::Continue) | None => {}
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Lost ffmpeg progress stream: {}", e);
                            break;
                        }
                    },
                    _ = cancel.cancelled() => {
                        kill(&mut child).await;
                        return Err(TrimError::Cancelled);
                    }
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| {
                TrimError::export_failed(format!("Failed to wait for ffmpeg: {e}"))
            })?,
            _ = cancel.cancelled() => {
                kill(&mut child).await;
                return Err(TrimError::Cancelled);
            }
        };

        let diagnostics = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(TrimError::export_failed(format!(
                "ffmpeg {} step exited with {}: {}",
                request.kind(),
                status,
                summarize(&diagnostics)
            )));
        }
        if !reached_end {
            return Err(TrimError::export_failed(format!(
                "ffmpeg {} step ended without completing its progress report: {}",
                request.kind(),
                summarize(&diagnostics)
            )));
        }
        if !diagnostics.trim().is_empty() {
            debug!("ffmpeg diagnostics: {}", diagnostics.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutePort for FfmpegAdapter {
    #[instrument(skip_all, fields(kind = request.kind(), output = %request.output().display()))]
    async fn run(
        &self,
        request: &ToolRequest,
        progress: ProgressSink<'_>,
        cancel: CancelSignal,
    ) -> TrimResult<()> {
        if cancel.is_cancelled() {
            return Err(TrimError::Cancelled);
        }
        if let ToolRequest::Concat {
            inputs, work_dir, ..
        } = request
        {
            let list = concat_list(inputs);
            tokio::fs::write(work_dir.join(CONCAT_LIST_FILE), list)
                .await
                .map_err(|e| {
                    TrimError::export_failed(format!("Cannot write concat list: {e}"))
                })?;
        }
        self.run_process(request, progress, cancel).await
    }
}

async fn kill(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill ffmpeg: {}", e);
    }
}

fn push_range(args: &mut Vec<OsString>, source: &Path, start: f64, end: f64) {
    args.push("-ss".into());
    args.push(format_seconds(start).into());
    args.push("-i".into());
    args.push(source.as_os_str().to_os_string());
    args.push("-t".into());
    args.push(format_seconds(end - start).into());
}

fn push_stream_maps(args: &mut Vec<OsString>) {
    args.extend(["-map", "0:v:0", "-map", "0:a?"].map(OsString::from));
}

fn push_output(args: &mut Vec<OsString>, output: &Path) {
    args.push("-y".into());
    args.push(output.as_os_str().to_os_string());
}

fn push_audio_encoder(args: &mut Vec<OsString>, params: &ReencodeParams) {
    let Some(codec) = params.audio_codec.as_deref() else {
        return;
    };
    args.extend(["-c:a", audio_encoder(codec)].map(OsString::from));
    if let Some(rate) = params.audio_bit_rate {
        args.push("-b:a".into());
        args.push(rate.to_string().into());
    }
}

fn format_seconds(seconds: f64) -> String {
    format!("{:.6}", seconds.max(0.0))
}

/// Encoder producing the same codec as the source
pub fn video_encoder(codec: &str) -> &'static str {
    match codec {
        "h264" => "libx264",
        "hevc" | "h265" => "libx265",
        "vp9" => "libvpx-vp9",
        "vp8" => "libvpx",
        "av1" => "libsvtav1",
        "mpeg4" => "mpeg4",
        "mpeg2video" => "mpeg2video",
        "prores" => "prores_ks",
        "mjpeg" => "mjpeg",
        _ => "libx264",
    }
}

pub fn audio_encoder(codec: &str) -> &'static str {
    match codec {
        "aac" => "aac",
        "mp3" => "libmp3lame",
        "opus" => "libopus",
        "vorbis" => "libvorbis",
        "ac3" => "ac3",
        "eac3" => "eac3",
        "flac" => "flac",
        "pcm_s16le" => "pcm_s16le",
        "pcm_s24le" => "pcm_s24le",
        _ => "aac",
    }
}

/// Contents of a concat demuxer list for `inputs`
pub fn concat_list(inputs: &[PathBuf]) -> String {
    let mut list = String::new();
    for input in inputs {
        let escaped = input.to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(list, "file '{escaped}'");
    }
    list
}

/// Last few lines of tool diagnostics
fn summarize(diagnostics: &str) -> String {
    let lines: Vec<&str> = diagnostics
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return "no diagnostics".to_string();
    }
    lines[lines.len().saturating_sub(5)..].join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> FfmpegAdapter {
        FfmpegAdapter::new("ffmpeg").with_settings(EncodeSettings {
            preset: "fast".to_string(),
            crf: 20,
            threads: 2,
        })
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn window(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_parse_progress_lines() {
        assert_eq!(
            parse_progress_line("out_time_us=1500000"),
            Some(ProgressEvent::OutTime(1.5))
        );
        assert_eq!(
            parse_progress_line("out_time_ms=250000"),
            Some(ProgressEvent::OutTime(0.25))
        );
        assert_eq!(
            parse_progress_line("out_time=00:01:02.500000"),
            Some(ProgressEvent::OutTime(62.5))
        );
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
        assert_eq!(parse_progress_line("progress=continue"), Some(ProgressEvent::Continue));
        assert_eq!(parse_progress_line("progress=end\n"), Some(ProgressEvent::End));
        assert_eq!(parse_progress_line("speed=2.5x"), None);
        assert_eq!(parse_progress_line("garbage"), None);
    }

    #[test]
    fn test_copy_args() {
        let args = strings(adapter().build_args(&ToolRequest::StreamCopy {
            source: PathBuf::from("in.mp4"),
            start: 1.2,
            end: 3.6,
            output: PathBuf::from("seg.mp4"),
        }));
        assert_eq!(window(&args, "-ss").as_deref(), Some("1.200000"));
        assert_eq!(window(&args, "-t").as_deref(), Some("2.400000"));
        assert_eq!(window(&args, "-c").as_deref(), Some("copy"));
        assert_eq!(window(&args, "-progress").as_deref(), Some("pipe:1"));
        assert_eq!(args.last().map(String::as_str), Some("seg.mp4"));
        assert!(!args.contains(&"-c:v".to_string()));
    }

    #[test]
    fn test_reencode_args_match_source() {
        let params = ReencodeParams {
            video_codec: "h264".to_string(),
            pixel_format: Some("yuv420p".to_string()),
            width: Some(1920),
            height: Some(1080),
            video_bit_rate: None,
            audio_codec: Some("opus".to_string()),
            audio_bit_rate: Some(96_000),
        };
        let args = strings(adapter().build_args(&ToolRequest::Reencode {
            source: PathBuf::from("in.mkv"),
            start: 1.0,
            end: 1.2,
            params,
            output: PathBuf::from("seg.mkv"),
        }));
        assert_eq!(window(&args, "-c:v").as_deref(), Some("libx264"));
        assert_eq!(window(&args, "-pix_fmt").as_deref(), Some("yuv420p"));
        assert_eq!(window(&args, "-s:v").as_deref(), Some("1920x1080"));
        assert_eq!(window(&args, "-crf").as_deref(), Some("20"));
        assert_eq!(window(&args, "-preset").as_deref(), Some("fast"));
        assert_eq!(window(&args, "-threads").as_deref(), Some("2"));
        assert_eq!(window(&args, "-c:a").as_deref(), Some("libopus"));
        assert_eq!(window(&args, "-b:a").as_deref(), Some("96000"));
    }

    #[test]
    fn test_concat_args_and_list() {
        let args = strings(adapter().build_args(&ToolRequest::Concat {
            inputs: vec![PathBuf::from("a.mp4")],
            output: PathBuf::from("out.mp4"),
            work_dir: PathBuf::from("work"),
        }));
        assert_eq!(window(&args, "-f").as_deref(), Some("concat"));
        assert_eq!(window(&args, "-safe").as_deref(), Some("0"));
        assert!(window(&args, "-i").unwrap().ends_with(CONCAT_LIST_FILE));

        let list = concat_list(&[PathBuf::from("/tmp/a.mp4"), PathBuf::from("/tmp/it's.mp4")]);
        assert_eq!(list, "file '/tmp/a.mp4'\nfile '/tmp/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_encoder_mapping() {
        assert_eq!(video_encoder("hevc"), "libx265");
        assert_eq!(video_encoder("something"), "libx264");
        assert_eq!(audio_encoder("mp3"), "libmp3lame");
        assert_eq!(audio_encoder("unknown"), "aac");
    }

    #[test]
    fn test_summarize_keeps_tail() {
        let text = "a\n\nb\nc\nd\ne\nf\n";
        assert_eq!(summarize(text), "b; c; d; e; f");
        assert_eq!(summarize("  \n"), "no diagnostics");
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_unavailable() {
        let adapter = FfmpegAdapter::new("trimcut-no-such-ffmpeg");
        let request = ToolRequest::StreamCopy {
            source: PathBuf::from("in.mp4"),
            start: 0.0,
            end: 1.0,
            output: PathBuf::from("out.mp4"),
        };
        let err = adapter
            .run(&request, &|_seconds: f64| {}, CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, TrimError::ProbeUnavailable { .. }));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Mutex;
        use std::time::{Duration, Instant};

        use tempfile::TempDir;
        use tokio::sync::watch;

        /// Adapter whose "ffmpeg" is a shell script with the given body
        fn scripted_adapter(dir: &TempDir, body: &str) -> FfmpegAdapter {
            let path = dir.path().join("ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            FfmpegAdapter::new(path)
        }

        fn copy_request(dir: &TempDir) -> ToolRequest {
            ToolRequest::StreamCopy {
                source: dir.path().join("in.mp4"),
                start: 0.0,
                end: 2.0,
                output: dir.path().join("out.mp4"),
            }
        }

        #[tokio::test]
        async fn test_completed_run_reports_progress() {
            let dir = TempDir::new().unwrap();
            let adapter = scripted_adapter(
                &dir,
                "echo out_time_us=500000\necho progress=continue\n\
                 echo out_time_us=2000000\necho progress=end",
            );
            let seen = Mutex::new(Vec::new());
            let report = |seconds: f64| seen.lock().unwrap().push(seconds);

            adapter
                .run(&copy_request(&dir), &report, CancelSignal::never())
                .await
                .unwrap();
            assert_eq!(*seen.lock().unwrap(), vec![0.5, 2.0]);
        }

        #[tokio::test]
        async fn test_cancel_kills_running_tool() {
            let dir = TempDir::new().unwrap();
            let adapter = scripted_adapter(
                &dir,
                "echo out_time_us=500000\necho progress=continue\nexec sleep 30",
            );
            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let _ = tx.send(true);
            });

            let started = Instant::now();
            let err = adapter
                .run(&copy_request(&dir), &|_seconds: f64| {}, CancelSignal::new(rx))
                .await
                .unwrap_err();
            assert!(err.is_cancelled(), "{err}");
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_status_stream_without_end_fails() {
            let dir = TempDir::new().unwrap();
            let adapter = scripted_adapter(
                &dir,
                "echo out_time_us=500000\necho progress=continue\necho 'muxer gave up' >&2\nexit 0",
            );
            let err = adapter
                .run(&copy_request(&dir), &|_seconds: f64| {}, CancelSignal::never())
                .await
                .unwrap_err();
            match err {
                TrimError::ExportFailed { message } => {
                    assert!(message.contains("without completing"), "{message}");
                    assert!(message.contains("muxer gave up"), "{message}");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_non_zero_exit_fails_with_diagnostics() {
            let dir = TempDir::new().unwrap();
            let adapter =
                scripted_adapter(&dir, "echo progress=end\necho 'Invalid data found' >&2\nexit 1");
            let err = adapter
                .run(&copy_request(&dir), &|_seconds: f64| {}, CancelSignal::never())
                .await
                .unwrap_err();
            match err {
                TrimError::ExportFailed { message } => {
                    assert!(message.contains("Invalid data found"), "{message}")
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
