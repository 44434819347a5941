//! FFprobe adapter for media file probing
//!
//! Runs `ffprobe` as a child process. Media properties come from its JSON
//! writer; keyframe records come from a per-packet CSV listing that is
//! normalized to `timestamp,flag` lines for the keyframe index.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::model::*;
use crate::error::{TrimError, TrimResult};
use crate::ports::ProbePort;
use crate::utils::{spawn_error, tool_command};

/// FFprobe-based probe adapter
#[derive(Debug, Clone)]
pub struct FfprobeAdapter {
    program: PathBuf,
}

impl FfprobeAdapter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, args: &[&str], path: &Path) -> TrimResult<String> {
        let output = tool_command(&self.program)
            .args(["-v", "error"])
            .args(args)
            .arg(path)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(&self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrimError::parse(format!(
                "ffprobe could not read {} ({}): {}",
                path.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn probe_media(&self, path: &Path) -> TrimResult<MediaInfo> {
        let json = self
            .run(&["-show_format", "-show_streams", "-of", "json"], path)
            .await?;
        parse_media_json(path, &json)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn probe_keyframes(&self, path: &Path) -> TrimResult<Vec<String>> {
        let csv = self
            .run(
                &[
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "packet=pts_time,flags",
                    "-of",
                    "csv=print_section=0",
                ],
                path,
            )
            .await?;
        let lines: Vec<String> = csv
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(normalize_packet_line)
            .collect();
        debug!("ffprobe listed {} packets", lines.len());
        Ok(lines)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    bit_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    disposition: Disposition,
}

#[derive(Debug, Default, Deserialize)]
struct Disposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Build [`MediaInfo`] from `ffprobe -show_format -show_streams -of json` output
pub fn parse_media_json(path: &Path, json: &str) -> TrimResult<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| TrimError::parse(format!("invalid ffprobe JSON: {e}")))?;

    // cover art is reported as a video stream
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video") && s.disposition.attached_pic == 0)
        .ok_or_else(|| TrimError::parse(format!("no video stream in {}", path.display())))?;
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| TrimError::parse(format!("no duration reported for {}", path.display())))?;

    let frame_rate = [video.r_frame_rate.as_deref(), video.avg_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|rate| FrameRate::parse(rate).ok())
        .ok_or_else(|| TrimError::parse(format!("no frame rate reported for {}", path.display())))?;

    let video_codec = video
        .codec_name
        .clone()
        .ok_or_else(|| TrimError::parse("video stream has no codec name"))?;
    let container = probe
        .format
        .as_ref()
        .and_then(|f| f.format_name.clone())
        .unwrap_or_default();

    // MPEG-TS and similar containers start their timeline above zero
    let start_time = probe
        .format
        .as_ref()
        .and_then(|f| f.start_time.as_deref())
        .and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .unwrap_or(0.0);

    let mut info = MediaInfo::new(path, duration, frame_rate, video_codec, container)?;
    info.start_time = start_time;
    info.width = video.width;
    info.height = video.height;
    info.pixel_format = video.pix_fmt.clone();
    info.video_bit_rate = parse_bit_rate(video.bit_rate.as_deref());
    info.audio_codec = audio.and_then(|a| a.codec_name.clone());
    info.audio_bit_rate = audio.and_then(|a| parse_bit_rate(a.bit_rate.as_deref()));
    Ok(info)
}

fn parse_bit_rate(value: Option<&str>) -> Option<u64> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|rate| *rate > 0)
}

/// Rewrite an ffprobe `pts_time,flags` packet line as `pts_time,0|1`.
///
/// The flag becomes 1 when the packet flags contain `K`. Lines that do not
/// look like packet records are returned unchanged so the index can report
/// and skip them.
pub fn normalize_packet_line(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.split(',').collect::<Vec<_>>().as_slice() {
        [pts, flags]
            if !flags.is_empty()
                && flags.chars().all(|c| c == '_' || c.is_ascii_uppercase()) =>
        {
            let flag = if flags.contains('K') { '1' } else { '0' };
            format!("{pts},{flag}")
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "mjpeg",
                "codec_type": "video",
                "r_frame_rate": "90000/1",
                "disposition": { "attached_pic": 1 }
            },
            {
                "index": 1,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "pix_fmt": "yuv420p",
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "bit_rate": "4500000",
                "disposition": { "default": 1, "attached_pic": 0 }
            },
            {
                "index": 2,
                "codec_name": "aac",
                "codec_type": "audio",
                "bit_rate": "128000"
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "12.345000"
        }
    }"#;

    #[test]
    fn test_parse_media_json() {
        let info = parse_media_json(Path::new("in.mp4"), SAMPLE).unwrap();
        assert_eq!(info.duration, 12.345);
        assert_eq!(info.frame_rate, FrameRate::new(30000, 1001).unwrap());
        assert_eq!(info.video_codec, "h264");
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
        assert_eq!(info.width, Some(1920));
        assert_eq!(info.pixel_format.as_deref(), Some("yuv420p"));
        assert_eq!(info.video_bit_rate, Some(4_500_000));
        assert_eq!(info.audio_bit_rate, Some(128_000));
        assert_eq!(info.container, "mov,mp4,m4a,3gp,3g2,mj2");
        assert_eq!(info.start_time, 0.0);
    }

    #[test]
    fn test_parse_media_json_reads_start_time() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "h264", "r_frame_rate": "25/1"}],
            "format": {"format_name": "mpegts", "duration": "10.000000", "start_time": "1.400000"}
        }"#;
        let info = parse_media_json(Path::new("in.m2ts"), json).unwrap();
        assert_eq!(info.start_time, 1.4);
        assert_eq!(info.duration, 10.0);
    }

    #[test]
    fn test_parse_media_json_falls_back_to_avg_rate() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "vp9",
                         "r_frame_rate": "0/0", "avg_frame_rate": "25/1", "duration": "3.0"}],
            "format": {"format_name": "matroska,webm"}
        }"#;
        let info = parse_media_json(Path::new("in.webm"), json).unwrap();
        assert_eq!(info.frame_rate, FrameRate::new(25, 1).unwrap());
        assert_eq!(info.duration, 3.0);
        assert_eq!(info.audio_codec, None);
    }

    #[test]
    fn test_parse_media_json_without_video() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "mp3"}],
                       "format": {"duration": "3.0"}}"#;
        let err = parse_media_json(Path::new("in.mp3"), json).unwrap_err();
        assert!(matches!(err, TrimError::Parse { .. }));
        assert!(parse_media_json(Path::new("x"), "not json").is_err());
    }

    #[test]
    fn test_normalize_packet_line() {
        assert_eq!(normalize_packet_line("0.000000,K__"), "0.000000,1");
        assert_eq!(normalize_packet_line("0.040000,___\n"), "0.040000,0");
        assert_eq!(normalize_packet_line("2.002000,K_D"), "2.002000,1");
        assert_eq!(normalize_packet_line("1.5,1"), "1.5,1");
        assert_eq!(normalize_packet_line("garbage"), "garbage");
    }
}
