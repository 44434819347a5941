//! End-to-end tests of the `trimcut` binary that need no FFmpeg installation

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::TempDir;

/// Command isolated from any user configuration
fn trimcut(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("trimcut").unwrap();
    cmd.env("XDG_CONFIG_HOME", home)
        .env("HOME", home)
        .env("APPDATA", home)
        .env_remove("RUST_LOG")
        .env_remove("TRIMCUT_CONFIG")
        .env_remove("TRIMCUT_FFMPEG")
        .env_remove("TRIMCUT_FFPROBE")
        .env_remove("TRIMCUT_LOG_LEVEL");
    cmd
}

fn write_report(dir: &Path) -> String {
    let path = dir.join("keyframes.csv");
    fs::write(&path, "0.0,1\n1.2,0\n2.4,1\nnot a record\n3.6,1\n").unwrap();
    path.to_string_lossy().into_owned()
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let assert = trimcut(dir.path()).arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    for command in ["inspect", "plan", "clip"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_lossless_plan_from_saved_report() {
    let dir = TempDir::new().unwrap();
    let report = write_report(dir.path());

    let assert = trimcut(dir.path())
        .args(["plan", "--keyframes", &report, "--duration", "4.8"])
        .args(["--start", "1.0", "--end", "2.0", "--mode", "lossless", "--json"])
        .assert()
        .success();

    let plan = stdout_json(assert.get_output());
    assert_eq!(plan["mode"], "lossless_only");
    let segments = plan["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0]["mode"], "copy");
    assert_eq!(segments[0]["start"], 0.0);
    assert_eq!(segments[0]["end"], 2.4);
}

#[test]
fn test_accurate_plan_from_saved_report() {
    let dir = TempDir::new().unwrap();
    let report = write_report(dir.path());

    let assert = trimcut(dir.path())
        .args(["plan", "--keyframes", &report, "--duration", "4.8"])
        .args(["--start", "1.0", "--end", "00:00:04.000", "--json"])
        .assert()
        .success();

    let plan = stdout_json(assert.get_output());
    let modes: Vec<&str> = plan["segments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["mode"].as_str().unwrap())
        .collect();
    assert_eq!(modes, vec!["reencode", "copy", "reencode"]);
}

#[test]
fn test_plan_text_output() {
    let dir = TempDir::new().unwrap();
    let report = write_report(dir.path());

    let assert = trimcut(dir.path())
        .args(["plan", "--keyframes", &report, "--duration", "4.8"])
        .args(["--start", "0.5", "--end", "0.9"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("reencode"));
    assert!(stdout.contains("00:00:00.500"));
}

#[test]
fn test_selection_outside_media_fails() {
    let dir = TempDir::new().unwrap();
    let report = write_report(dir.path());

    trimcut(dir.path())
        .args(["plan", "--keyframes", &report, "--duration", "4.8"])
        .args(["--start", "1.0", "--end", "9.0"])
        .assert()
        .failure();
}

#[test]
fn test_unusable_duration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let report = write_report(dir.path());

    for duration in ["nan", "0", "-4.8"] {
        trimcut(dir.path())
            .args(["plan", "--keyframes", &report, "--duration", duration])
            .args(["--start", "1.0", "--end", "2.0"])
            .assert()
            .failure();
    }
}

#[test]
fn test_plan_requires_a_source() {
    let dir = TempDir::new().unwrap();
    trimcut(dir.path())
        .args(["plan", "--start", "1", "--end", "2"])
        .assert()
        .failure();
}

#[test]
fn test_missing_ffprobe_is_reported() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("clip.mp4");
    fs::write(&input, b"not really a video").unwrap();

    let assert = trimcut(dir.path())
        .args(["--ffprobe", "/nonexistent/trimcut/ffprobe", "inspect", "--input"])
        .arg(&input)
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("unavailable"), "{stderr}");
}

#[test]
fn test_out_of_range_crf_is_rejected() {
    let dir = TempDir::new().unwrap();
    trimcut(dir.path())
        .args(["clip", "--input", "in.mp4", "--crf", "99"])
        .assert()
        .failure();
}

#[test]
fn test_malformed_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let report = write_report(dir.path());
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[navigation]\ncoarse = -3.0\n").unwrap();

    trimcut(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["plan", "--keyframes", &report, "--duration", "4.8"])
        .args(["--start", "1.0", "--end", "2.0"])
        .assert()
        .failure();
}
