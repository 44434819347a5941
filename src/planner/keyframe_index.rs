//! Keyframe index built from line-oriented probe output

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::model::TIME_EPSILON;
use crate::error::{TrimError, TrimResult};

/// Ordered set of keyframe presentation timestamps for one media file.
///
/// Built once from probe output and never mutated afterwards, so it can be
/// shared freely between readers.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeIndex {
    entries: Vec<f64>,
    duration: f64,
}

/// GOP statistics derived from the index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GopStats {
    pub keyframe_count: usize,
    pub avg_gop_duration: f64,
    pub min_gop_duration: f64,
    pub max_gop_duration: f64,
}

/// One successfully parsed `timestamp,flag` record
struct ProbeRecord {
    timestamp: f64,
    keyframe: bool,
}

impl KeyframeIndex {
    /// Build the index from `timestamp,flag` lines.
    ///
    /// Malformed lines are skipped with a warning. The build only fails when
    /// the duration is not a positive number, when no line parses at all, or
    /// when none of the parsed lines is a keyframe.
    pub fn build<I, S>(lines: I, duration: f64) -> TrimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build_from_origin(lines, duration, 0.0)
    }

    /// Build the index from absolute timestamps on a timeline starting at `origin`.
    ///
    /// Entries are stored relative to `origin`, which is how FFmpeg resolves
    /// input seeks, rounded to the microsecond precision of probe output.
    pub fn build_from_origin<I, S>(lines: I, duration: f64, origin: f64) -> TrimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TrimError::parse(format!("Invalid media duration {duration}")));
        }
        if !origin.is_finite() {
            return Err(TrimError::parse(format!("Invalid timeline origin {origin}")));
        }

        let mut entries: Vec<f64> = Vec::new();
        let mut parsed = 0usize;
        let mut skipped = 0usize;

        for (line_no, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            let record = match Self::parse_line(line) {
                Ok(record) => record,
                Err(reason) => {
                    warn!(line = line_no + 1, content = %line.trim(), "Skipping probe line: {}", reason);
                    skipped += 1;
                    continue;
                }
            };
            parsed += 1;

            if !record.keyframe {
                continue;
            }
            let timestamp = rebase(record.timestamp, origin);
            if timestamp < 0.0 {
                warn!(line = line_no + 1, timestamp, "Skipping keyframe with negative timestamp");
                continue;
            }
            if let Some(&last) = entries.last() {
                if timestamp <= last + TIME_EPSILON {
                    warn!(
                        line = line_no + 1,
                        timestamp,
                        previous = last,
                        "Skipping keyframe that does not increase over the previous one"
                    );
                    continue;
                }
            }
            entries.push(timestamp);
        }

        if parsed == 0 {
            return Err(TrimError::parse(format!(
                "no usable probe lines ({skipped} malformed)"
            )));
        }
        if entries.is_empty() {
            return Err(TrimError::parse(format!(
                "{parsed} probe lines parsed but none marks a keyframe"
            )));
        }

        debug!(
            keyframes = entries.len(),
            parsed, skipped, origin, "Built keyframe index"
        );

        Ok(Self { entries, duration })
    }

    /// Parse and validate one record; the error names why it was rejected
    fn parse_line(line: &str) -> Result<ProbeRecord, String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err("blank line".to_string());
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let [timestamp, flag] = fields.as_slice() else {
            return Err(format!("expected 2 fields, found {}", fields.len()));
        };

        let timestamp = timestamp
            .parse::<f64>()
            .map_err(|_| format!("non-numeric timestamp '{timestamp}'"))?;
        if !timestamp.is_finite() {
            return Err(format!("non-finite timestamp '{timestamp}'"));
        }

        let keyframe = match *flag {
            "1" => true,
            "0" => false,
            other => return Err(format!("unknown keyframe flag '{other}'")),
        };

        Ok(ProbeRecord {
            timestamp,
            keyframe,
        })
    }

    /// Greatest keyframe at or before `t`, or 0 when there is none
    pub fn nearest_at_or_before(&self, t: f64) -> f64 {
        let idx = self.entries.partition_point(|&k| k <= t + TIME_EPSILON);
        if idx == 0 {
            0.0
        } else {
            self.entries[idx - 1]
        }
    }

    /// Smallest keyframe at or after `t`, or the media duration when there is none
    pub fn nearest_at_or_after(&self, t: f64) -> f64 {
        let idx = self.entries.partition_point(|&k| k < t - TIME_EPSILON);
        self.entries.get(idx).copied().unwrap_or(self.duration)
    }

    /// True when `t` is an indexed keyframe
    pub fn is_keyframe(&self, t: f64) -> bool {
        let idx = self.entries.partition_point(|&k| k < t - TIME_EPSILON);
        self.entries
            .get(idx)
            .is_some_and(|&k| (k - t).abs() <= TIME_EPSILON)
    }

    /// True when a stream copy may start or end at `t`.
    ///
    /// The start and end of the stream are always valid cut points in
    /// addition to the indexed keyframes.
    pub fn is_boundary(&self, t: f64) -> bool {
        t.abs() <= TIME_EPSILON || (t - self.duration).abs() <= TIME_EPSILON || self.is_keyframe(t)
    }

    pub fn entries(&self) -> &[f64] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// GOP duration statistics, `None` with fewer than two keyframes
    pub fn gop_stats(&self) -> Option<GopStats> {
        if self.entries.len() < 2 {
            return None;
        }
        let gops: Vec<f64> = self.entries.windows(2).map(|w| w[1] - w[0]).collect();
        let sum: f64 = gops.iter().sum();
        Some(GopStats {
            keyframe_count: self.entries.len(),
            avg_gop_duration: sum / gops.len() as f64,
            min_gop_duration: gops.iter().copied().fold(f64::INFINITY, f64::min),
            max_gop_duration: gops.iter().copied().fold(0.0, f64::max),
        })
    }
}

fn rebase(timestamp: f64, origin: f64) -> f64 {
    if origin == 0.0 {
        return timestamp;
    }
    ((timestamp - origin) * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: [&str; 4] = ["0.0,1", "1.2,0", "2.4,1", "3.6,0"];

    #[test]
    fn test_build_keeps_only_keyframes() {
        let index = KeyframeIndex::build(SCENARIO, 4.8).unwrap();
        assert_eq!(index.entries(), &[0.0, 2.4]);
        assert_eq!(index.duration(), 4.8);
    }

    #[test]
    fn test_build_skips_malformed_lines() {
        let lines = [
            "",
            "   ",
            "0.000000,1",
            "garbage",
            "1.0,1,extra",
            "abc,1",
            "2.0 , 1 ",
            "3.0,K",
            "4.0,0",
            "6.0,1",
        ];
        let index = KeyframeIndex::build(lines, 10.0).unwrap();
        assert_eq!(index.entries(), &[0.0, 2.0, 6.0]);
    }

    #[test]
    fn test_build_fails_without_valid_lines() {
        let err = KeyframeIndex::build(["", "nonsense", "x,y"], 5.0).unwrap_err();
        assert!(matches!(err, TrimError::Parse { .. }));

        let empty: [&str; 0] = [];
        assert!(KeyframeIndex::build(empty, 5.0).is_err());
    }

    #[test]
    fn test_build_fails_without_keyframes() {
        let err = KeyframeIndex::build(["0.0,0", "1.0,0"], 5.0).unwrap_err();
        assert!(matches!(err, TrimError::Parse { .. }));
    }

    #[test]
    fn test_build_drops_non_increasing_keyframes() {
        let index = KeyframeIndex::build(["0.0,1", "2.0,1", "2.0,1", "1.5,1", "-0.5,1", "4.0,1"], 6.0)
            .unwrap();
        assert_eq!(index.entries(), &[0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_build_rejects_unusable_duration() {
        for duration in [f64::NAN, f64::INFINITY, 0.0, -4.8] {
            let err = KeyframeIndex::build(SCENARIO, duration).unwrap_err();
            assert!(matches!(err, TrimError::Parse { .. }), "{duration}");
        }
    }

    #[test]
    fn test_build_from_origin_shifts_to_seek_timeline() {
        let lines = ["1.400000,1", "2.400000,0", "3.400000,1", "5.400000,1", "7.400000,1"];
        let index = KeyframeIndex::build_from_origin(lines, 10.0, 1.4).unwrap();
        assert_eq!(index.entries(), &[0.0, 2.0, 4.0, 6.0]);
        assert!(index.is_boundary(0.0));
    }

    #[test]
    fn test_build_from_origin_drops_keyframes_before_origin() {
        let index = KeyframeIndex::build_from_origin(["0.9,1", "1.5,1", "3.5,1"], 6.0, 1.5).unwrap();
        assert_eq!(index.entries(), &[0.0, 2.0]);
    }

    #[test]
    fn test_nearest_queries() {
        let index = KeyframeIndex::build(["1.0,1", "3.0,1", "5.0,1"], 8.0).unwrap();

        assert_eq!(index.nearest_at_or_before(0.5), 0.0);
        assert_eq!(index.nearest_at_or_before(1.0), 1.0);
        assert_eq!(index.nearest_at_or_before(4.9), 3.0);
        assert_eq!(index.nearest_at_or_before(100.0), 5.0);

        assert_eq!(index.nearest_at_or_after(0.0), 1.0);
        assert_eq!(index.nearest_at_or_after(3.0), 3.0);
        assert_eq!(index.nearest_at_or_after(3.1), 5.0);
        assert_eq!(index.nearest_at_or_after(5.5), 8.0);
    }

    #[test]
    fn test_queries_are_idempotent_and_rebuild_is_identical() {
        let first = KeyframeIndex::build(SCENARIO, 4.8).unwrap();
        let second = KeyframeIndex::build(SCENARIO, 4.8).unwrap();
        assert_eq!(first, second);

        for t in [0.0, 0.7, 2.4, 3.0, 4.8] {
            assert_eq!(first.nearest_at_or_before(t), first.nearest_at_or_before(t));
            assert_eq!(first.nearest_at_or_after(t), second.nearest_at_or_after(t));
        }
    }

    #[test]
    fn test_boundaries_include_stream_edges() {
        let index = KeyframeIndex::build(["0.5,1", "2.5,1"], 4.0).unwrap();
        assert!(index.is_boundary(0.0));
        assert!(index.is_boundary(0.5));
        assert!(index.is_boundary(4.0));
        assert!(!index.is_boundary(1.0));
        assert!(index.is_keyframe(2.5000001));
        assert!(!index.is_keyframe(4.0));
    }

    #[test]
    fn test_gop_stats() {
        let index = KeyframeIndex::build(["0.0,1", "2.0,1", "6.0,1"], 8.0).unwrap();
        let stats = index.gop_stats().unwrap();
        assert_eq!(stats.keyframe_count, 3);
        assert_eq!(stats.avg_gop_duration, 3.0);
        assert_eq!(stats.min_gop_duration, 2.0);
        assert_eq!(stats.max_gop_duration, 4.0);

        let single = KeyframeIndex::build(["0.0,1"], 8.0).unwrap();
        assert!(single.gop_stats().is_none());
    }
}
