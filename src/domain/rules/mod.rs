// Domain rules - Plan invariants and concatenation policy

use std::path::PathBuf;

use crate::domain::model::*;
use crate::error::{TrimError, TrimResult};
use crate::planner::KeyframeIndex;

/// Business rules every clip plan must satisfy before execution
pub struct PlanValidator;

impl PlanValidator {
    /// Validate ordering, coverage and copy alignment of a plan
    pub fn validate(plan: &ClipPlan, index: &KeyframeIndex) -> TrimResult<()> {
        let violation = |message: String| {
            Err(TrimError::invalid_selection(format!(
                "Plan violates invariant: {message}"
            )))
        };

        if plan.segments.is_empty() {
            return violation("plan has no segments".to_string());
        }

        for segment in &plan.segments {
            if segment.duration() <= TIME_EPSILON {
                return violation(format!("empty segment {segment}"));
            }
            if segment.start < -TIME_EPSILON || segment.end > index.duration() + TIME_EPSILON {
                return violation(format!("segment {segment} lies outside the media"));
            }
            if segment.mode == SegmentMode::Copy
                && !(index.is_boundary(segment.start) && index.is_boundary(segment.end))
            {
                return violation(format!("copy segment {segment} is not keyframe aligned"));
            }
        }

        for pair in plan.segments.windows(2) {
            if (pair[0].end - pair[1].start).abs() > TIME_EPSILON {
                return violation(format!(
                    "segments {} and {} are not contiguous",
                    pair[0], pair[1]
                ));
            }
        }

        let start = plan.effective_start();
        let end = plan.effective_end();
        let requested = plan.requested;
        let covers = match plan.mode {
            PlanMode::LosslessOnly => {
                start <= requested.start + TIME_EPSILON && end >= requested.end - TIME_EPSILON
            }
            PlanMode::Accurate => {
                (start - requested.start).abs() <= TIME_EPSILON
                    && (end - requested.end).abs() <= TIME_EPSILON
            }
        };
        if !covers {
            return violation(format!(
                "exported range {start:.6}-{end:.6} does not match requested {requested}"
            ));
        }

        Ok(())
    }
}

/// Policy deciding whether segment files can be joined without re-encoding
pub struct SegmentCompatibility;

impl SegmentCompatibility {
    /// Every segment must share the profile of the first one
    pub fn check(profiles: &[(PathBuf, StreamProfile)]) -> TrimResult<()> {
        let Some((first_path, reference)) = profiles.first() else {
            return Ok(());
        };

        for (path, profile) in &profiles[1..] {
            if profile != reference {
                return Err(TrimError::export_failed(format!(
                    "segment {} ({}) is not compatible with {} ({}); refusing to concatenate",
                    path.display(),
                    profile,
                    first_path.display(),
                    reference
                )));
            }
        }
        Ok(())
    }
}
