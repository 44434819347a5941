//! Clip planning: turns a selection into copy/re-encode segments

use tracing::{debug, info};

use crate::domain::model::{ClipPlan, PlanMode, Segment, Selection, TIME_EPSILON};
use crate::domain::rules::PlanValidator;
use crate::error::TrimResult;
use crate::planner::KeyframeIndex;

/// Strategy planner for keyframe-aligned clipping
#[derive(Debug, Default, Clone, Copy)]
pub struct ClipPlanner;

impl ClipPlanner {
    /// Create a new clip planner
    pub fn new() -> Self {
        Self
    }

    /// Plan the segments that realize `selection` under `mode`
    pub fn plan(
        &self,
        selection: &Selection,
        index: &KeyframeIndex,
        mode: PlanMode,
    ) -> TrimResult<ClipPlan> {
        selection.validate_within(index.duration())?;

        info!("Planning {} clip for {}", mode, selection);

        let segments = match mode {
            PlanMode::LosslessOnly => self.plan_lossless(selection, index),
            PlanMode::Accurate => self.plan_accurate(selection, index),
        };

        let plan = ClipPlan {
            mode,
            requested: *selection,
            segments,
        };
        PlanValidator::validate(&plan, index)?;

        for segment in &plan.segments {
            debug!("  {}", segment);
        }
        info!(
            "Planned {} segment(s), exported range {:.3}s - {:.3}s, {:.3}s stream copy",
            plan.segments.len(),
            plan.effective_start(),
            plan.effective_end(),
            plan.copy_duration()
        );

        Ok(plan)
    }

    /// Widen the selection to the surrounding keyframes and copy it whole.
    ///
    /// The exported range may be wider than requested but is never narrowed.
    fn plan_lossless(&self, selection: &Selection, index: &KeyframeIndex) -> Vec<Segment> {
        let start = index.nearest_at_or_before(selection.start);
        let end = index
            .nearest_at_or_after(selection.end)
            .min(index.duration());
        vec![Segment::copy(start, end)]
    }

    /// Re-encode the partial GOPs at either edge and copy the keyframe-aligned core
    fn plan_accurate(&self, selection: &Selection, index: &KeyframeIndex) -> Vec<Segment> {
        let start_aligned = selection.start <= TIME_EPSILON || index.is_keyframe(selection.start);
        let end_aligned = (index.duration() - selection.end).abs() <= TIME_EPSILON
            || index.is_keyframe(selection.end);

        let core_start = if start_aligned {
            selection.start
        } else {
            index.nearest_at_or_after(selection.start)
        };
        let core_end = if end_aligned {
            selection.end
        } else {
            index.nearest_at_or_before(selection.end)
        };

        if core_end - core_start <= TIME_EPSILON {
            debug!("No keyframe-aligned core inside the selection, re-encoding it whole");
            return vec![Segment::reencode(selection.start, selection.end)];
        }

        let mut segments = Vec::with_capacity(3);
        if !start_aligned {
            segments.push(Segment::reencode(selection.start, core_start));
        }
        segments.push(Segment::copy(core_start, core_end));
        if !end_aligned {
            segments.push(Segment::reencode(core_end, selection.end));
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SegmentMode;
    use crate::error::TrimError;

    fn index() -> KeyframeIndex {
        KeyframeIndex::build(["0.0,1", "2.0,1", "4.0,1", "6.0,1", "8.0,1"], 10.0).unwrap()
    }

    fn plan_range(start: f64, end: f64, mode: PlanMode) -> ClipPlan {
        let selection = Selection::new(start, end).unwrap();
        ClipPlanner::new().plan(&selection, &index(), mode).unwrap()
    }

    fn assert_exact_cover(plan: &ClipPlan) {
        assert_eq!(plan.effective_start(), plan.requested.start);
        assert_eq!(plan.effective_end(), plan.requested.end);
        for pair in plan.segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_lossless_scenario_from_probe_lines() {
        let index = KeyframeIndex::build(["0.0,1", "1.2,0", "2.4,1", "3.6,0"], 4.8).unwrap();
        let selection = Selection::new(1.0, 2.0).unwrap();
        let plan = ClipPlanner::new()
            .plan(&selection, &index, PlanMode::LosslessOnly)
            .unwrap();
        assert_eq!(plan.segments, vec![Segment::copy(0.0, 2.4)]);
    }

    #[test]
    fn test_lossless_widens_but_never_narrows() {
        for (start, end) in [(0.5, 1.5), (2.0, 4.0), (3.3, 9.1), (0.0, 10.0), (7.9, 8.1)] {
            let plan = plan_range(start, end, PlanMode::LosslessOnly);
            assert_eq!(plan.segments.len(), 1);
            let segment = plan.segments[0];
            assert_eq!(segment.mode, SegmentMode::Copy);
            assert!(segment.start <= start);
            assert!(segment.end >= end);
            assert!(index().is_boundary(segment.start));
            assert!(index().is_boundary(segment.end));
        }
    }

    #[test]
    fn test_lossless_last_gop_extends_to_duration() {
        let plan = plan_range(8.5, 9.5, PlanMode::LosslessOnly);
        assert_eq!(plan.segments, vec![Segment::copy(8.0, 10.0)]);
    }

    #[test]
    fn test_accurate_three_segments() {
        let plan = plan_range(1.0, 7.0, PlanMode::Accurate);
        assert_eq!(
            plan.segments,
            vec![
                Segment::reencode(1.0, 2.0),
                Segment::copy(2.0, 6.0),
                Segment::reencode(6.0, 7.0),
            ]
        );
        assert_exact_cover(&plan);
    }

    #[test]
    fn test_accurate_omits_aligned_edges() {
        let plan = plan_range(2.0, 7.0, PlanMode::Accurate);
        assert_eq!(
            plan.segments,
            vec![Segment::copy(2.0, 6.0), Segment::reencode(6.0, 7.0)]
        );

        let plan = plan_range(1.0, 6.0, PlanMode::Accurate);
        assert_eq!(
            plan.segments,
            vec![Segment::reencode(1.0, 2.0), Segment::copy(2.0, 6.0)]
        );

        let plan = plan_range(2.0, 6.0, PlanMode::Accurate);
        assert_eq!(plan.segments, vec![Segment::copy(2.0, 6.0)]);
    }

    #[test]
    fn test_accurate_stream_edges_count_as_aligned() {
        let index = KeyframeIndex::build(["0.5,1", "3.0,1"], 5.0).unwrap();
        let selection = Selection::new(0.0, 5.0).unwrap();
        let plan = ClipPlanner::new()
            .plan(&selection, &index, PlanMode::Accurate)
            .unwrap();
        assert_eq!(plan.segments, vec![Segment::copy(0.0, 5.0)]);
    }

    #[test]
    fn test_accurate_collapses_without_inner_keyframe() {
        let plan = plan_range(2.5, 3.5, PlanMode::Accurate);
        assert_eq!(plan.segments, vec![Segment::reencode(2.5, 3.5)]);

        let plan = plan_range(1.0, 3.0, PlanMode::Accurate);
        assert_eq!(plan.segments, vec![Segment::reencode(1.0, 3.0)]);

        // starts on a keyframe, but the next one lies beyond the end
        let plan = plan_range(2.0, 3.5, PlanMode::Accurate);
        assert_eq!(plan.segments, vec![Segment::reencode(2.0, 3.5)]);
    }

    #[test]
    fn test_accurate_union_equals_selection() {
        let cases = [(0.1, 9.9), (0.0, 3.3), (4.4, 10.0), (1.9, 2.1), (5.0, 8.0), (0.0, 10.0)];
        for (start, end) in cases {
            let plan = plan_range(start, end, PlanMode::Accurate);
            assert_exact_cover(&plan);
            for segment in plan.segments.iter().filter(|s| s.mode == SegmentMode::Copy) {
                assert!(index().is_boundary(segment.start));
                assert!(index().is_boundary(segment.end));
            }
        }
    }

    #[test]
    fn test_rejects_invalid_selection() {
        let selection = Selection { start: 4.0, end: 12.0 };
        let err = ClipPlanner::new()
            .plan(&selection, &index(), PlanMode::Accurate)
            .unwrap_err();
        assert!(matches!(err, TrimError::InvalidSelection { .. }));

        let reversed = Selection { start: 5.0, end: 3.0 };
        assert!(ClipPlanner::new()
            .plan(&reversed, &index(), PlanMode::LosslessOnly)
            .is_err());
    }
}
