//! Export progress aggregation
//!
//! Tool invocations report how many seconds of output they have written. The
//! tracker weighs those reports by segment duration and publishes an overall
//! percentage that never decreases. 100 is only published by [`ProgressTracker::complete`],
//! once the output file is in place.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::model::ClipPlan;

/// Highest percentage published before the export has completed
const PENDING_CEILING: f64 = 99.0;

/// Duration-weighted progress over the segments of one plan
#[derive(Debug)]
pub struct ProgressTracker {
    offsets: Vec<f64>,
    weights: Vec<f64>,
    total: f64,
    sender: Arc<watch::Sender<f64>>,
}

impl ProgressTracker {
    pub fn new(plan: &ClipPlan, sender: Arc<watch::Sender<f64>>) -> Self {
        let weights: Vec<f64> = plan.segments.iter().map(|s| s.duration().max(0.0)).collect();
        let mut offsets = Vec::with_capacity(weights.len());
        let mut running = 0.0;
        for weight in &weights {
            offsets.push(running);
            running += weight;
        }

        Self {
            offsets,
            weights,
            total: running,
            sender,
        }
    }

    /// Record that segment `index` has written `seconds` of output
    pub fn segment_progress(&self, index: usize, seconds: f64) {
        let (Some(offset), Some(weight)) = (self.offsets.get(index), self.weights.get(index)) else {
            return;
        };
        if !seconds.is_finite() {
            return;
        }
        self.publish(offset + seconds.clamp(0.0, *weight));
    }

    /// Record that segment `index` has finished
    pub fn segment_finished(&self, index: usize) {
        if let (Some(offset), Some(weight)) = (self.offsets.get(index), self.weights.get(index)) {
            self.publish(offset + weight);
        }
    }

    /// Publish 100%
    pub fn complete(&self) {
        self.sender.send_if_modified(|current| {
            if *current < 100.0 {
                *current = 100.0;
                true
            } else {
                false
            }
        });
    }

    pub fn current(&self) -> f64 {
        *self.sender.borrow()
    }

    fn publish(&self, done_seconds: f64) {
        if self.total <= 0.0 {
            return;
        }
        let percent = (done_seconds / self.total * 100.0).clamp(0.0, PENDING_CEILING);
        self.sender.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }
}
