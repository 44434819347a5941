//! Cut planning and keyframe indexing module

pub mod keyframe_index;
pub mod strategy;

pub use keyframe_index::{GopStats, KeyframeIndex};
pub use strategy::ClipPlanner;
