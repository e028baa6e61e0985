//! Monitoring Module
//!
//! Tracks job timing during pipeline runs for the end-of-run report.
//!
//! - [`ExecutionTimeline`]: Job start/end timing for Gantt charts

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
