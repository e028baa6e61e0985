//! Pipeline Execution Module
//!
//! Runs the job graph: setup, staleness checks, parallel scheduling under
//! core and resource limits, and completion markers.
//!
//! # Architecture
//!
//! - [`engine`]: Main execution engine orchestrating pipeline runs
//! - [`job`]: Stage invocation and the runner seam

pub mod engine;
pub mod job;

pub use engine::{Engine, JobReport, RunSummary};
pub use job::{ScriptRunner, StageInvocation, StageRunner};
