//! Pipeline Definition Module
//!
//! Provides data structures and utilities for describing the per-region
//! pipeline, enumerating its jobs, and deciding what to run.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Region, Technology, Stage, Job)
//! - [`markers`]: Completion marker paths and setup
//! - [`regions`]: Region enumeration from inline lists or JSON files
//! - [`config`]: YAML pipeline configuration
//! - [`graph`]: Expansion of stages into the concrete job graph
//! - [`validator`]: Graph validation and ordering
//! - [`planner`]: Execution planning and scheduling

pub mod config;
pub mod graph;
pub mod markers;
pub mod model;
pub mod planner;
pub mod regions;
pub mod validator;

pub use config::{load_config, PipelineConfig, StageConfig, StagesConfig};
pub use graph::{build_jobs, Target};
pub use markers::{marker_path, prepare_marker_dirs};
pub use model::{Job, JobGraph, Region, Stage, StageParams, Technology};
pub use planner::ExecutionPlanner;
pub use regions::{load_regions, RegionSource};
pub use validator::validate_graph;
