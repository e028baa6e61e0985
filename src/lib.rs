//! RegionRunner - Marker-Driven Regional Pipeline Runner
//!
//! Runs the per-region renewable energy suitability pipeline: spatial data
//! preparation, one exclusion analysis per technology, and a suitability
//! assessment that joins them. Completion is tracked with marker files under
//! `data/<region>/snakemake_log/`, so interrupted or partially failed runs
//! resume where they stopped.
//!
//! # Architecture
//!
//! - [`workflow`]: Regions, configuration, the job graph, and planning
//! - [`execution`]: Execution engine and stage script invocation
//! - [`monitoring`]: Execution timeline
//! - [`error`]: Error type shared by all modules
//!
//! # Example
//!
//! ```rust,no_run
//! use regionrunner::execution::Engine;
//! use regionrunner::load_config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("configs/pipeline.yaml")?;
//!
//!     let mut engine = Engine::new(config);
//!     engine.set_cores(4);
//!     engine.set_working_dir("/data/analysis");
//!
//!     let summary = engine.run()?;
//!     println!("{} jobs executed", summary.executed.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use execution::engine::Engine;
pub use workflow::config::load_config;
pub use workflow::model::{Region, Stage, Technology};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "RegionRunner";
