//! Error types for pipeline configuration, setup, and execution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or running a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pipeline configuration file is not valid YAML for the expected schema.
    #[error("failed to parse config '{}': {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Configuration is well-formed but semantically invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Region list side file could not be read.
    #[error("failed to read region list '{}': {source}", path.display())]
    RegionsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Region list side file is not a JSON array of names.
    #[error("malformed region list '{}': {source}", path.display())]
    RegionsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Marker directory or marker file could not be written.
    #[error("marker I/O failed for '{}': {source}", path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Job graph failed validation.
    #[error("invalid job graph: {0}")]
    Validation(String),

    /// A job was about to start but a declared input marker is absent.
    #[error("job '{job}' is missing input marker '{}'", path.display())]
    MissingInput { job: String, path: PathBuf },

    /// Stage script could not be started at all.
    #[error("failed to launch job '{job}': {source}")]
    Spawn {
        job: String,
        #[source]
        source: std::io::Error,
    },

    /// Stage script exited unsuccessfully.
    #[error("job '{job}' failed with exit code {}", code.map_or_else(|| "none (signal)".to_string(), |c| c.to_string()))]
    StageFailed { job: String, code: Option<i32> },

    /// Work remains but nothing is running and nothing can start.
    #[error("scheduling stalled: {0}")]
    Stalled(String),

    /// Worker thread disconnected before reporting.
    #[error("lost contact with job workers: {0}")]
    Channel(String),

    /// One or more jobs failed; dependents were not run.
    #[error("pipeline halted after {failed} failed job(s): {first}")]
    Halted { failed: usize, first: String },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
