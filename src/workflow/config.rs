//! Pipeline Configuration
//!
//! Loads the pipeline definition from YAML: where regions come from, which
//! technologies to evaluate, the script behind each stage, and the limits
//! applied while scheduling.
//!
//! # Example YAML Format
//!
//! ```yaml
//! regions:
//!   list: [Beijing, Tianjin]
//! technologies: [solar, wind]
//! interpreter: python
//! stages:
//!   spatial_data_prep:
//!     script: scripts/spatial_data_prep.py
//!     resources:
//!       api_calls: 1
//!   exclusion:
//!     script: scripts/exclusion.py
//!   suitability:
//!     script: scripts/suitability.py
//!     threads: 2
//! resources:
//!   api_calls: 1
//! cores: 4
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

use super::model::{Stage, Technology};
use super::regions::RegionSource;

/// Default pipeline file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/pipeline.yaml";

/// How one stage is invoked.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Script run by the interpreter
    pub script: PathBuf,

    /// Cores each invocation occupies
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Named resource amounts held per invocation
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, usize>,

    /// Extra arguments appended after the generated flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl StageConfig {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            threads: 1,
            resources: BTreeMap::new(),
            args: Vec::new(),
        }
    }
}

/// Script configuration for the three stages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StagesConfig {
    pub spatial_data_prep: StageConfig,
    pub exclusion: StageConfig,
    pub suitability: StageConfig,
}

impl StagesConfig {
    /// Returns the configuration for `stage`.
    pub fn get(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::SpatialDataPrep => &self.spatial_data_prep,
            Stage::Exclusion => &self.exclusion,
            Stage::Suitability => &self.suitability,
        }
    }
}

/// The complete pipeline definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Authoritative region source
    pub regions: RegionSource,

    /// Technologies evaluated per region
    #[serde(default = "default_technologies")]
    pub technologies: Vec<Technology>,

    /// Program used to run stage scripts
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Value forwarded to every script as `--method`
    #[serde(default = "default_method")]
    pub method: String,

    /// Per-stage scripts
    pub stages: StagesConfig,

    /// Limits for named resources (unlisted resources are unbounded)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, usize>,

    /// Total cores available to running jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<usize>,
}

fn default_threads() -> usize {
    1
}

fn default_technologies() -> Vec<Technology> {
    Technology::ALL.to_vec()
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_method() -> String {
    "snakemake".to_string()
}

impl PipelineConfig {
    /// Creates a configuration with default settings around `regions` and `stages`.
    pub fn new(regions: RegionSource, stages: StagesConfig) -> Self {
        Self {
            regions,
            technologies: default_technologies(),
            interpreter: default_interpreter(),
            method: default_method(),
            stages,
            resources: BTreeMap::new(),
            cores: None,
        }
    }

    /// Returns the configured core count, or the number of CPUs.
    pub fn effective_cores(&self) -> usize {
        self.cores.unwrap_or_else(num_cpus::get)
    }

    /// Checks the configuration for semantic errors.
    pub fn validate(&self) -> Result<()> {
        self.regions.validate()?;

        if self.technologies.is_empty() {
            return Err(invalid("technologies must not be empty"));
        }

        let mut seen = HashSet::new();
        for tech in &self.technologies {
            if !seen.insert(tech) {
                return Err(invalid(format!("technology '{}' listed twice", tech)));
            }
        }

        if self.interpreter.trim().is_empty() {
            return Err(invalid("interpreter must not be empty"));
        }

        if self.cores == Some(0) {
            return Err(invalid("cores must be at least 1"));
        }

        for stage in Stage::ALL {
            let stage_config = self.stages.get(stage);

            if stage_config.script.as_os_str().is_empty() {
                return Err(invalid(format!("stage '{}' has no script", stage)));
            }

            if stage_config.threads == 0 {
                return Err(invalid(format!("stage '{}' needs at least 1 thread", stage)));
            }

            for (name, amount) in &stage_config.resources {
                match self.resources.get(name) {
                    Some(limit) if amount > limit => {
                        return Err(invalid(format!(
                            "stage '{}' requests {} '{}' but the limit is {}",
                            stage, amount, name, limit
                        )));
                    }
                    None => debug!("Resource '{}' of stage '{}' is unbounded", name, stage),
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfig(message.into())
}

/// Loads and validates a pipeline configuration from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use regionrunner::workflow::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("configs/pipeline.yaml")?;
///     println!("{} technologies", config.technologies.len());
///     Ok(())
/// }
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    info!("Loading pipeline configuration from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    let config: PipelineConfig =
        serde_yaml::from_str(&yaml_content).map_err(|source| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

    config.validate()?;

    info!(
        "Configuration loaded: technologies {:?}, interpreter '{}'",
        config.technologies, config.interpreter
    );
    Ok(config)
}

/// Parses a `NAME=AMOUNT` resource limit override.
pub fn parse_resource_limit(text: &str) -> std::result::Result<(String, usize), String> {
    let (name, amount) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=AMOUNT, got '{}'", text))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing resource name in '{}'", text));
    }

    let amount = amount
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid amount in '{}'", text))?;

    Ok((name.to_string(), amount))
}
