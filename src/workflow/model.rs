//! Pipeline Data Model
//!
//! Core data structures for regions, technologies, stages, and the concrete
//! jobs produced for each (stage, region, technology) key.
//!
//! Every region runs the same three-stage chain:
//!
//! ```text
//! spatial_data_prep ──┬── exclusion (solar) ──┬── suitability
//!                     └── exclusion (wind)  ──┘
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::markers::marker_path;

/// A geographic unit (for example a province) processed independently.
///
/// The identifier is opaque: it is passed to scripts and used in marker
/// paths exactly as given.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Region {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Energy generation technology evaluated within each region.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Solar,
    Wind,
}

impl Technology {
    /// Every supported technology, in evaluation order.
    pub const ALL: [Technology; 2] = [Technology::Solar, Technology::Wind];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solar => "solar",
            Self::Wind => "wind",
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Technology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solar" => Ok(Self::Solar),
            "wind" => Ok(Self::Wind),
            other => Err(format!(
                "Unknown technology '{}' (expected 'solar' or 'wind')",
                other
            )),
        }
    }
}

/// One of the three pipeline phases.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Prepares the spatial inputs for a region
    SpatialDataPrep,
    /// Computes exclusion zones for a region and technology
    Exclusion,
    /// Scores suitability once every technology's exclusions exist
    Suitability,
}

impl Stage {
    /// Stages in pipeline order.
    pub const ALL: [Stage; 3] = [Stage::SpatialDataPrep, Stage::Exclusion, Stage::Suitability];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpatialDataPrep => "spatial_data_prep",
            Self::Exclusion => "exclusion",
            Self::Suitability => "suitability",
        }
    }

    /// Returns the marker filename for this stage.
    ///
    /// Only the exclusion stage is keyed by technology; the argument is
    /// ignored for the others.
    pub fn marker_filename(&self, technology: Option<Technology>) -> String {
        match (self, technology) {
            (Self::Exclusion, Some(tech)) => format!("exclusion_{}.done", tech),
            _ => format!("{}.done", self.as_str()),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Unknown stage '{}' (expected spatial_data_prep, exclusion or suitability)",
                    s
                )
            })
    }
}

/// Structured parameters handed to every stage invocation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StageParams {
    pub region: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<Technology>,
}

/// A single concrete stage invocation in the job graph.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Job {
    /// Unique identifier: `<stage>_<region>[_<technology>]`
    pub id: String,

    /// Which pipeline phase this job runs
    pub stage: Stage,

    /// Region and technology the stage is invoked with
    pub params: StageParams,

    /// Marker files that must exist before this job may run
    #[serde(default)]
    pub input: Vec<PathBuf>,

    /// Marker file created once this job succeeds
    pub output: PathBuf,

    /// IDs of jobs that must complete before this job can run
    #[serde(default)]
    pub previous: Vec<String>,

    /// IDs of jobs that depend on this job (auto-populated)
    #[serde(default)]
    pub next: Vec<String>,

    /// Cores this job occupies while running
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Named resource amounts held while running
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, usize>,
}

fn default_threads() -> usize {
    1
}

impl Job {
    /// Creates a job for `stage` with its output marker already derived.
    ///
    /// # Example
    ///
    /// ```
    /// use regionrunner::workflow::{Job, Region, Stage, Technology};
    ///
    /// let job = Job::new(Stage::Exclusion, Region::new("Beijing"), Some(Technology::Wind));
    /// assert_eq!(job.id, "exclusion_Beijing_wind");
    /// assert!(job.output.ends_with("exclusion_wind.done"));
    /// ```
    pub fn new(stage: Stage, region: Region, technology: Option<Technology>) -> Self {
        let id = match technology {
            Some(tech) => format!("{}_{}_{}", stage, region, tech),
            None => format!("{}_{}", stage, region),
        };
        let output = marker_path(region.as_str(), &stage.marker_filename(technology));

        Self {
            id,
            stage,
            params: StageParams { region, technology },
            input: Vec::new(),
            output,
            previous: Vec::new(),
            next: Vec::new(),
            threads: 1,
            resources: BTreeMap::new(),
        }
    }

    /// Adds an input marker.
    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input.push(input.into());
        self
    }

    /// Sets the thread count for this job.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets a named resource requirement.
    pub fn with_resource(mut self, name: impl Into<String>, amount: usize) -> Self {
        self.resources.insert(name.into(), amount);
        self
    }

    /// Adds a dependency on another job.
    pub fn depends_on(mut self, job_id: impl Into<String>) -> Self {
        self.previous.push(job_id.into());
        self
    }

    pub fn region(&self) -> &Region {
        &self.params.region
    }

    pub fn technology(&self) -> Option<Technology> {
        self.params.technology
    }

    /// Checks if the output marker exists under `root`.
    pub fn outputs_exist(&self, root: &Path) -> bool {
        root.join(&self.output).exists()
    }

    /// Checks if every input marker exists under `root`.
    pub fn inputs_exist(&self, root: &Path) -> bool {
        self.input.iter().all(|file| root.join(file).exists())
    }

    /// Returns the input markers missing under `root`.
    pub fn missing_inputs(&self, root: &Path) -> Vec<PathBuf> {
        self.input
            .iter()
            .filter(|file| !root.join(file).exists())
            .cloned()
            .collect()
    }

    /// Checks if the output marker is outdated compared to the inputs.
    ///
    /// Returns true if any input marker is newer than the output marker, or
    /// if the output marker doesn't exist.
    pub fn outputs_outdated(&self, root: &Path) -> bool {
        let Some(output_time) = modified(&root.join(&self.output)) else {
            return true;
        };

        let newest_input = self
            .input
            .iter()
            .filter_map(|file| modified(&root.join(file)))
            .max();

        match newest_input {
            Some(input_time) => input_time > output_time,
            None => false,
        }
    }

    /// Determines if this job should run based on marker existence and freshness.
    pub fn should_run(&self, root: &Path, force: bool) -> bool {
        if force {
            return true;
        }
        !self.outputs_exist(root) || self.outputs_outdated(root)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

/// The complete set of jobs for one pipeline run.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct JobGraph {
    /// Jobs in dependency order once validated
    pub jobs: Vec<Job>,
}

impl JobGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Creates a graph from a list of jobs.
    pub fn from_jobs(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    /// Adds a job to the graph.
    pub fn add_job(&mut self, job: Job) -> Result<(), String> {
        if self.jobs.iter().any(|j| j.id == job.id) {
            return Err(format!("Job '{}' already exists", job.id));
        }
        self.jobs.push(job);
        Ok(())
    }

    /// Gets a job by ID.
    pub fn get_job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Gets a mutable reference to a job by ID.
    pub fn get_job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Returns jobs with no dependencies (entry points).
    pub fn root_jobs(&self) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.previous.is_empty()).collect()
    }

    /// Returns jobs with no dependents (exit points).
    pub fn leaf_jobs(&self) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.next.is_empty()).collect()
    }

    /// Returns the distinct regions covered, in first-seen order.
    pub fn regions(&self) -> Vec<Region> {
        let mut seen = HashSet::new();
        self.jobs
            .iter()
            .filter(|j| seen.insert(j.region().clone()))
            .map(|j| j.region().clone())
            .collect()
    }

    /// Returns the number of jobs in the graph.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if the graph has no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn spatial(region: &str) -> Job {
        Job::new(Stage::SpatialDataPrep, Region::new(region), None)
    }

    fn exclusion(region: &str, tech: Technology) -> Job {
        let spatial_marker = marker_path(region, "spatial_data_prep.done");
        Job::new(Stage::Exclusion, Region::new(region), Some(tech)).with_input(spatial_marker)
    }

    #[test]
    fn test_job_ids() {
        assert_eq!(spatial("Beijing").id, "spatial_data_prep_Beijing");
        assert_eq!(exclusion("Beijing", Technology::Solar).id, "exclusion_Beijing_solar");
        assert_eq!(
            Job::new(Stage::Suitability, Region::new("Beijing"), None).id,
            "suitability_Beijing"
        );
    }

    #[test]
    fn test_stage_marker_filenames() {
        assert_eq!(Stage::SpatialDataPrep.marker_filename(None), "spatial_data_prep.done");
        assert_eq!(
            Stage::Exclusion.marker_filename(Some(Technology::Solar)),
            "exclusion_solar.done"
        );
        assert_eq!(Stage::Suitability.marker_filename(None), "suitability.done");
        assert_eq!(
            Stage::Suitability.marker_filename(Some(Technology::Wind)),
            "suitability.done"
        );
    }

    #[test]
    fn test_stage_and_technology_parse() {
        assert_eq!("exclusion".parse::<Stage>().unwrap(), Stage::Exclusion);
        assert!("scoring".parse::<Stage>().is_err());
        assert_eq!("wind".parse::<Technology>().unwrap(), Technology::Wind);
        assert!("Solar".parse::<Technology>().is_err());
    }

    #[test]
    fn test_technology_serde_lowercase() {
        let techs: Vec<Technology> = serde_yaml::from_str("[solar, wind]").unwrap();
        assert_eq!(techs, Technology::ALL.to_vec());
    }

    #[test]
    fn test_job_builder() {
        let job = spatial("Beijing")
            .with_threads(2)
            .with_resource("api_calls", 1)
            .depends_on("other");

        assert_eq!(job.threads, 2);
        assert_eq!(job.resources.get("api_calls"), Some(&1));
        assert_eq!(job.previous, vec!["other"]);
        assert_eq!(job.region().as_str(), "Beijing");
        assert!(job.technology().is_none());
    }

    #[test]
    fn test_outputs_exist() {
        let temp_dir = tempdir().unwrap();
        let job = spatial("Beijing");
        assert!(!job.outputs_exist(temp_dir.path()));

        let marker = temp_dir.path().join(&job.output);
        fs::create_dir_all(marker.parent().unwrap()).unwrap();
        fs::write(&marker, "").unwrap();
        assert!(job.outputs_exist(temp_dir.path()));
    }

    #[test]
    fn test_inputs_exist_and_missing() {
        let temp_dir = tempdir().unwrap();
        let job = exclusion("Beijing", Technology::Wind);

        assert!(!job.inputs_exist(temp_dir.path()));
        assert_eq!(job.missing_inputs(temp_dir.path()), job.input);

        let marker = temp_dir.path().join(&job.input[0]);
        fs::create_dir_all(marker.parent().unwrap()).unwrap();
        fs::write(&marker, "").unwrap();

        assert!(job.inputs_exist(temp_dir.path()));
        assert!(job.missing_inputs(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_outputs_outdated_when_input_newer() {
        let temp_dir = tempdir().unwrap();
        let job = exclusion("Beijing", Technology::Solar);
        let output = temp_dir.path().join(&job.output);
        let input = temp_dir.path().join(&job.input[0]);
        fs::create_dir_all(output.parent().unwrap()).unwrap();

        fs::write(&output, "").unwrap();
        thread::sleep(Duration::from_millis(100));
        fs::write(&input, "").unwrap();

        assert!(job.outputs_outdated(temp_dir.path()));
        assert!(job.should_run(temp_dir.path(), false));
    }

    #[test]
    fn test_outputs_fresh_when_output_newer() {
        let temp_dir = tempdir().unwrap();
        let job = exclusion("Beijing", Technology::Solar);
        let output = temp_dir.path().join(&job.output);
        let input = temp_dir.path().join(&job.input[0]);
        fs::create_dir_all(output.parent().unwrap()).unwrap();

        fs::write(&input, "").unwrap();
        thread::sleep(Duration::from_millis(100));
        fs::write(&output, "").unwrap();

        assert!(!job.outputs_outdated(temp_dir.path()));
        assert!(!job.should_run(temp_dir.path(), false));
        assert!(job.should_run(temp_dir.path(), true));
    }

    #[test]
    fn test_graph_add_and_lookup() {
        let mut graph = JobGraph::new();
        assert!(graph.add_job(spatial("Beijing")).is_ok());
        assert!(graph.add_job(spatial("Beijing")).is_err());
        assert_eq!(graph.len(), 1);
        assert!(graph.get_job("spatial_data_prep_Beijing").is_some());
        assert!(graph.get_job("spatial_data_prep_Tianjin").is_none());
    }

    #[test]
    fn test_graph_root_leaf_detection() {
        let mut graph = JobGraph::new();
        graph.add_job(spatial("Beijing")).unwrap();
        graph
            .add_job(exclusion("Beijing", Technology::Solar).depends_on("spatial_data_prep_Beijing"))
            .unwrap();

        if let Some(root) = graph.get_job_mut("spatial_data_prep_Beijing") {
            root.next.push("exclusion_Beijing_solar".to_string());
        }

        assert_eq!(graph.root_jobs().len(), 1);
        assert_eq!(graph.leaf_jobs().len(), 1);
        assert_eq!(graph.leaf_jobs()[0].id, "exclusion_Beijing_solar");
    }

    #[test]
    fn test_graph_regions_first_seen_order() {
        let graph = JobGraph::from_jobs(vec![
            spatial("Tianjin"),
            spatial("Beijing"),
            exclusion("Tianjin", Technology::Wind),
        ]);
        assert_eq!(
            graph.regions(),
            vec![Region::new("Tianjin"), Region::new("Beijing")]
        );
    }

    #[test]
    fn test_graph_default_is_empty() {
        let graph = JobGraph::default();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }
}
