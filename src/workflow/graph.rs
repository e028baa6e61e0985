//! Job Graph Construction
//!
//! Expands the three stage definitions over every region and technology
//! into concrete jobs and wires their dependency edges:
//! - spatial preparation has no input marker
//! - each exclusion job reads the region's spatial marker
//! - suitability reads every exclusion marker of the region
//!
//! Regions never depend on each other.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};

use super::config::PipelineConfig;
use super::model::{Job, JobGraph, Region, Stage};

/// What a run is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Every suitability marker, which pulls in every upstream job
    #[default]
    All,
    /// Stop after the given stage
    Until(Stage),
}

impl Target {
    /// Returns true if jobs of `stage` belong to this target.
    pub fn includes(&self, stage: Stage) -> bool {
        match self {
            Self::All => true,
            Self::Until(last) => stage <= *last,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Until(stage) => write!(f, "until {}", stage),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            other => other.parse::<Stage>().map(Self::Until),
        }
    }
}

/// Builds the job graph for `regions` according to `config`.
///
/// Jobs are emitted region by region in pipeline order, so the result is
/// already topologically sorted.
pub fn build_jobs(config: &PipelineConfig, regions: &[Region], target: Target) -> JobGraph {
    let mut jobs = Vec::new();

    for region in regions {
        jobs.extend(region_jobs(config, region, target));
    }

    let mut graph = JobGraph::from_jobs(jobs);
    link_dependents(&mut graph);

    info!(
        "Job graph ({}): {} jobs across {} regions",
        target,
        graph.len(),
        regions.len()
    );
    graph
}

/// Builds the jobs of a single region.
fn region_jobs(config: &PipelineConfig, region: &Region, target: Target) -> Vec<Job> {
    let mut jobs = Vec::new();

    let spatial = configure(
        config,
        Job::new(Stage::SpatialDataPrep, region.clone(), None),
    );
    let spatial_id = spatial.id.clone();
    let spatial_marker = spatial.output.clone();
    jobs.push(spatial);

    if !target.includes(Stage::Exclusion) {
        return jobs;
    }

    let mut suitability = Job::new(Stage::Suitability, region.clone(), None);

    for tech in &config.technologies {
        let exclusion = configure(
            config,
            Job::new(Stage::Exclusion, region.clone(), Some(*tech))
                .with_input(spatial_marker.clone())
                .depends_on(spatial_id.clone()),
        );

        suitability = suitability
            .with_input(exclusion.output.clone())
            .depends_on(exclusion.id.clone());
        jobs.push(exclusion);
    }

    if target.includes(Stage::Suitability) {
        jobs.push(configure(config, suitability));
    }

    debug!("Region '{}': {} jobs", region, jobs.len());
    jobs
}

/// Applies the stage's thread and resource settings to a job.
fn configure(config: &PipelineConfig, mut job: Job) -> Job {
    let stage_config = config.stages.get(job.stage);
    job.threads = stage_config.threads;
    job.resources = stage_config.resources.clone();
    job
}

/// Fills every job's `next` list from the `previous` lists.
fn link_dependents(graph: &mut JobGraph) {
    let edges: Vec<(String, String)> = graph
        .jobs
        .iter()
        .flat_map(|job| {
            job.previous
                .iter()
                .map(move |prev| (prev.clone(), job.id.clone()))
        })
        .collect();

    for (from, to) in edges {
        if let Some(job) = graph.get_job_mut(&from) {
            if !job.next.contains(&to) {
                job.next.push(to);
            }
        }
    }
}
