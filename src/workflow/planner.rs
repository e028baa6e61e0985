//! Execution Planner
//!
//! Manages job scheduling including:
//! - Dependency tracking
//! - Staleness detection from completion markers
//! - Core allocation
//! - Named resource counters (for example a rate-limited API)
//! - Job status tracking

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use log::{debug, info};

use super::model::{Job, JobGraph};

/// Status of a job during execution.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Job is waiting for dependencies
    Pending,
    /// Job is currently executing
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed with error message
    Failed(String),
    /// Job was skipped (marker up to date)
    Skipped,
}

/// Execution metrics for a single job.
#[derive(Debug, Clone)]
pub struct JobMetrics {
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub duration_ms: Option<u128>,
    pub status: JobStatus,
}

impl JobMetrics {
    fn new() -> Self {
        Self {
            start_time: None,
            end_time: None,
            duration_ms: None,
            status: JobStatus::Pending,
        }
    }

    fn finish(&mut self, status: JobStatus) {
        let now = Instant::now();
        self.end_time = Some(now);
        if let Some(start) = self.start_time {
            self.duration_ms = Some(now.duration_since(start).as_millis());
        }
        self.status = status;
    }
}

/// Manages execution planning and job scheduling.
///
/// The planner tracks:
/// - Which jobs have completed, are running, or failed
/// - Core usage against the configured core count
/// - Named resource usage against their limits
/// - Execution metrics
pub struct ExecutionPlanner {
    graph: JobGraph,
    dry_run: bool,
    completed_jobs: HashSet<String>,
    running_jobs: HashSet<String>,
    failed_jobs: HashSet<String>,
    skipped_jobs: HashSet<String>,
    job_metrics: HashMap<String, JobMetrics>,
    max_cores: usize,
    cores_in_use: usize,
    resource_limits: BTreeMap<String, usize>,
    resources_in_use: BTreeMap<String, usize>,
}

impl ExecutionPlanner {
    /// Creates a new execution planner for a validated job graph.
    ///
    /// Jobs asking for more threads than `max_cores` are scaled down so they
    /// can still be scheduled.
    ///
    /// # Arguments
    ///
    /// * `graph` - Jobs in topological order
    /// * `dry_run` - If true, jobs are not actually executed
    /// * `max_cores` - Total cores shared by running jobs
    /// * `resource_limits` - Upper bounds for named resources
    pub fn new(
        mut graph: JobGraph,
        dry_run: bool,
        max_cores: usize,
        resource_limits: BTreeMap<String, usize>,
    ) -> Self {
        let max_cores = max_cores.max(1);

        for job in &mut graph.jobs {
            if job.threads > max_cores {
                debug!(
                    "Job '{}' scaled down from {} to {} threads",
                    job.id, job.threads, max_cores
                );
                job.threads = max_cores;
            }
        }

        info!(
            "Creating planner: {} cores, resource limits {:?}",
            max_cores, resource_limits
        );

        let job_metrics = graph
            .jobs
            .iter()
            .map(|j| (j.id.clone(), JobMetrics::new()))
            .collect();

        Self {
            graph,
            dry_run,
            completed_jobs: HashSet::new(),
            running_jobs: HashSet::new(),
            failed_jobs: HashSet::new(),
            skipped_jobs: HashSet::new(),
            job_metrics,
            max_cores,
            cores_in_use: 0,
            resource_limits,
            resources_in_use: BTreeMap::new(),
        }
    }

    /// Marks every job whose marker is up to date as skipped.
    ///
    /// A job must run when forced, when its marker is missing or older than
    /// an input marker, or when any of its dependencies will run. Jobs are
    /// visited in topological order so the last rule propagates downstream.
    ///
    /// Returns the number of jobs left to run.
    pub fn skip_up_to_date(&mut self, root: &Path, force: bool) -> usize {
        let mut must_run: HashSet<String> = HashSet::new();

        for job in &self.graph.jobs {
            let upstream_runs = job.previous.iter().any(|dep| must_run.contains(dep));
            if upstream_runs || job.should_run(root, force) {
                must_run.insert(job.id.clone());
            } else {
                debug!("Job '{}' is up to date", job.id);
                self.skipped_jobs.insert(job.id.clone());
                self.completed_jobs.insert(job.id.clone());
                if let Some(metrics) = self.job_metrics.get_mut(&job.id) {
                    metrics.status = JobStatus::Skipped;
                }
            }
        }

        info!(
            "{} of {} jobs need to run",
            must_run.len(),
            self.graph.len()
        );
        must_run.len()
    }

    /// Returns jobs that are ready to execute.
    ///
    /// A job is ready if:
    /// - It hasn't completed, failed, or started
    /// - All its dependencies are completed
    /// - Its threads fit into the free cores
    /// - Every named resource it holds stays within its limit
    pub fn get_ready_jobs(&self) -> Vec<Job> {
        let mut ready_jobs = Vec::new();
        let mut cores_to_allocate = 0;
        let mut resources_to_allocate: BTreeMap<&str, usize> = BTreeMap::new();

        for job in &self.graph.jobs {
            if self.completed_jobs.contains(&job.id)
                || self.running_jobs.contains(&job.id)
                || self.failed_jobs.contains(&job.id)
            {
                continue;
            }

            let deps_complete = job
                .previous
                .iter()
                .all(|dep| self.completed_jobs.contains(dep));

            if !deps_complete {
                continue;
            }

            if self.cores_in_use + cores_to_allocate + job.threads > self.max_cores {
                debug!(
                    "Job '{}' needs {} cores but only {} available",
                    job.id,
                    job.threads,
                    self.max_cores - self.cores_in_use - cores_to_allocate
                );
                continue;
            }

            let over_limit = job.resources.iter().find(|(name, amount)| {
                self.resource_limits.get(*name).is_some_and(|limit| {
                    let in_use = self.resources_in_use.get(*name).copied().unwrap_or(0);
                    let pending = resources_to_allocate
                        .get(name.as_str())
                        .copied()
                        .unwrap_or(0);
                    in_use + pending + **amount > *limit
                })
            });

            if let Some((name, _)) = over_limit {
                debug!("Job '{}' waits for resource '{}'", job.id, name);
                continue;
            }

            cores_to_allocate += job.threads;
            for (name, amount) in &job.resources {
                *resources_to_allocate.entry(name.as_str()).or_insert(0) += amount;
            }
            ready_jobs.push(job.clone());
        }

        ready_jobs
    }

    /// Marks a job as running.
    pub fn mark_job_running(&mut self, job_id: &str) {
        self.running_jobs.insert(job_id.to_string());

        if let Some(job) = self.graph.get_job(job_id) {
            self.cores_in_use += job.threads;
            for (name, amount) in &job.resources {
                *self.resources_in_use.entry(name.clone()).or_insert(0) += amount;
            }
            debug!(
                "Job '{}' started using {} cores (total: {}/{})",
                job_id, job.threads, self.cores_in_use, self.max_cores
            );
        }

        if let Some(metrics) = self.job_metrics.get_mut(job_id) {
            metrics.start_time = Some(Instant::now());
            metrics.status = JobStatus::Running;
        }
    }

    /// Marks a job as completed.
    pub fn mark_job_completed(&mut self, job_id: &str) {
        self.release(job_id);
        self.completed_jobs.insert(job_id.to_string());

        if let Some(metrics) = self.job_metrics.get_mut(job_id) {
            metrics.finish(JobStatus::Completed);
        }
    }

    /// Marks a job as failed.
    pub fn mark_job_failed(&mut self, job_id: &str, error: String) {
        self.release(job_id);
        self.failed_jobs.insert(job_id.to_string());

        if let Some(metrics) = self.job_metrics.get_mut(job_id) {
            metrics.finish(JobStatus::Failed(error));
        }
    }

    /// Releases the cores and resources held by a running job.
    fn release(&mut self, job_id: &str) {
        if !self.running_jobs.remove(job_id) {
            return;
        }

        if let Some(job) = self.graph.get_job(job_id) {
            self.cores_in_use = self.cores_in_use.saturating_sub(job.threads);
            for (name, amount) in &job.resources {
                if let Some(in_use) = self.resources_in_use.get_mut(name) {
                    *in_use = in_use.saturating_sub(*amount);
                }
            }
            debug!(
                "Job '{}' released {} cores (total: {}/{})",
                job_id, job.threads, self.cores_in_use, self.max_cores
            );
        }
    }

    /// Returns true if there are more jobs to execute.
    pub fn has_work_remaining(&self) -> bool {
        self.completed_jobs.len() + self.failed_jobs.len() < self.graph.len()
    }

    /// Returns the number of jobs currently running.
    pub fn running_count(&self) -> usize {
        self.running_jobs.len()
    }

    /// Returns the current progress as (completed, total).
    pub fn progress(&self) -> (usize, usize) {
        (self.completed_jobs.len(), self.graph.len())
    }

    /// Returns the number of jobs skipped as up to date.
    pub fn skipped_count(&self) -> usize {
        self.skipped_jobs.len()
    }

    /// Returns true if the job was skipped as up to date.
    pub fn is_skipped(&self, job_id: &str) -> bool {
        self.skipped_jobs.contains(job_id)
    }

    /// Returns the job graph being scheduled.
    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    /// Returns metrics for all jobs.
    pub fn get_metrics(&self) -> &HashMap<String, JobMetrics> {
        &self.job_metrics
    }

    /// Returns whether this is a dry run.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::markers::marker_path;
    use crate::workflow::model::{Region, Stage, Technology};
    use std::fs;
    use tempfile::tempdir;

    /// Beijing with solar and wind, already in topological order.
    fn beijing_graph() -> JobGraph {
        let region = Region::new("Beijing");
        let spatial = Job::new(Stage::SpatialDataPrep, region.clone(), None)
            .with_resource("api_calls", 1);
        let mut suitability = Job::new(Stage::Suitability, region.clone(), None);
        let mut jobs = vec![spatial];

        for tech in Technology::ALL {
            let exclusion = Job::new(Stage::Exclusion, region.clone(), Some(tech))
                .with_input(marker_path("Beijing", "spatial_data_prep.done"))
                .depends_on("spatial_data_prep_Beijing");
            suitability = suitability
                .with_input(exclusion.output.clone())
                .depends_on(exclusion.id.clone());
            jobs.push(exclusion);
        }
        jobs.push(suitability);

        JobGraph::from_jobs(jobs)
    }

    fn ids(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(|j| j.id.as_str()).collect()
    }

    fn touch(root: &Path, relative: &Path) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_planner_creation() {
        let planner = ExecutionPlanner::new(beijing_graph(), false, 4, BTreeMap::new());
        assert!(!planner.is_dry_run());
        assert_eq!(planner.progress(), (0, 4));
        assert!(planner.has_work_remaining());
    }

    #[test]
    fn test_only_spatial_ready_initially() {
        let planner = ExecutionPlanner::new(beijing_graph(), false, 4, BTreeMap::new());
        assert_eq!(ids(&planner.get_ready_jobs()), vec!["spatial_data_prep_Beijing"]);
    }

    #[test]
    fn test_exclusions_ready_after_spatial() {
        let mut planner = ExecutionPlanner::new(beijing_graph(), false, 4, BTreeMap::new());
        planner.mark_job_running("spatial_data_prep_Beijing");

        assert!(planner.get_ready_jobs().is_empty());

        planner.mark_job_completed("spatial_data_prep_Beijing");
        assert_eq!(
            ids(&planner.get_ready_jobs()),
            vec!["exclusion_Beijing_solar", "exclusion_Beijing_wind"]
        );
    }

    #[test]
    fn test_suitability_waits_for_every_exclusion() {
        let mut planner = ExecutionPlanner::new(beijing_graph(), false, 4, BTreeMap::new());
        for id in ["spatial_data_prep_Beijing", "exclusion_Beijing_solar"] {
            planner.mark_job_running(id);
            planner.mark_job_completed(id);
        }

        let ready = planner.get_ready_jobs();
        assert_eq!(ids(&ready), vec!["exclusion_Beijing_wind"]);

        planner.mark_job_running("exclusion_Beijing_wind");
        planner.mark_job_completed("exclusion_Beijing_wind");
        assert_eq!(ids(&planner.get_ready_jobs()), vec!["suitability_Beijing"]);
    }

    #[test]
    fn test_cores_limit_parallelism() {
        let mut planner = ExecutionPlanner::new(beijing_graph(), false, 1, BTreeMap::new());
        planner.mark_job_running("spatial_data_prep_Beijing");
        planner.mark_job_completed("spatial_data_prep_Beijing");

        let ready = planner.get_ready_jobs();
        assert_eq!(ready.len(), 1);

        planner.mark_job_running(&ready[0].id);
        assert!(planner.get_ready_jobs().is_empty());
    }

    #[test]
    fn test_threads_scaled_to_cores() {
        let mut graph = beijing_graph();
        graph.jobs[0].threads = 16;

        let planner = ExecutionPlanner::new(graph, false, 2, BTreeMap::new());
        assert_eq!(planner.graph().jobs[0].threads, 2);
        assert_eq!(planner.get_ready_jobs().len(), 1);
    }

    #[test]
    fn test_resource_limit_serializes_jobs() {
        let graph = JobGraph::from_jobs(vec![
            Job::new(Stage::SpatialDataPrep, Region::new("Beijing"), None)
                .with_resource("api_calls", 1),
            Job::new(Stage::SpatialDataPrep, Region::new("Tianjin"), None)
                .with_resource("api_calls", 1),
        ]);
        let limits = BTreeMap::from([("api_calls".to_string(), 1)]);
        let mut planner = ExecutionPlanner::new(graph, false, 8, limits);

        let ready = planner.get_ready_jobs();
        assert_eq!(ids(&ready), vec!["spatial_data_prep_Beijing"]);

        planner.mark_job_running("spatial_data_prep_Beijing");
        assert!(planner.get_ready_jobs().is_empty());

        planner.mark_job_completed("spatial_data_prep_Beijing");
        assert_eq!(ids(&planner.get_ready_jobs()), vec!["spatial_data_prep_Tianjin"]);
    }

    #[test]
    fn test_unbounded_resource_ignored() {
        let graph = JobGraph::from_jobs(vec![
            Job::new(Stage::SpatialDataPrep, Region::new("Beijing"), None)
                .with_resource("api_calls", 5),
            Job::new(Stage::SpatialDataPrep, Region::new("Tianjin"), None)
                .with_resource("api_calls", 5),
        ]);
        let planner = ExecutionPlanner::new(graph, false, 8, BTreeMap::new());
        assert_eq!(planner.get_ready_jobs().len(), 2);
    }

    #[test]
    fn test_failed_job_blocks_dependents() {
        let mut planner = ExecutionPlanner::new(beijing_graph(), false, 4, BTreeMap::new());
        planner.mark_job_running("spatial_data_prep_Beijing");
        planner.mark_job_failed("spatial_data_prep_Beijing", "exit 1".to_string());

        assert!(planner.get_ready_jobs().is_empty());
        assert_eq!(planner.running_count(), 0);
        match &planner.get_metrics()["spatial_data_prep_Beijing"].status {
            JobStatus::Failed(msg) => assert_eq!(msg, "exit 1"),
            other => panic!("Expected Failed status, got {:?}", other),
        }
    }

    #[test]
    fn test_skip_up_to_date_all_fresh() {
        let temp_dir = tempdir().unwrap();
        let graph = beijing_graph();
        for job in &graph.jobs {
            touch(temp_dir.path(), &job.output);
        }

        let mut planner = ExecutionPlanner::new(graph, false, 4, BTreeMap::new());
        assert_eq!(planner.skip_up_to_date(temp_dir.path(), false), 0);
        assert!(!planner.has_work_remaining());
        assert_eq!(planner.skipped_count(), 4);
        assert!(planner.get_ready_jobs().is_empty());
    }

    #[test]
    fn test_skip_up_to_date_propagates_downstream() {
        let temp_dir = tempdir().unwrap();
        let graph = beijing_graph();
        for job in &graph.jobs {
            if job.id != "exclusion_Beijing_wind" {
                touch(temp_dir.path(), &job.output);
            }
        }

        let mut planner = ExecutionPlanner::new(graph, false, 4, BTreeMap::new());
        assert_eq!(planner.skip_up_to_date(temp_dir.path(), false), 2);
        assert!(planner.is_skipped("spatial_data_prep_Beijing"));
        assert!(planner.is_skipped("exclusion_Beijing_solar"));
        assert!(!planner.is_skipped("suitability_Beijing"));
        assert_eq!(ids(&planner.get_ready_jobs()), vec!["exclusion_Beijing_wind"]);
    }

    #[test]
    fn test_skip_up_to_date_forced() {
        let temp_dir = tempdir().unwrap();
        let graph = beijing_graph();
        for job in &graph.jobs {
            touch(temp_dir.path(), &job.output);
        }

        let mut planner = ExecutionPlanner::new(graph, false, 4, BTreeMap::new());
        assert_eq!(planner.skip_up_to_date(temp_dir.path(), true), 4);
        assert_eq!(planner.skipped_count(), 0);
    }

    #[test]
    fn test_metrics_duration() {
        let mut planner = ExecutionPlanner::new(beijing_graph(), false, 4, BTreeMap::new());

        planner.mark_job_running("spatial_data_prep_Beijing");
        std::thread::sleep(std::time::Duration::from_millis(10));
        planner.mark_job_completed("spatial_data_prep_Beijing");

        let metrics = &planner.get_metrics()["spatial_data_prep_Beijing"];
        assert_eq!(metrics.status, JobStatus::Completed);
        assert!(metrics.duration_ms.unwrap() >= 10);
    }

    #[test]
    fn test_job_metrics_new_default() {
        let metrics = JobMetrics::new();
        assert!(metrics.start_time.is_none());
        assert!(metrics.end_time.is_none());
        assert!(metrics.duration_ms.is_none());
        assert_eq!(metrics.status, JobStatus::Pending);
    }
}
