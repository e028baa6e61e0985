//! Pipeline Execution Engine
//!
//! The core engine that drives a pipeline run:
//! - Explicit setup of marker directories before the graph is evaluated
//! - Marker-based staleness detection
//! - Parallel job scheduling bounded by cores and named resources
//! - Marker creation after each successful job
//! - Halting dependents when a job fails

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};

use crate::error::{PipelineError, Result};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::markers::{prepare_marker_dirs, touch_marker};
use crate::workflow::{
    build_jobs, load_regions, validate_graph, ExecutionPlanner, PipelineConfig, Region, Stage,
    Target, Technology,
};

use super::job::{ScriptRunner, StageInvocation, StageRunner};

type Completion = (String, Result<()>);

/// Outcome of a successful pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    /// IDs of jobs that were executed (or previewed in a dry run), in start order
    pub executed: Vec<String>,
    /// Number of jobs whose markers were already up to date
    pub skipped: usize,
    /// Number of jobs in the graph
    pub total: usize,
    pub timeline: ExecutionTimeline,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Returns true if no job needed to run.
    pub fn nothing_to_do(&self) -> bool {
        self.executed.is_empty()
    }
}

/// Status of one job as reported by [`Engine::list_jobs`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub id: String,
    pub stage: Stage,
    pub region: Region,
    pub technology: Option<Technology>,
    pub marker: PathBuf,
    pub up_to_date: bool,
}

/// Pipeline execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use regionrunner::execution::Engine;
/// use regionrunner::workflow::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("configs/pipeline.yaml")?;
///     let mut engine = Engine::new(config);
///     engine.set_cores(4);
///     engine.set_resource_limit("api_calls", 1);
///
///     engine.run()?;
///     Ok(())
/// }
/// ```
pub struct Engine {
    config: PipelineConfig,
    runner: Arc<dyn StageRunner>,
    working_dir: PathBuf,
    cores: Option<usize>,
    resource_overrides: BTreeMap<String, usize>,
    dry_run: bool,
    force: bool,
    target: Target,
    region_filter: Vec<String>,
}

impl Engine {
    /// Creates an engine that runs stage scripts as child processes.
    pub fn new(config: PipelineConfig) -> Self {
        let runner = Arc::new(ScriptRunner::from_config(&config));
        Self::with_runner(config, runner)
    }

    /// Creates an engine with a custom stage runner.
    pub fn with_runner(config: PipelineConfig, runner: Arc<dyn StageRunner>) -> Self {
        Self {
            config,
            runner,
            working_dir: PathBuf::from("."),
            cores: None,
            resource_overrides: BTreeMap::new(),
            dry_run: false,
            force: false,
            target: Target::All,
            region_filter: Vec::new(),
        }
    }

    /// Sets the directory markers and stage scripts are resolved against.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = dir.into();
    }

    /// Overrides the configured core count.
    pub fn set_cores(&mut self, cores: usize) {
        self.cores = Some(cores);
    }

    /// Overrides or adds the limit of a named resource.
    pub fn set_resource_limit(&mut self, name: impl Into<String>, limit: usize) {
        self.resource_overrides.insert(name.into(), limit);
    }

    /// Enables or disables dry run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Reruns every selected job regardless of its marker.
    pub fn set_force(&mut self, force: bool) {
        self.force = force;
    }

    /// Sets what the run should produce.
    pub fn set_target(&mut self, target: Target) {
        self.target = target;
    }

    /// Restricts the run to the named regions.
    pub fn set_regions(&mut self, regions: Vec<String>) {
        self.region_filter = regions;
    }

    /// Returns the effective core count.
    pub fn cores(&self) -> usize {
        self.cores.unwrap_or_else(|| self.config.effective_cores())
    }

    /// Returns the effective named resource limits.
    pub fn resource_limits(&self) -> BTreeMap<String, usize> {
        let mut limits = self.config.resources.clone();
        limits.extend(
            self.resource_overrides
                .iter()
                .map(|(name, limit)| (name.clone(), *limit)),
        );
        limits
    }

    /// Reports every job of the graph with its marker status.
    ///
    /// Does not create directories or run anything.
    pub fn list_jobs(&self) -> Result<Vec<JobReport>> {
        let regions = self.resolve_regions()?;
        let planner = self.plan(&regions)?;

        Ok(planner
            .graph()
            .jobs
            .iter()
            .map(|job| JobReport {
                id: job.id.clone(),
                stage: job.stage,
                region: job.region().clone(),
                technology: job.technology(),
                marker: job.output.clone(),
                up_to_date: planner.is_skipped(&job.id),
            })
            .collect())
    }

    /// Executes the pipeline.
    ///
    /// 1. Resolves the regions and creates their marker directories
    /// 2. Builds and validates the job graph
    /// 3. Skips jobs whose markers are up to date
    /// 4. Runs the remaining jobs in dependency order, in parallel where allowed
    /// 5. Creates each job's marker once it succeeds
    ///
    /// A failed job produces no marker. No further jobs are started after a
    /// failure; jobs already running are allowed to finish.
    pub fn run(&mut self) -> Result<RunSummary> {
        let started_at = Local::now();
        let start_time = Instant::now();

        let regions = self.resolve_regions()?;
        prepare_marker_dirs(&self.working_dir, &regions)?;

        let mut planner = self.plan(&regions)?;
        let total = planner.graph().len();
        let skipped = planner.skipped_count();
        let mut timeline = ExecutionTimeline::new();
        let mut executed = Vec::new();

        if !planner.has_work_remaining() {
            info!("Nothing to be done: all {} markers are up to date", total);
            return Ok(RunSummary {
                executed,
                skipped,
                total,
                timeline,
                started_at,
                elapsed: start_time.elapsed(),
            });
        }

        info!(
            "Starting execution (cores: {}, dry run: {}, target: {})",
            self.cores(),
            self.dry_run,
            self.target
        );

        let (tx, rx): (Sender<Completion>, Receiver<Completion>) = channel();
        let mut failures: Vec<(String, PipelineError)> = Vec::new();

        loop {
            if failures.is_empty() {
                for job in planner.get_ready_jobs() {
                    let invocation = StageInvocation::for_job(&job, &self.working_dir);

                    info!("Starting job: {}", job.id);
                    timeline.add_event(job.id.clone(), EventType::Started);
                    planner.mark_job_running(&job.id);
                    executed.push(job.id.clone());

                    if planner.is_dry_run() {
                        println!();
                        println!("[DRY RUN] Job: {}", job.id);
                        println!("  Command: {}", self.runner.describe(&invocation));
                        println!("  Input: {:?}", job.input);
                        println!("  Output: {}", job.output.display());
                        println!("  Threads: {}", job.threads);

                        timeline.add_event(job.id.clone(), EventType::Completed);
                        planner.mark_job_completed(&job.id);
                        continue;
                    }

                    if let Some(path) = job.missing_inputs(&self.working_dir).into_iter().next() {
                        let err = PipelineError::MissingInput {
                            job: job.id.clone(),
                            path,
                        };
                        error!("{}", err);
                        timeline.add_event(job.id.clone(), EventType::Failed);
                        planner.mark_job_failed(&job.id, err.to_string());
                        failures.push((job.id.clone(), err));
                        break;
                    }

                    let tx = tx.clone();
                    let runner = Arc::clone(&self.runner);
                    let job_id = job.id.clone();

                    thread::spawn(move || {
                        let result = runner.run(&invocation);
                        if let Err(e) = tx.send((job_id, result)) {
                            error!("Failed to send completion signal: {}", e);
                        }
                    });
                }
            }

            if planner.running_count() > 0 {
                let (job_id, result) = rx
                    .recv()
                    .map_err(|e| PipelineError::Channel(e.to_string()))?;

                let result = result.and_then(|()| self.record_success(&planner, &job_id));

                match result {
                    Ok(()) => {
                        info!("Job '{}' completed successfully", job_id);
                        timeline.add_event(job_id.clone(), EventType::Completed);
                        planner.mark_job_completed(&job_id);
                    }
                    Err(e) => {
                        error!("Job '{}' failed: {}", job_id, e);
                        timeline.add_event(job_id.clone(), EventType::Failed);
                        planner.mark_job_failed(&job_id, e.to_string());
                        failures.push((job_id, e));
                    }
                }
                continue;
            }

            if !failures.is_empty() || !planner.has_work_remaining() {
                break;
            }

            if planner.get_ready_jobs().is_empty() {
                return Err(PipelineError::Stalled(
                    "no pending job fits the core and resource limits".to_string(),
                ));
            }
        }

        for (job_id, metrics) in planner.get_metrics() {
            if let Some(ms) = metrics.duration_ms {
                debug!("Job '{}' finished in {} ms ({:?})", job_id, ms, metrics.status);
            }
        }

        if let Some((job_id, first)) = failures.first() {
            let (completed, total) = planner.progress();
            warn!(
                "Halting: '{}' failed; {} of {} jobs completed, dependents were not run",
                job_id, completed, total
            );
            return Err(PipelineError::Halted {
                failed: failures.len(),
                first: first.to_string(),
            });
        }

        Ok(RunSummary {
            executed,
            skipped,
            total,
            timeline,
            started_at,
            elapsed: start_time.elapsed(),
        })
    }

    /// Creates the marker of a job whose stage exited successfully.
    fn record_success(&self, planner: &ExecutionPlanner, job_id: &str) -> Result<()> {
        match planner.graph().get_job(job_id) {
            Some(job) => touch_marker(&self.working_dir.join(&job.output)),
            None => Err(PipelineError::Channel(format!(
                "completion for unknown job '{}'",
                job_id
            ))),
        }
    }

    /// Loads the configured regions and applies the region filter.
    fn resolve_regions(&self) -> Result<Vec<Region>> {
        let regions = load_regions(&self.config.regions, &self.working_dir)?;

        if self.region_filter.is_empty() {
            return Ok(regions);
        }

        for name in &self.region_filter {
            if !regions.iter().any(|r| r.as_str() == name) {
                return Err(PipelineError::InvalidConfig(format!(
                    "region '{}' is not in the configured region list",
                    name
                )));
            }
        }

        Ok(regions
            .into_iter()
            .filter(|r| self.region_filter.iter().any(|name| name == r.as_str()))
            .collect())
    }

    /// Builds, validates, and staleness-checks the job graph.
    fn plan(&self, regions: &[Region]) -> Result<ExecutionPlanner> {
        let mut graph = build_jobs(&self.config, regions, self.target);
        validate_graph(&mut graph)?;

        let limits = self.resource_limits();
        for job in &graph.jobs {
            for (name, amount) in &job.resources {
                if let Some(limit) = limits.get(name).filter(|limit| amount > *limit) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "stage '{}' requests {} '{}' but the limit is {}",
                        job.stage, amount, name, limit
                    )));
                }
            }
        }

        let mut planner = ExecutionPlanner::new(graph, self.dry_run, self.cores(), limits);
        planner.skip_up_to_date(&self.working_dir, self.force);
        Ok(planner)
    }

    /// Returns the working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
