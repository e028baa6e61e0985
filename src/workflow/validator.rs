//! Job Graph Validation
//!
//! Provides validation for generated job graphs including:
//! - Job field validation
//! - Marker ownership (each marker produced by exactly one job)
//! - Dependency graph validation (no cycles)
//! - Topological sorting

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use log::{debug, info, warn};
use thiserror::Error;

use crate::error::{PipelineError, Result};

use super::model::{Job, JobGraph};

/// Validation error types for user-friendly error messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Job graph has no jobs")]
    EmptyGraph,
    #[error("Duplicate job ID: '{0}'")]
    DuplicateJobId(String),
    #[error("Job has empty or whitespace-only ID")]
    EmptyJobId,
    #[error("Job '{0}' requests zero threads")]
    ZeroThreads(String),
    #[error("Job '{job}' references unknown job '{reference}'")]
    InvalidReference { job: String, reference: String },
    #[error("Marker '{}' is produced by both '{first}' and '{second}'", marker.display())]
    DuplicateOutput {
        marker: PathBuf,
        first: String,
        second: String,
    },
    #[error("Job '{job}' reads '{}' which none of its dependencies produce", marker.display())]
    UnproducedInput { job: String, marker: PathBuf },
    #[error("Job graph contains cyclic dependencies (jobs depend on each other in a loop)")]
    CyclicDependency,
}

/// Validates a single job's fields.
fn validate_job(job: &Job) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if job.id.trim().is_empty() {
        errors.push(ValidationError::EmptyJobId);
        return errors;
    }

    if job.threads == 0 {
        errors.push(ValidationError::ZeroThreads(job.id.clone()));
    }

    if job.previous.is_empty() {
        debug!("Job '{}' is a root job (no dependencies)", job.id);
    }

    errors
}

/// Validates the entire job graph.
///
/// Performs the following checks:
/// 1. Graph is not empty
/// 2. No duplicate job IDs
/// 3. All jobs have valid fields
/// 4. All references point to existing jobs
/// 5. Every marker has a single producer and every input marker is produced
///    by one of the job's dependencies
/// 6. No cyclic dependencies
///
/// On success, jobs are reordered in topological order.
pub fn validate_graph(graph: &mut JobGraph) -> Result<()> {
    info!("Validating job graph with {} jobs", graph.len());

    if graph.is_empty() {
        return Err(to_pipeline_error(vec![ValidationError::EmptyGraph]));
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for job in &graph.jobs {
        if !seen_ids.insert(job.id.as_str()) {
            return Err(to_pipeline_error(vec![ValidationError::DuplicateJobId(
                job.id.clone(),
            )]));
        }
    }

    let mut all_errors = Vec::new();
    let mut producers: HashMap<&PathBuf, &str> = HashMap::new();

    for job in &graph.jobs {
        all_errors.extend(validate_job(job));

        for reference in job.previous.iter().chain(job.next.iter()) {
            if !seen_ids.contains(reference.as_str()) {
                all_errors.push(ValidationError::InvalidReference {
                    job: job.id.clone(),
                    reference: reference.clone(),
                });
            }
        }

        if let Some(first) = producers.insert(&job.output, job.id.as_str()) {
            all_errors.push(ValidationError::DuplicateOutput {
                marker: job.output.clone(),
                first: first.to_string(),
                second: job.id.clone(),
            });
        }
    }

    for job in &graph.jobs {
        for marker in &job.input {
            let produced_by_dependency = producers
                .get(marker)
                .is_some_and(|producer| job.previous.iter().any(|p| p == producer));

            if !produced_by_dependency {
                all_errors.push(ValidationError::UnproducedInput {
                    job: job.id.clone(),
                    marker: marker.clone(),
                });
            }
        }
    }

    if !all_errors.is_empty() {
        return Err(to_pipeline_error(all_errors));
    }

    warn_inconsistent_edges(graph);
    topological_sort(graph)?;

    info!("Job graph validated: {} jobs", graph.len());
    Ok(())
}

fn to_pipeline_error(errors: Vec<ValidationError>) -> PipelineError {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    PipelineError::Validation(messages.join("\n"))
}

/// Logs edges that are only declared on one side.
fn warn_inconsistent_edges(graph: &JobGraph) {
    for job in &graph.jobs {
        for next_id in &job.next {
            if let Some(next_job) = graph.get_job(next_id) {
                if !next_job.previous.contains(&job.id) {
                    warn!(
                        "Inconsistency: {} -> {} but {} doesn't list {} as previous",
                        job.id, next_id, next_id, job.id
                    );
                }
            }
        }
    }
}

/// Performs topological sort on jobs using Kahn's algorithm.
///
/// Orders jobs so that dependencies come before dependents, and detects
/// cyclic dependencies.
fn topological_sort(graph: &mut JobGraph) -> Result<()> {
    let mut in_degree: HashMap<String, usize> = graph
        .jobs
        .iter()
        .map(|j| (j.id.clone(), j.previous.len()))
        .collect();

    let mut successors: HashMap<String, Vec<String>> = HashMap::new();
    for job in &graph.jobs {
        for prev in &job.previous {
            successors
                .entry(prev.clone())
                .or_default()
                .push(job.id.clone());
        }
    }

    let mut queue: VecDeque<String> = graph
        .jobs
        .iter()
        .filter(|j| j.previous.is_empty())
        .map(|j| j.id.clone())
        .collect();

    let mut sorted_order: Vec<String> = Vec::with_capacity(graph.len());

    while let Some(current_id) = queue.pop_front() {
        for successor_id in successors.get(&current_id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(successor_id) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(successor_id.clone());
                }
            }
        }
        sorted_order.push(current_id);
    }

    if sorted_order.len() != graph.len() {
        return Err(to_pipeline_error(vec![ValidationError::CyclicDependency]));
    }

    let mut job_map: HashMap<String, Job> = graph
        .jobs
        .drain(..)
        .map(|j| (j.id.clone(), j))
        .collect();

    graph.jobs = sorted_order
        .iter()
        .filter_map(|id| job_map.remove(id))
        .collect();

    debug!(
        "Topological order: {:?}",
        graph.jobs.iter().map(|j| &j.id).collect::<Vec<_>>()
    );

    Ok(())
}
