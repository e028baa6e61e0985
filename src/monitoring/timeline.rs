//! Execution Timeline
//!
//! Records when each job starts and finishes so the end-of-run summary can
//! show durations and an ASCII Gantt chart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Width of the Gantt chart bar area in characters.
const CHART_WIDTH: f64 = 50.0;

/// Width of the job label column.
const LABEL_WIDTH: usize = 28;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Started,
    Completed,
    Failed,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub job_id: String,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// Tracks the execution timeline of a pipeline run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a job.
    pub fn add_event(&mut self, job_id: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            job_id: job_id.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Returns the IDs of started jobs in start order.
    pub fn started_jobs(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.event_type == EventType::Started)
            .map(|e| e.job_id.as_str())
            .collect()
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns (start, end) offsets in milliseconds for every finished job,
    /// sorted by start.
    fn spans(&self) -> Vec<(String, u128, u128)> {
        let mut starts: HashMap<&str, u128> = HashMap::new();
        let mut spans = Vec::new();

        for event in &self.events {
            let offset = event
                .timestamp
                .duration_since(self.start_time)
                .as_millis();

            match event.event_type {
                EventType::Started => {
                    starts.insert(event.job_id.as_str(), offset);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(event.job_id.as_str()) {
                        spans.push((event.job_id.clone(), *start, offset));
                    }
                }
            }
        }

        spans.sort_by_key(|(_, start, _)| *start);
        spans
    }

    /// Returns job durations in milliseconds.
    pub fn get_durations(&self) -> HashMap<String, u128> {
        self.spans()
            .into_iter()
            .map(|(id, start, end)| (id, end.saturating_sub(start)))
            .collect()
    }

    /// Generates an ASCII Gantt chart representation.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.elapsed().as_millis();
        if total_time == 0 {
            return output;
        }

        let scale = CHART_WIDTH / total_time as f64;

        for (job_id, start, end) in self.spans() {
            let start_pos = (start as f64 * scale) as usize;
            let width = ((end.saturating_sub(start)) as f64 * scale).max(1.0) as usize;

            output.push_str(&format!(
                "{} |{}{}| ({} ms)\n",
                truncate(&job_id, LABEL_WIDTH),
                " ".repeat(start_pos),
                "#".repeat(width),
                end.saturating_sub(start)
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a label to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
