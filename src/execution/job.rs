//! Stage Invocation
//!
//! Handles running a single job's stage script:
//! - Rendering structured stage parameters as command-line flags
//! - Launching the interpreter in the working directory
//! - Surfacing script output and failures
//!
//! Every stage receives its parameters the same way:
//!
//! ```text
//! <interpreter> <script> --region <REGION> [--technology <TECH>] --method <METHOD> [args...]
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, error};

use crate::error::{PipelineError, Result};
use crate::workflow::config::{PipelineConfig, StagesConfig};
use crate::workflow::model::{Job, Stage, StageParams};

/// Everything a runner needs to execute one job.
#[derive(Debug, Clone, PartialEq)]
pub struct StageInvocation {
    pub job_id: String,
    pub stage: Stage,
    pub params: StageParams,
    pub working_dir: PathBuf,
}

impl StageInvocation {
    pub fn for_job(job: &Job, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_id: job.id.clone(),
            stage: job.stage,
            params: job.params.clone(),
            working_dir: working_dir.into(),
        }
    }
}

/// Executes stage invocations.
///
/// Implementations must only return `Ok` once the stage's real output is
/// completely written, since the completion marker is created right after.
pub trait StageRunner: Send + Sync {
    fn run(&self, invocation: &StageInvocation) -> Result<()>;

    /// Human-readable description of what `run` would execute.
    fn describe(&self, invocation: &StageInvocation) -> String {
        format!("{} {:?}", invocation.stage, invocation.params)
    }
}

/// Runs stage scripts as child processes.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: String,
    method: String,
    stages: StagesConfig,
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<String>, method: impl Into<String>, stages: StagesConfig) -> Self {
        Self {
            interpreter: interpreter.into(),
            method: method.into(),
            stages,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.interpreter, &config.method, config.stages.clone())
    }

    /// Returns the full argument list passed to the interpreter.
    pub fn arguments(&self, invocation: &StageInvocation) -> Vec<OsString> {
        let stage_config = self.stages.get(invocation.stage);
        let mut args: Vec<OsString> = vec![stage_config.script.clone().into_os_string()];

        args.push("--region".into());
        args.push(invocation.params.region.as_str().into());

        if let Some(tech) = invocation.params.technology {
            args.push("--technology".into());
            args.push(tech.as_str().into());
        }

        args.push("--method".into());
        args.push(self.method.clone().into());

        args.extend(stage_config.args.iter().map(OsString::from));
        args
    }
}

impl StageRunner for ScriptRunner {
    fn run(&self, invocation: &StageInvocation) -> Result<()> {
        let job_id = &invocation.job_id;

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(self.arguments(invocation))
            .current_dir(&invocation.working_dir);

        debug!("Executing: {}", self.describe(invocation));

        let output = cmd.output().map_err(|source| PipelineError::Spawn {
            job: job_id.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if output.status.success() {
            if !stdout.trim().is_empty() {
                debug!("Job '{}' output:\n{}", job_id, stdout);
            }
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            "Job '{}' failed with exit code: {:?}",
            job_id,
            output.status.code()
        );
        if !stderr.trim().is_empty() {
            error!("stderr:\n{}", stderr);
        }
        if !stdout.trim().is_empty() {
            debug!("stdout:\n{}", stdout);
        }

        Err(PipelineError::StageFailed {
            job: job_id.clone(),
            code: output.status.code(),
        })
    }

    fn describe(&self, invocation: &StageInvocation) -> String {
        let args: Vec<String> = self
            .arguments(invocation)
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        format!("{} {}", self.interpreter, args.join(" "))
    }
}
