//! Continuation oracle adapters.
//!
//! The oracle decides what an auto-loop does next. Its answer uses the same
//! grammar as an inbound task: `"<Agent>: <instruction>"` or `"DONE\n<summary>"`.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::process::run_command_with_timeout;

/// Answer given by [`FinishOracle`].
pub const FINISH_ANSWER: &str = "DONE\nAll tasks completed successfully.";

/// Input for one continuation decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub workflow_id: String,
    /// Canonical key of the agent that produced `response`.
    pub previous_agent: String,
    pub response: String,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub trait ContinuationOracle {
    fn next_task(&self, request: &OracleRequest) -> Result<String>;
}

impl<T: ContinuationOracle + ?Sized> ContinuationOracle for Box<T> {
    fn next_task(&self, request: &OracleRequest) -> Result<String> {
        (**self).next_task(request)
    }
}

/// Oracle that finishes every workflow after the current step.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinishOracle;

impl ContinuationOracle for FinishOracle {
    fn next_task(&self, request: &OracleRequest) -> Result<String> {
        debug!(workflow_id = %request.workflow_id, "finish oracle answering DONE");
        Ok(FINISH_ANSWER.to_string())
    }
}

/// Oracle that runs `<program> <args..> <previous_agent>` with the response on stdin.
///
/// `ROUTER_WORKFLOW_ID` is set in the child environment.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
}

impl CommandOracle {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("oracle command must be non-empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl ContinuationOracle for CommandOracle {
    #[instrument(skip_all, fields(workflow_id = %request.workflow_id, previous_agent = %request.previous_agent))]
    fn next_task(&self, request: &OracleRequest) -> Result<String> {
        info!(program = %self.program, "asking continuation oracle");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&request.previous_agent)
            .env("ROUTER_WORKFLOW_ID", &request.workflow_id);

        let output = run_command_with_timeout(
            cmd,
            Some(request.response.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.program))?;
        output.ensure_success("continuation oracle", request.timeout)?;
        Ok(output.stdout_text())
    }
}

/// Build the oracle for a configured command; an empty command finishes immediately.
pub fn oracle_from_command(command: &[String]) -> Result<Box<dyn ContinuationOracle + Send + Sync>> {
    if command.is_empty() {
        return Ok(Box::new(FinishOracle));
    }
    Ok(Box::new(CommandOracle::new(command)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> OracleRequest {
        OracleRequest {
            workflow_id: "wf-7".to_string(),
            previous_agent: "file-creator".to_string(),
            response: "created index.html".to_string(),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 1_000,
        }
    }

    #[test]
    fn empty_command_finishes() {
        let oracle = oracle_from_command(&[]).expect("oracle");
        assert_eq!(oracle.next_task(&request()).expect("next"), FINISH_ANSWER);
    }

    #[cfg(unix)]
    #[test]
    fn command_oracle_sees_agent_workflow_and_response() {
        let oracle = oracle_from_command(&[
            "sh".to_string(),
            "-c".to_string(),
            r#"printf 'TestRunner: verify %s %s ' "$0" "$ROUTER_WORKFLOW_ID"; cat"#.to_string(),
        ])
        .expect("oracle");
        assert_eq!(
            oracle.next_task(&request()).expect("next"),
            "TestRunner: verify file-creator wf-7 created index.html"
        );
    }
}
