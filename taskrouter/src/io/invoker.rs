//! Agent invoker abstraction.
//!
//! The [`AgentInvoker`] trait decouples routing from the worker backend.
//! [`CommandInvoker`] spawns a configured program; tests use scripted
//! invokers that return canned responses without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::process::run_command_with_timeout;

/// Parameters for one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    /// Canonical agent key (e.g. `file-creator`).
    pub agent_key: String,
    /// Guarded instruction text.
    pub instruction: String,
    /// Maximum time to wait for a response.
    pub timeout: Duration,
    /// Truncate the response beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over worker backends.
///
/// Implementations must give up once `request.timeout` elapses and report it
/// as an error.
pub trait AgentInvoker {
    fn invoke(&self, request: &InvokeRequest) -> Result<String>;
}

impl<T: AgentInvoker + ?Sized> AgentInvoker for Box<T> {
    fn invoke(&self, request: &InvokeRequest) -> Result<String> {
        (**self).invoke(request)
    }
}

/// Invoker that runs `<program> <args..> <agent_key>` with the instruction on stdin.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    program: String,
    args: Vec<String>,
}

impl CommandInvoker {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("invoker command must be non-empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AgentInvoker for CommandInvoker {
    #[instrument(skip_all, fields(agent = %request.agent_key, timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &InvokeRequest) -> Result<String> {
        info!(program = %self.program, "invoking agent");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(&request.agent_key);

        let output = run_command_with_timeout(
            cmd,
            Some(request.instruction.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.program))?;
        output.ensure_success(&format!("agent '{}'", request.agent_key), request.timeout)?;

        let response = output.stdout_text();
        debug!(bytes = response.len(), "agent responded");
        Ok(response)
    }
}
