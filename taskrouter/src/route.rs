//! Open-loop router: parse a routing line, invoke one worker, and in auto-loop
//! mode keep asking the continuation oracle for the next line until it says
//! `DONE` or the step cap is reached.
//!
//! The auto-loop is a bounded `loop`, not recursion. Every terminal and error
//! path is journaled before it is returned.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, info_span, warn};

use crate::core::guard::{GuardedInstruction, check_ack};
use crate::core::roster::{AgentProfile, AgentRoster};
use crate::core::task::{RoutedTask, parse_task};
use crate::core::types::{AckCheck, Collaborator, RouteError};
use crate::io::audit::{AuditEvent, AuditSink, StopReason, timestamp};
use crate::io::config::RouterConfig;
use crate::io::invoker::{AgentInvoker, CommandInvoker, InvokeRequest};
use crate::io::oracle::{ContinuationOracle, OracleRequest, oracle_from_command};
use crate::store::AbortFlags;

/// Inbound route call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// `"<Agent>: <instruction>"` or `"DONE\n<summary>"`.
    pub task: String,
    /// Unset means "decide from `from_taskrouter`".
    #[serde(default)]
    pub auto_loop: Option<bool>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Per-request step cap; unset or 0 uses the configured default.
    #[serde(default)]
    pub max_steps: Option<u32>,
    /// Set when the orchestrator itself kicks off the call.
    #[serde(default)]
    pub from_taskrouter: bool,
}

impl RouteRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    /// Orchestrator-initiated calls run to completion unless told otherwise.
    pub fn wants_auto_loop(&self) -> bool {
        self.auto_loop.unwrap_or(self.from_taskrouter)
    }
}

/// Result of a route call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub workflow_id: String,
    /// Number of worker invocations completed in this call.
    pub step: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub done: bool,
    /// False when no worker was invoked for the final task (unknown agent, DONE).
    pub forwarded: bool,
    /// True when an auto-loop ended on the step cap or an abort request.
    pub stopped: bool,
    pub auto_loop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortAck {
    pub ok: bool,
    pub workflow_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub ok: bool,
    pub time: String,
}

pub fn health() -> Health {
    Health {
        ok: true,
        time: timestamp(),
    }
}

/// Router knobs taken from [`RouterConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSettings {
    pub max_steps_default: u32,
    pub enforce_ack: bool,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl From<&RouterConfig> for RouteSettings {
    fn from(cfg: &RouterConfig) -> Self {
        Self {
            max_steps_default: cfg.max_steps_default,
            enforce_ack: cfg.enforce_ack,
            timeout: cfg.invoke_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

pub type BoxedInvoker = Box<dyn AgentInvoker + Send + Sync>;
pub type BoxedOracle = Box<dyn ContinuationOracle + Send + Sync>;
/// Router wired from a [`RouterConfig`].
pub type ConfiguredRouter = TaskRouter<BoxedInvoker, BoxedOracle>;

/// Build a router from config, journaling into `log_dir`.
pub fn router_from_config(cfg: &RouterConfig, log_dir: &Path) -> anyhow::Result<ConfiguredRouter> {
    let sink = AuditSink::open(log_dir)?;
    let invoker: BoxedInvoker = Box::new(CommandInvoker::new(&cfg.invoker.command)?);
    let oracle = oracle_from_command(&cfg.oracle.command)?;
    Ok(TaskRouter::new(
        cfg.roster()?,
        Arc::new(sink),
        RouteSettings::from(cfg),
        invoker,
        oracle,
    ))
}

pub struct TaskRouter<I, O> {
    roster: AgentRoster,
    sink: Arc<AuditSink>,
    settings: RouteSettings,
    invoker: I,
    oracle: O,
    aborts: Arc<AbortFlags>,
}

impl<I: AgentInvoker, O: ContinuationOracle> TaskRouter<I, O> {
    pub fn new(
        roster: AgentRoster,
        sink: Arc<AuditSink>,
        settings: RouteSettings,
        invoker: I,
        oracle: O,
    ) -> Self {
        Self {
            roster,
            sink,
            settings,
            invoker,
            oracle,
            aborts: Arc::new(AbortFlags::new()),
        }
    }

    /// Share abort flags with another owner, such as a server handle.
    pub fn with_abort_flags(mut self, aborts: Arc<AbortFlags>) -> Self {
        self.aborts = aborts;
        self
    }

    pub fn abort_flags(&self) -> &Arc<AbortFlags> {
        &self.aborts
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub fn sink(&self) -> &AuditSink {
        &self.sink
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Route one request, looping through the oracle when auto-loop is on.
    pub fn route(&self, request: RouteRequest) -> Result<RouteResponse, RouteError> {
        let workflow_id = resolve_workflow_id(request.workflow_id.as_deref(), &request.task);
        let auto_loop = request.wants_auto_loop();
        let max_steps = request
            .max_steps
            .filter(|cap| *cap > 0)
            .unwrap_or(self.settings.max_steps_default);
        let span = info_span!("route", workflow_id = %workflow_id, auto_loop, max_steps);
        let _enter = span.enter();
        let _run = self.aborts.enter(&workflow_id);

        let reply = |step: u32| RouteResponse {
            workflow_id: workflow_id.clone(),
            step,
            agent: None,
            message: None,
            done: false,
            forwarded: false,
            stopped: false,
            auto_loop,
        };

        let mut task = request.task;
        let mut steps = 0u32;
        loop {
            let routed = match parse_task(&task) {
                Ok(routed) => routed,
                Err(err) => {
                    warn!(step = steps, "rejecting malformed task");
                    self.record(
                        &workflow_id,
                        &AuditEvent::Error {
                            message: "Invalid route format".to_string(),
                            raw_task: Some(task.trim().to_string()),
                        },
                    )?;
                    return Err(err);
                }
            };

            let (agent_name, text) = match routed {
                RoutedTask::Complete { summary } => {
                    self.record(
                        &workflow_id,
                        &AuditEvent::Done {
                            step: steps,
                            summary: summary.clone(),
                        },
                    )?;
                    info!(steps, "workflow done");
                    return Ok(RouteResponse {
                        message: Some(summary.unwrap_or_else(|| "Workflow finished".to_string())),
                        done: true,
                        ..reply(steps)
                    });
                }
                RoutedTask::Instruction { agent, text } => (agent, text),
            };

            let Some(profile) = self.roster.resolve(&agent_name).cloned() else {
                warn!(agent = %agent_name, "unknown agent");
                self.record(
                    &workflow_id,
                    &AuditEvent::UnknownAgent {
                        agent: agent_name.clone(),
                        instruction: text,
                    },
                )?;
                return Ok(RouteResponse {
                    message: Some(format!("Unknown agent '{agent_name}'")),
                    agent: Some(agent_name),
                    ..reply(steps)
                });
            };

            let step = steps + 1;
            let response = self.invoke_guarded(&workflow_id, step, &profile, &agent_name, &text)?;
            steps = step;
            self.record(
                &workflow_id,
                &AuditEvent::Step {
                    step,
                    agent: profile.display_name.clone(),
                    instruction: text.clone(),
                },
            )?;
            self.record(
                &workflow_id,
                &AuditEvent::AgentResponse {
                    step,
                    agent: profile.display_name.clone(),
                    response: response.clone(),
                },
            )?;
            info!(step, agent = %profile.display_name, "step forwarded");

            let forwarded = RouteResponse {
                agent: Some(profile.display_name.clone()),
                forwarded: true,
                ..reply(steps)
            };
            if !auto_loop {
                return Ok(RouteResponse {
                    message: Some(text),
                    ..forwarded
                });
            }

            if self.aborts.is_raised(&workflow_id) {
                return self.stop(&workflow_id, StopReason::Aborted, max_steps, forwarded);
            }
            if steps >= max_steps {
                return self.stop(&workflow_id, StopReason::MaxSteps, max_steps, forwarded);
            }

            task = self.ask_oracle(&workflow_id, &profile, response)?;
            if self.aborts.is_raised(&workflow_id) {
                return self.stop(&workflow_id, StopReason::Aborted, max_steps, forwarded);
            }
        }
    }

    /// Record an abort marker and stop any running auto-loop on this id at its
    /// next boundary.
    pub fn abort(&self, workflow_id: &str) -> Result<AbortAck, RouteError> {
        self.record(workflow_id, &AuditEvent::Aborted)?;
        if self.aborts.raise(workflow_id) {
            warn!(workflow_id, "workflow aborted by request");
        } else {
            info!(workflow_id, "abort recorded, no auto-loop running");
        }
        Ok(AbortAck {
            ok: true,
            workflow_id: workflow_id.to_string(),
            status: "aborted".to_string(),
        })
    }

    fn invoke_guarded(
        &self,
        workflow_id: &str,
        step: u32,
        profile: &AgentProfile,
        routed_agent: &str,
        text: &str,
    ) -> Result<String, RouteError> {
        let guarded = GuardedInstruction::new(profile, routed_agent, text);
        let request = InvokeRequest {
            agent_key: profile.key.clone(),
            instruction: guarded.render(),
            timeout: self.settings.timeout,
            output_limit_bytes: self.settings.output_limit_bytes,
        };

        let response = self.call_invoker(workflow_id, profile, &request)?;
        if !self.settings.enforce_ack {
            return Ok(response);
        }
        let check = check_ack(&response, &profile.display_name, &profile.policy_title);
        if check.is_matched() {
            return Ok(response);
        }

        let message = describe_ack_failure(&check, &guarded.required_ack_line);
        warn!(step, agent = %profile.display_name, %message, "retrying after ack failure");
        self.record(
            workflow_id,
            &AuditEvent::Warn {
                step,
                agent: profile.display_name.clone(),
                message,
            },
        )?;

        let retried = self.call_invoker(workflow_id, profile, &request)?;
        let second = check_ack(&retried, &profile.display_name, &profile.policy_title);
        if !second.is_matched() {
            warn!(step, agent = %profile.display_name, "ack still missing after retry, proceeding");
        }
        Ok(retried)
    }

    fn call_invoker(
        &self,
        workflow_id: &str,
        profile: &AgentProfile,
        request: &InvokeRequest,
    ) -> Result<String, RouteError> {
        match self.invoker.invoke(request) {
            Ok(response) => Ok(response),
            Err(cause) => {
                self.record(
                    workflow_id,
                    &AuditEvent::Error {
                        message: format!("agent '{}' failed: {cause:#}", profile.display_name),
                        raw_task: None,
                    },
                )?;
                Err(RouteError::Collaborator {
                    collaborator: Collaborator::Invoker,
                    agent: profile.display_name.clone(),
                    cause,
                })
            }
        }
    }

    fn ask_oracle(
        &self,
        workflow_id: &str,
        profile: &AgentProfile,
        response: String,
    ) -> Result<String, RouteError> {
        let request = OracleRequest {
            workflow_id: workflow_id.to_string(),
            previous_agent: profile.key.clone(),
            response,
            timeout: self.settings.timeout,
            output_limit_bytes: self.settings.output_limit_bytes,
        };
        match self.oracle.next_task(&request) {
            Ok(next) => Ok(next),
            Err(cause) => {
                self.record(
                    workflow_id,
                    &AuditEvent::Error {
                        message: format!("continuation oracle failed: {cause:#}"),
                        raw_task: None,
                    },
                )?;
                Err(RouteError::Collaborator {
                    collaborator: Collaborator::Oracle,
                    agent: profile.display_name.clone(),
                    cause,
                })
            }
        }
    }

    fn stop(
        &self,
        workflow_id: &str,
        reason: StopReason,
        max_steps: u32,
        last: RouteResponse,
    ) -> Result<RouteResponse, RouteError> {
        self.record(
            workflow_id,
            &AuditEvent::Stopped {
                reason,
                step: last.step,
                max_steps,
            },
        )?;
        let message = match reason {
            StopReason::MaxSteps => format!("Stopped due to step limit ({max_steps})."),
            StopReason::Aborted => "Stopped after abort request.".to_string(),
        };
        warn!(step = last.step, ?reason, "auto-loop stopped");
        Ok(RouteResponse {
            message: Some(message),
            stopped: true,
            ..last
        })
    }

    fn record(&self, workflow_id: &str, event: &AuditEvent) -> Result<(), RouteError> {
        self.sink
            .append(workflow_id, event)
            .map_err(RouteError::Audit)
    }
}

fn describe_ack_failure(check: &AckCheck, required: &str) -> String {
    match check {
        AckCheck::Matched => String::new(),
        AckCheck::Missing => format!("acknowledgment missing; expected '{required}'"),
        AckCheck::Mismatch { agent, rule } => {
            format!("acknowledged agent={agent} rule={rule}; expected '{required}'")
        }
    }
}

/// Use the caller's id verbatim, or derive one from task content and time.
///
/// Derived ids correlate log records; they are not secrets.
pub fn resolve_workflow_id(given: Option<&str>, task: &str) -> String {
    if let Some(id) = given.filter(|id| !id.trim().is_empty()) {
        return id.to_string();
    }
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(task.as_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("wf-{}", &digest[..12])
}
