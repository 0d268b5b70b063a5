//! Test-only helpers: deterministic plans and scripted collaborators.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};

use crate::core::roster::AgentRoster;
use crate::core::tracker::{Completion, PlanStep, WorkflowPlan};
use crate::io::audit::AuditSink;
use crate::io::invoker::{AgentInvoker, InvokeRequest};
use crate::io::oracle::{ContinuationOracle, FINISH_ANSWER, OracleRequest};
use crate::route::{RouteSettings, TaskRouter};
use crate::store::AbortFlags;

/// Plan with `n` FileCreator steps numbered `1..=n`.
pub fn plan(workflow_id: &str, n: u32) -> WorkflowPlan {
    WorkflowPlan {
        workflow_id: workflow_id.to_string(),
        total_steps: n,
        steps: (1..=n)
            .map(|step| PlanStep {
                step,
                agent_role: "FileCreator".to_string(),
                policy: "File Ops Policy".to_string(),
                instruction: format!("step {step}"),
            })
            .collect(),
        original_goal: Some("ship the landing page".to_string()),
    }
}

/// Completion report for `step` with no file changes.
pub fn completion(step: u32) -> Completion {
    Completion {
        step,
        agent_role: "FileCreator".to_string(),
        policy: "File Ops Policy".to_string(),
        task: format!("step {step}"),
        files_created: Vec::new(),
        files_modified: Vec::new(),
    }
}

/// Router over the default roster, journaling into `dir`.
pub fn router_in<I: AgentInvoker, O: ContinuationOracle>(
    dir: &Path,
    invoker: I,
    oracle: O,
) -> TaskRouter<I, O> {
    router_with_settings(dir, invoker, oracle, RouteSettings::default())
}

pub fn router_with_settings<I: AgentInvoker, O: ContinuationOracle>(
    dir: &Path,
    invoker: I,
    oracle: O,
    settings: RouteSettings,
) -> TaskRouter<I, O> {
    let sink = AuditSink::open(dir).expect("open audit sink");
    TaskRouter::new(
        AgentRoster::default(),
        Arc::new(sink),
        settings,
        invoker,
        oracle,
    )
}

#[derive(Debug, Default)]
struct CallLog {
    requests: Mutex<Vec<InvokeRequest>>,
}

impl CallLog {
    fn push(&self, request: &InvokeRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
    }

    fn all(&self) -> Vec<InvokeRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Invoker that echoes the required acknowledgment line from the instruction.
#[derive(Debug, Default)]
pub struct AckingInvoker {
    log: CallLog,
}

impl AckingInvoker {
    pub fn calls(&self) -> usize {
        self.log.all().len()
    }

    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.log.all()
    }

    pub fn last_request(&self) -> Option<InvokeRequest> {
        self.log.all().pop()
    }
}

impl AgentInvoker for AckingInvoker {
    fn invoke(&self, request: &InvokeRequest) -> Result<String> {
        self.log.push(request);
        let ack = request
            .instruction
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("rules loaded ("))
            .ok_or_else(|| anyhow!("instruction carries no ack line"))?;
        Ok(format!("{ack}\ndone with {}", request.agent_key))
    }
}

/// Invoker that replays canned results in order; `Err` entries become failures.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    log: CallLog,
}

impl ScriptedInvoker {
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            log: CallLog::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.log.all().len()
    }

    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.log.all()
    }
}

impl AgentInvoker for ScriptedInvoker {
    fn invoke(&self, request: &InvokeRequest) -> Result<String> {
        self.log.push(request);
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted invoker exhausted")),
        }
    }
}

/// Oracle that replays answers, then repeats `fallback`.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    answers: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    seen: Mutex<Vec<OracleRequest>>,
    abort_on_first_call: Option<Arc<AbortFlags>>,
}

impl ScriptedOracle {
    pub fn new(answers: Vec<String>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            ..Self::default()
        }
    }

    /// Answer `DONE` on every call.
    pub fn finishing() -> Self {
        Self::repeating(FINISH_ANSWER)
    }

    /// Answer `task` forever.
    pub fn repeating(task: &str) -> Self {
        Self {
            fallback: Some(task.to_string()),
            ..Self::default()
        }
    }

    /// Raise the abort flag for the request's workflow while answering the
    /// first call, as a concurrent abort request would.
    pub fn aborting(mut self, flags: Arc<AbortFlags>) -> Self {
        self.abort_on_first_call = Some(flags);
        self
    }

    pub fn calls(&self) -> usize {
        self.seen().len()
    }

    pub fn previous_agents(&self) -> Vec<String> {
        self.seen().into_iter().map(|r| r.previous_agent).collect()
    }

    fn seen(&self) -> Vec<OracleRequest> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ContinuationOracle for ScriptedOracle {
    fn next_task(&self, request: &OracleRequest) -> Result<String> {
        let first_call = {
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            seen.push(request.clone());
            seen.len() == 1
        };
        if let Some(flags) = self.abort_on_first_call.as_ref().filter(|_| first_call) {
            flags.raise(&request.workflow_id);
        }
        let next = self
            .answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow!("scripted oracle exhausted"))
    }
}
