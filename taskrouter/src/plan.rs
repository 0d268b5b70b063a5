//! Closed-loop wire surface over a [`WorkflowStore`].
//!
//! Payloads arrive as loose JSON objects tagged by `type`. Each operation
//! checks the tag, lifts the payload into typed fields, and validates before
//! touching the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::core::tracker::{
    Completion, CompletionSummary, ExecutionLogEntry, PlanStep, StatusSnapshot, WorkflowPlan,
};
use crate::core::types::TrackerError;
use crate::store::{WorkflowStore, lock_tracker};

pub const PLAN_TYPE: &str = "all_steps_json";
pub const COMPLETION_TYPE: &str = "single_done_step_json";
pub const SERVICE_NAME: &str = "taskrouter";

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    workflow_id: Option<String>,
    #[serde(default)]
    total_steps: Option<u32>,
    #[serde(default)]
    steps: Option<Vec<PlanStep>>,
    #[serde(default)]
    original_goal: Option<String>,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

#[derive(Debug, Deserialize)]
struct CompletionPayload {
    #[serde(default)]
    workflow_id: Option<String>,
    #[serde(default)]
    step_number: Option<u32>,
    #[serde(default = "unknown")]
    completed_agent_role: String,
    #[serde(default = "unknown")]
    completed_policy: String,
    #[serde(default = "unknown")]
    completed_task: String,
    #[serde(default)]
    files_created: Vec<String>,
    #[serde(default)]
    files_modified: Vec<String>,
}

/// First step handed back by [`initialize_workflow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstStep {
    pub step: u32,
    pub agent_role: String,
    pub policy: String,
    pub instruction: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initialized {
    /// Always `"initialized"`.
    pub status: String,
    pub workflow_id: String,
    pub total_steps: u32,
    pub message: String,
    pub first_step: FirstStep,
}

/// Either the next step to dispatch or the final summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Continue {
        workflow_id: String,
        next_step_number: u32,
        total_steps: u32,
        agent_role: String,
        policy: String,
        instruction: String,
        context: String,
    },
    Complete {
        workflow_id: String,
        message: String,
        execution_log: Vec<ExecutionLogEntry>,
        summary: CompletionSummary,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub active_workflows: usize,
    pub service: String,
}

fn require_type(payload: &Value, expected: &'static str) -> Result<(), TrackerError> {
    match payload.get("type").and_then(Value::as_str) {
        Some(found) if found == expected => Ok(()),
        _ => Err(TrackerError::InvalidType { expected }),
    }
}

fn lift<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, TrackerError> {
    serde_json::from_value(payload).map_err(|err| TrackerError::InvalidPayload(err.to_string()))
}

/// Store a complete plan and return its first step.
#[instrument(skip_all)]
pub fn initialize_workflow(
    store: &WorkflowStore,
    payload: Value,
) -> Result<Initialized, TrackerError> {
    require_type(&payload, PLAN_TYPE)?;
    let payload: PlanPayload = lift(payload)?;

    let workflow_id = payload
        .workflow_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(TrackerError::MissingWorkflowId)?;
    if store.get(&workflow_id).is_some() {
        return Err(TrackerError::DuplicateWorkflow(workflow_id));
    }
    let (Some(total_steps), Some(steps)) = (payload.total_steps, payload.steps) else {
        return Err(TrackerError::MissingFields);
    };
    if steps.is_empty() {
        return Err(TrackerError::EmptySteps);
    }

    let goal = payload.original_goal;
    let tracker = store.create(WorkflowPlan {
        workflow_id: workflow_id.clone(),
        total_steps,
        steps,
        original_goal: goal.clone(),
    })?;
    let tracker = lock_tracker(&tracker);
    let first = tracker
        .next_pending_step()
        .ok_or_else(|| TrackerError::MalformedPlan("no valid first step".to_string()))?;
    info!(workflow_id = %workflow_id, total_steps, "workflow initialized");

    Ok(Initialized {
        status: "initialized".to_string(),
        workflow_id,
        total_steps,
        message: "Workflow initialized and stored. Ready for step execution.".to_string(),
        first_step: FirstStep {
            step: first.step,
            agent_role: first.agent_role.clone(),
            policy: first.policy.clone(),
            instruction: first.instruction.clone(),
            context: format!(
                "Total steps: {total_steps}. Goal: {}",
                goal.as_deref().unwrap_or("Not specified")
            ),
        },
    })
}

/// Record one completed step and return the next one, or the final summary.
#[instrument(skip_all)]
pub fn process_step_completion(
    store: &WorkflowStore,
    payload: Value,
) -> Result<StepOutcome, TrackerError> {
    require_type(&payload, COMPLETION_TYPE)?;
    let payload: CompletionPayload = lift(payload)?;

    let workflow_id = payload.workflow_id.unwrap_or_default();
    let tracker = store
        .get(&workflow_id)
        .ok_or_else(|| TrackerError::UnknownWorkflow(workflow_id.clone()))?;
    let step = payload.step_number.ok_or(TrackerError::MissingStepNumber)?;

    let mut tracker = lock_tracker(&tracker);
    tracker.record_completion(Completion {
        step,
        agent_role: payload.completed_agent_role,
        policy: payload.completed_policy,
        task: payload.completed_task,
        files_created: payload.files_created,
        files_modified: payload.files_modified,
    })?;

    if tracker.is_complete() {
        info!(workflow_id = %workflow_id, "workflow complete");
        return Ok(StepOutcome::Complete {
            message: format!("Workflow {workflow_id} completed successfully."),
            workflow_id,
            execution_log: tracker.execution_log().to_vec(),
            summary: tracker.completion_summary(),
        });
    }

    let total_steps = tracker.total_steps();
    let next = tracker.next_pending_step().ok_or_else(|| {
        TrackerError::MalformedPlan("no next step found, but workflow not complete".to_string())
    })?;
    info!(workflow_id = %workflow_id, completed = step, next = next.step, "step recorded");
    Ok(StepOutcome::Continue {
        workflow_id,
        next_step_number: next.step,
        total_steps,
        agent_role: next.agent_role.clone(),
        policy: next.policy.clone(),
        instruction: next.instruction.clone(),
        context: format!("Step {} of {total_steps}", next.step),
    })
}

pub fn get_workflow_status(
    store: &WorkflowStore,
    workflow_id: &str,
) -> Result<StatusSnapshot, TrackerError> {
    let tracker = store
        .get(workflow_id)
        .ok_or_else(|| TrackerError::UnknownWorkflow(workflow_id.to_string()))?;
    let snapshot = lock_tracker(&tracker).status();
    Ok(snapshot)
}

pub fn health_check(store: &WorkflowStore) -> ServiceHealth {
    ServiceHealth {
        status: "healthy".to_string(),
        active_workflows: store.len(),
        service: SERVICE_NAME.to_string(),
    }
}
