//! Shared types for router and tracker logic.
//!
//! Error enums here are the stable contract between the engine and its
//! surfaces (CLI, HTTP). Callers branch on the variant; the `Display` text is
//! what ends up in response bodies.

use serde::{Deserialize, Serialize};

/// Failures of the open-loop router.
///
/// Unknown agents and step-cap stops are reported in the response, not here.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid task format: expected '<Agent>: <instruction>' or 'DONE'")]
    InputFormat { raw: String },
    #[error("{collaborator} failed for agent '{agent}': {cause:#}")]
    Collaborator {
        collaborator: Collaborator,
        agent: String,
        cause: anyhow::Error,
    },
    #[error("audit sink failed: {0:#}")]
    Audit(anyhow::Error),
}

/// External party a route call depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    Invoker,
    Oracle,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collaborator::Invoker => f.write_str("agent invoker"),
            Collaborator::Oracle => f.write_str("continuation oracle"),
        }
    }
}

/// Rejections of the closed-loop tracker and its wire surface.
///
/// Every variant is raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Invalid type. Expected '{expected}'")]
    InvalidType { expected: &'static str },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Missing workflow_id")]
    MissingWorkflowId,
    #[error("Workflow {0} already exists. Use a unique workflow_id.")]
    DuplicateWorkflow(String),
    #[error("Workflow {0} not found. Initialize with all_steps_json first.")]
    UnknownWorkflow(String),
    #[error("Missing required fields: total_steps or steps")]
    MissingFields,
    #[error("steps must be a non-empty list")]
    EmptySteps,
    #[error("malformed plan: {0}")]
    MalformedPlan(String),
    #[error("Missing step_number")]
    MissingStepNumber,
    #[error("Step {0} does not exist in workflow")]
    UnknownStep(u32),
    #[error("Step {0} already completed")]
    DuplicateCompletion(u32),
}

/// Outcome of checking a worker's acknowledgment line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckCheck {
    /// First line matched agent and policy exactly.
    Matched,
    /// Response was empty or its first line did not follow the ack grammar.
    Missing,
    /// First line followed the grammar but named a different agent or policy.
    Mismatch { agent: String, rule: String },
}

impl AckCheck {
    pub fn is_matched(&self) -> bool {
        matches!(self, AckCheck::Matched)
    }
}
