//! Closed-loop workflow tracker.
//!
//! Holds a pre-declared ordered plan and the set of completed step numbers.
//! Selection is deterministic: the lowest-numbered incomplete step is always
//! next. Rejected completions never mutate state.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::types::TrackerError;

/// One declared step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: u32,
    pub agent_role: String,
    pub policy: String,
    pub instruction: String,
}

/// A complete plan for one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub workflow_id: String,
    pub total_steps: u32,
    pub steps: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_goal: Option<String>,
}

impl WorkflowPlan {
    /// Check the plan is non-empty and indexed exactly `1..=total_steps`.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.workflow_id.trim().is_empty() {
            return Err(TrackerError::MissingWorkflowId);
        }
        if self.steps.is_empty() {
            return Err(TrackerError::EmptySteps);
        }
        if self.steps.len() != self.total_steps as usize {
            return Err(TrackerError::MalformedPlan(format!(
                "total_steps is {} but {} steps were declared",
                self.total_steps,
                self.steps.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if step.step == 0 || step.step > self.total_steps {
                return Err(TrackerError::MalformedPlan(format!(
                    "step {} is outside 1..={}",
                    step.step, self.total_steps
                )));
            }
            if !seen.insert(step.step) {
                return Err(TrackerError::MalformedPlan(format!(
                    "step {} declared more than once",
                    step.step
                )));
            }
        }
        Ok(())
    }
}

/// A reported step completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub step: u32,
    pub agent_role: String,
    pub policy: String,
    pub task: String,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Completed,
}

/// Execution log entry, appended in completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub step: u32,
    pub agent_role: String,
    pub policy: String,
    pub instruction: String,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub status: EntryStatus,
}

/// Files touched by a workflow, deduplicated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub created: Vec<String>,
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub completed_steps: u32,
    pub total_steps: u32,
    pub percentage: f64,
}

/// Read-only snapshot of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_goal: Option<String>,
    pub status: WorkflowStatus,
    pub progress: Progress,
    pub execution_log: Vec<ExecutionLogEntry>,
    pub file_manifest: FileManifest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionSummary {
    pub total_steps_completed: u32,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub agents_used: Vec<String>,
    pub execution_log: Vec<ExecutionLogEntry>,
}

/// State for one closed-loop workflow.
#[derive(Debug, Clone)]
pub struct WorkflowTracker {
    plan: WorkflowPlan,
    index: HashMap<u32, usize>,
    completed: BTreeSet<u32>,
    execution_log: Vec<ExecutionLogEntry>,
    created: Vec<String>,
    modified: Vec<String>,
}

impl WorkflowTracker {
    pub fn new(plan: WorkflowPlan) -> Result<Self, TrackerError> {
        plan.validate()?;
        let index = plan
            .steps
            .iter()
            .enumerate()
            .map(|(pos, step)| (step.step, pos))
            .collect();
        Ok(Self {
            plan,
            index,
            completed: BTreeSet::new(),
            execution_log: Vec::new(),
            created: Vec::new(),
            modified: Vec::new(),
        })
    }

    pub fn workflow_id(&self) -> &str {
        &self.plan.workflow_id
    }

    pub fn total_steps(&self) -> u32 {
        self.plan.total_steps
    }

    pub fn original_goal(&self) -> Option<&str> {
        self.plan.original_goal.as_deref()
    }

    pub fn step(&self, number: u32) -> Option<&PlanStep> {
        self.index.get(&number).map(|&pos| &self.plan.steps[pos])
    }

    /// Lowest-numbered step not yet completed.
    pub fn next_pending_step(&self) -> Option<&PlanStep> {
        (1..=self.plan.total_steps)
            .find(|number| !self.completed.contains(number))
            .and_then(|number| self.step(number))
    }

    pub fn record_completion(&mut self, completion: Completion) -> Result<(), TrackerError> {
        if !self.index.contains_key(&completion.step) {
            return Err(TrackerError::UnknownStep(completion.step));
        }
        if self.completed.contains(&completion.step) {
            return Err(TrackerError::DuplicateCompletion(completion.step));
        }

        self.completed.insert(completion.step);
        self.created.extend(completion.files_created.iter().cloned());
        self.modified.extend(completion.files_modified.iter().cloned());
        self.execution_log.push(ExecutionLogEntry {
            step: completion.step,
            agent_role: completion.agent_role,
            policy: completion.policy,
            instruction: completion.task,
            files_created: completion.files_created,
            files_modified: completion.files_modified,
            status: EntryStatus::Completed,
        });

        info!(
            workflow_id = %self.plan.workflow_id,
            step = completion.step,
            completed = self.completed.len(),
            total = self.plan.total_steps,
            "step completed"
        );
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.completed.len() == self.plan.total_steps as usize
    }

    pub fn completed_count(&self) -> u32 {
        self.completed.len() as u32
    }

    pub fn execution_log(&self) -> &[ExecutionLogEntry] {
        &self.execution_log
    }

    pub fn file_manifest(&self) -> FileManifest {
        FileManifest {
            created: distinct(&self.created),
            modified: distinct(&self.modified),
        }
    }

    pub fn completion_summary(&self) -> CompletionSummary {
        let roles: Vec<String> = self
            .execution_log
            .iter()
            .map(|entry| entry.agent_role.clone())
            .collect();
        let manifest = self.file_manifest();
        CompletionSummary {
            total_steps_completed: self.completed_count(),
            files_created: manifest.created,
            files_modified: manifest.modified,
            agents_used: distinct(&roles),
            execution_log: self.execution_log.clone(),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let completed = self.completed_count();
        let total = self.plan.total_steps;
        let percentage = if total > 0 {
            f64::from(completed) / f64::from(total) * 100.0
        } else {
            0.0
        };
        StatusSnapshot {
            workflow_id: self.plan.workflow_id.clone(),
            original_goal: self.original_goal().map(str::to_string),
            status: if self.is_complete() {
                WorkflowStatus::Complete
            } else {
                WorkflowStatus::InProgress
            },
            progress: Progress {
                completed_steps: completed,
                total_steps: total,
                percentage,
            },
            execution_log: self.execution_log.clone(),
            file_manifest: self.file_manifest(),
        }
    }
}

fn distinct(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{completion, plan};

    #[test]
    fn next_pending_is_lowest_incomplete() {
        let mut tracker = WorkflowTracker::new(plan("wf", 3)).expect("tracker");
        assert_eq!(tracker.next_pending_step().map(|s| s.step), Some(1));

        tracker.record_completion(completion(2)).expect("complete 2");
        assert_eq!(tracker.next_pending_step().map(|s| s.step), Some(1));

        tracker.record_completion(completion(1)).expect("complete 1");
        assert_eq!(tracker.next_pending_step().map(|s| s.step), Some(3));
    }

    #[test]
    fn completing_every_step_finishes_workflow() {
        let mut tracker = WorkflowTracker::new(plan("wf", 3)).expect("tracker");
        while let Some(step) = tracker.next_pending_step().map(|s| s.step) {
            assert!(!tracker.is_complete());
            tracker.record_completion(completion(step)).expect("complete");
        }
        assert!(tracker.is_complete());
        assert!(tracker.next_pending_step().is_none());
        assert_eq!(tracker.status().status, WorkflowStatus::Complete);
        assert_eq!(tracker.status().progress.percentage, 100.0);
    }

    #[test]
    fn duplicate_completion_leaves_state_untouched() {
        let mut tracker = WorkflowTracker::new(plan("wf", 2)).expect("tracker");
        let mut first = completion(1);
        first.files_created = vec!["index.html".to_string()];
        tracker.record_completion(first.clone()).expect("complete");

        let mut again = first;
        again.files_created = vec!["other.html".to_string()];
        let err = tracker.record_completion(again).unwrap_err();

        assert_eq!(err, TrackerError::DuplicateCompletion(1));
        assert_eq!(tracker.execution_log().len(), 1);
        assert_eq!(tracker.file_manifest().created, vec!["index.html"]);
    }

    #[test]
    fn unknown_step_is_rejected() {
        let mut tracker = WorkflowTracker::new(plan("wf", 2)).expect("tracker");
        let err = tracker.record_completion(completion(7)).unwrap_err();
        assert_eq!(err, TrackerError::UnknownStep(7));
        assert_eq!(tracker.completed_count(), 0);
    }

    #[test]
    fn manifest_and_roles_are_deduplicated_on_read() {
        let mut tracker = WorkflowTracker::new(plan("wf", 2)).expect("tracker");
        let mut one = completion(1);
        one.files_created = vec!["a.rs".to_string(), "b.rs".to_string()];
        one.files_modified = vec!["Cargo.toml".to_string()];
        let mut two = completion(2);
        two.files_created = vec!["b.rs".to_string()];
        two.files_modified = vec!["Cargo.toml".to_string(), "a.rs".to_string()];
        tracker.record_completion(one).expect("one");
        tracker.record_completion(two).expect("two");

        let summary = tracker.completion_summary();
        assert_eq!(summary.total_steps_completed, 2);
        assert_eq!(summary.files_created, vec!["a.rs", "b.rs"]);
        assert_eq!(summary.files_modified, vec!["Cargo.toml", "a.rs"]);
        assert_eq!(summary.agents_used, vec!["FileCreator"]);
        assert_eq!(summary.execution_log.len(), 2);
    }

    #[test]
    fn status_reports_partial_progress() {
        let mut tracker = WorkflowTracker::new(plan("wf", 4)).expect("tracker");
        tracker.record_completion(completion(1)).expect("complete");
        let status = tracker.status();
        assert_eq!(status.status, WorkflowStatus::InProgress);
        assert_eq!(status.original_goal.as_deref(), Some("ship the landing page"));
        assert_eq!(status.progress.completed_steps, 1);
        assert_eq!(status.progress.total_steps, 4);
        assert_eq!(status.progress.percentage, 25.0);
        assert_eq!(status.execution_log[0].status, EntryStatus::Completed);
    }

    #[test]
    fn validate_rejects_gaps_and_mismatched_totals() {
        let mut gapped = plan("wf", 3);
        gapped.steps[2].step = 4;
        assert!(matches!(
            gapped.validate(),
            Err(TrackerError::MalformedPlan(_))
        ));

        let mut short = plan("wf", 3);
        short.total_steps = 5;
        assert!(matches!(short.validate(), Err(TrackerError::MalformedPlan(_))));

        let mut repeated = plan("wf", 2);
        repeated.steps[1].step = 1;
        assert!(matches!(
            repeated.validate(),
            Err(TrackerError::MalformedPlan(_))
        ));

        let mut empty = plan("wf", 1);
        empty.steps.clear();
        empty.total_steps = 0;
        assert_eq!(empty.validate(), Err(TrackerError::EmptySteps));
    }
}
