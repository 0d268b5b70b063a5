//! In-memory workflow store and cooperative abort flags.
//!
//! The store is created by the caller and injected where needed. Each
//! tracker sits behind its own mutex, so two callers reporting against the
//! same workflow are serialized while unrelated workflows only share the
//! brief map lookup.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::core::tracker::{WorkflowPlan, WorkflowTracker};
use crate::core::types::TrackerError;

pub type SharedTracker = Arc<Mutex<WorkflowTracker>>;

#[derive(Debug, Default)]
pub struct WorkflowStore {
    workflows: Mutex<HashMap<String, SharedTracker>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `plan` and register a tracker for it.
    ///
    /// An existing workflow with the same id is left untouched.
    pub fn create(&self, plan: WorkflowPlan) -> Result<SharedTracker, TrackerError> {
        let workflow_id = plan.workflow_id.clone();
        let tracker = WorkflowTracker::new(plan)?;
        let mut workflows = self.map();
        if workflows.contains_key(&workflow_id) {
            return Err(TrackerError::DuplicateWorkflow(workflow_id));
        }
        let shared = Arc::new(Mutex::new(tracker));
        workflows.insert(workflow_id.clone(), Arc::clone(&shared));
        info!(workflow_id = %workflow_id, active = workflows.len(), "workflow registered");
        Ok(shared)
    }

    pub fn get(&self, workflow_id: &str) -> Option<SharedTracker> {
        self.map().get(workflow_id).cloned()
    }

    pub fn remove(&self, workflow_id: &str) -> Option<SharedTracker> {
        let removed = self.map().remove(workflow_id);
        if removed.is_some() {
            info!(workflow_id, "workflow removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, SharedTracker>> {
        self.workflows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lock a shared tracker, recovering from a poisoned mutex.
///
/// Tracker mutations validate before writing, so a panic elsewhere cannot
/// leave a half-applied completion behind.
pub fn lock_tracker(tracker: &SharedTracker) -> MutexGuard<'_, WorkflowTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Abort requests for running auto-loops, keyed by workflow id.
///
/// A flag lives only while at least one loop on its id is running; the last
/// [`RunGuard`] to drop clears it, so a later run on the same id starts clean.
#[derive(Debug, Default)]
pub struct AbortFlags {
    state: Mutex<AbortState>,
}

#[derive(Debug, Default)]
struct AbortState {
    running: HashMap<String, usize>,
    aborted: HashSet<String>,
}

impl AbortFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running loop on `workflow_id` until the guard drops.
    pub fn enter(&self, workflow_id: &str) -> RunGuard<'_> {
        *self
            .state()
            .running
            .entry(workflow_id.to_string())
            .or_default() += 1;
        RunGuard {
            flags: self,
            workflow_id: workflow_id.to_string(),
        }
    }

    /// Flag running loops on `workflow_id`. Returns false when none is running.
    pub fn raise(&self, workflow_id: &str) -> bool {
        let mut state = self.state();
        if !state.running.contains_key(workflow_id) {
            return false;
        }
        state.aborted.insert(workflow_id.to_string());
        true
    }

    pub fn is_raised(&self, workflow_id: &str) -> bool {
        self.state().aborted.contains(workflow_id)
    }

    /// Number of workflow ids with a running loop.
    pub fn running(&self) -> usize {
        self.state().running.len()
    }

    fn leave(&self, workflow_id: &str) {
        let mut state = self.state();
        let Some(count) = state.running.get_mut(workflow_id) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            state.running.remove(workflow_id);
            state.aborted.remove(workflow_id);
        }
    }

    fn state(&self) -> MutexGuard<'_, AbortState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks one running loop; dropping it ends the registration.
#[derive(Debug)]
pub struct RunGuard<'a> {
    flags: &'a AbortFlags,
    workflow_id: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flags.leave(&self.workflow_id);
    }
}
