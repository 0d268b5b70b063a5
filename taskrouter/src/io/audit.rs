//! Append-only audit sink.
//!
//! Three files live under the log directory:
//!
//! - `router_log.jsonl`: one JSON record per event (the journal).
//! - `build-summary.md`: narrative step trace.
//! - `CHANGELOG.md`: narrative final-summary trace.
//!
//! Every append across all three files happens under one mutex, so records
//! from concurrent workflows never interleave. There is no ordering guarantee
//! between unrelated workflows beyond that.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const NO_SUMMARY: &str = "_No summary provided._";

/// Why an auto-loop stopped before DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxSteps,
    Aborted,
}

/// Event payloads; `type` in the journal is the snake_case variant name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Step {
        step: u32,
        agent: String,
        instruction: String,
    },
    Done {
        step: u32,
        summary: Option<String>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_task: Option<String>,
    },
    UnknownAgent {
        agent: String,
        instruction: String,
    },
    Stopped {
        reason: StopReason,
        step: u32,
        max_steps: u32,
    },
    Aborted,
    Warn {
        step: u32,
        agent: String,
        message: String,
    },
    AgentResponse {
        step: u32,
        agent: String,
        response: String,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Step { .. } => "step",
            AuditEvent::Done { .. } => "done",
            AuditEvent::Error { .. } => "error",
            AuditEvent::UnknownAgent { .. } => "unknown_agent",
            AuditEvent::Stopped { .. } => "stopped",
            AuditEvent::Aborted => "aborted",
            AuditEvent::Warn { .. } => "warn",
            AuditEvent::AgentResponse { .. } => "agent_response",
        }
    }
}

#[derive(Serialize)]
struct JournalRecord<'a> {
    ts: &'a str,
    workflow_id: &'a str,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

#[derive(Debug, Clone)]
pub struct AuditPaths {
    pub journal_path: PathBuf,
    pub step_log_path: PathBuf,
    pub summary_log_path: PathBuf,
}

impl AuditPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            journal_path: dir.join("router_log.jsonl"),
            step_log_path: dir.join("build-summary.md"),
            summary_log_path: dir.join("CHANGELOG.md"),
        }
    }
}

/// Process-wide sink shared by every workflow.
#[derive(Debug)]
pub struct AuditSink {
    paths: AuditPaths,
    write_lock: Mutex<()>,
}

impl AuditSink {
    /// Open a sink rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create audit dir {}", dir.display()))?;
        Ok(Self {
            paths: AuditPaths::new(dir),
            write_lock: Mutex::new(()),
        })
    }

    pub fn paths(&self) -> &AuditPaths {
        &self.paths
    }

    /// Append one event to the journal and, where relevant, the narrative logs.
    pub fn append(&self, workflow_id: &str, event: &AuditEvent) -> Result<()> {
        let ts = timestamp();
        let mut line = serde_json::to_string(&JournalRecord {
            ts: &ts,
            workflow_id,
            event,
        })
        .context("serialize journal record")?;
        line.push('\n');
        let narrative = narrative_for(&ts, workflow_id, event);

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        append_text(&self.paths.journal_path, &line)?;
        if let Some(text) = &narrative.step_log {
            append_text(&self.paths.step_log_path, text)?;
        }
        if let Some(text) = &narrative.summary_log {
            append_text(&self.paths.summary_log_path, text)?;
        }
        debug!(workflow_id, kind = event.kind(), "audit event appended");
        Ok(())
    }

    /// Parse every journal record (for inspection and tests).
    pub fn journal_records(&self) -> Result<Vec<Value>> {
        let path = &self.paths.journal_path;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).with_context(|| format!("parse journal line {line}"))
            })
            .collect()
    }
}

#[derive(Default)]
struct Narrative {
    step_log: Option<String>,
    summary_log: Option<String>,
}

fn narrative_for(ts: &str, workflow_id: &str, event: &AuditEvent) -> Narrative {
    match event {
        AuditEvent::Step {
            agent, instruction, ..
        } => Narrative {
            step_log: Some(format!(
                "- {ts} | `{workflow_id}` | **{agent}** -> {}\n",
                instruction.replace('\n', "\n  ")
            )),
            summary_log: None,
        },
        AuditEvent::Done { summary, .. } => {
            let body = summary.as_deref().unwrap_or(NO_SUMMARY).trim();
            Narrative {
                step_log: Some(format!(
                    "\n### {ts} | Final Summary ({workflow_id})\n{body}\n\n"
                )),
                summary_log: Some(format!(
                    "## {ts} | Workflow {workflow_id} Completed\n{body}\n\n"
                )),
            }
        }
        AuditEvent::Stopped {
            reason, max_steps, ..
        } => {
            let message = match reason {
                StopReason::MaxSteps => format!("Stopped due to step limit ({max_steps})."),
                StopReason::Aborted => "Stopped after abort request.".to_string(),
            };
            Narrative {
                step_log: Some(format!(
                    "- {ts} | `{workflow_id}` | **Router** -> {message}\n"
                )),
                summary_log: None,
            }
        }
        AuditEvent::Aborted => Narrative {
            step_log: Some(format!("\n### {ts} | Aborted ({workflow_id})\n")),
            summary_log: None,
        },
        AuditEvent::Error { .. }
        | AuditEvent::UnknownAgent { .. }
        | AuditEvent::Warn { .. }
        | AuditEvent::AgentResponse { .. } => Narrative::default(),
    }
}

fn append_text(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("append {}", path.display()))
}

/// Local time, second precision, ISO-8601.
pub fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}
