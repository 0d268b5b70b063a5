//! Guard/ack protocol.
//!
//! Every instruction sent to a worker is wrapped so the worker must first
//! acknowledge the policy it operates under. The acknowledgment is a single
//! line with a fixed grammar:
//!
//! ```text
//! rules loaded (agent=<Agent> | rule=<PolicyTitle>)
//! ```
//!
//! The router checks the first line of the response against the agent and
//! policy it asked for. A mismatch is a soft failure handled by the caller.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::roster::AgentProfile;
use crate::core::types::AckCheck;

const TASK_BEGIN: &str = "<<<TASK";
const TASK_END: &str = "TASK>>>";

static ACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^rules loaded \(agent=(.+?) \| rule=(.+)\)$").expect("valid ack regex")
});

/// Render the exact acknowledgment line a worker must emit.
pub fn ack_line(agent: &str, policy_title: &str) -> String {
    format!("rules loaded (agent={agent} | rule={policy_title})")
}

/// Parsed acknowledgment line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub agent: String,
    pub rule: String,
}

/// Parse a single line against the ack grammar.
pub fn parse_ack(line: &str) -> Option<Ack> {
    let captures = ACK_RE.captures(line.trim())?;
    Some(Ack {
        agent: captures[1].trim().to_string(),
        rule: captures[2].trim().to_string(),
    })
}

/// Compare the first line of `response` with the required acknowledgment.
pub fn check_ack(response: &str, agent: &str, policy_title: &str) -> AckCheck {
    let first_line = response.trim_start().lines().next().unwrap_or_default();
    match parse_ack(first_line) {
        None => AckCheck::Missing,
        Some(ack) if ack.agent == agent && ack.rule == policy_title => AckCheck::Matched,
        Some(ack) => AckCheck::Mismatch {
            agent: ack.agent,
            rule: ack.rule,
        },
    }
}

/// Instruction wrapped with the guard preamble for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedInstruction {
    pub agent: String,
    /// Agent token as routed, echoed back in the task section.
    pub routed_agent: String,
    pub policy_title: String,
    pub required_ack_line: String,
    pub raw_instruction: String,
}

impl GuardedInstruction {
    /// `routed_agent` is the token the task named, which may be the profile key.
    pub fn new(profile: &AgentProfile, routed_agent: &str, instruction: &str) -> Self {
        Self {
            agent: profile.display_name.clone(),
            routed_agent: routed_agent.to_string(),
            policy_title: profile.policy_title.clone(),
            required_ack_line: ack_line(&profile.display_name, &profile.policy_title),
            raw_instruction: instruction.to_string(),
        }
    }

    /// Render the full text handed to the worker.
    pub fn render(&self) -> String {
        format!(
            "You are {agent}. Before doing anything else:\n\
             1. Restate that you are acting as {agent}.\n\
             2. Apply the policy \"{policy}\" to everything that follows.\n\
             3. Emit exactly this line, alone, as the first line of your reply:\n\
             {ack}\n\
             4. Then execute the task below.\n\
             \n\
             {begin}\n\
             {routed}: {instruction}\n\
             {end}\n",
            agent = self.agent,
            policy = self.policy_title,
            ack = self.required_ack_line,
            routed = self.routed_agent,
            begin = TASK_BEGIN,
            instruction = self.raw_instruction,
            end = TASK_END,
        )
    }
}

/// Recover `(agent, instruction)` from the task section of a rendered instruction.
pub fn extract_task(rendered: &str) -> Option<(String, String)> {
    let start = rendered.find(TASK_BEGIN)? + TASK_BEGIN.len();
    let end = rendered.rfind(TASK_END)?;
    let section = rendered.get(start..end)?;
    let section = section.strip_prefix('\n')?.strip_suffix('\n')?;
    let (agent, instruction) = section.split_once(": ")?;
    Some((agent.to_string(), instruction.to_string()))
}
