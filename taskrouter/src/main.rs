//! Task router CLI.
//!
//! Routes `"<Agent>: <instruction>"` lines to worker agents under a guard
//! protocol and journals every step under the configured log directory.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use taskrouter::core::types::RouteError;
use taskrouter::exit_codes;
use taskrouter::io::config::load_config_with_env;
use taskrouter::io::init::{InitOptions, RouterPaths, init_router};
use taskrouter::logging;
use taskrouter::route::{ConfiguredRouter, RouteRequest, RouteResponse, router_from_config};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "taskrouter",
    version,
    about = "Route tasks to guarded worker agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.taskrouter/config.toml` and the log directory.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Route one task and print the JSON response.
    Route {
        /// `"<Agent>: <instruction>"` or `"DONE\n<summary>"`.
        task: String,
        /// Keep asking the continuation oracle until DONE or the step cap.
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        auto_loop: Option<bool>,
        #[arg(long)]
        workflow_id: Option<String>,
        /// Step cap for this call; 0 uses the configured default.
        #[arg(long)]
        max_steps: Option<u32>,
        /// Mark the call as an orchestrator kickoff (auto-loop unless disabled).
        #[arg(long)]
        from_taskrouter: bool,
    },
    /// Stop any auto-loop on a workflow at its next iteration.
    Abort { workflow_id: String },
    /// List the agent roster.
    Agents,
}

fn main() {
    logging::init("warn");
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = Path::new(".");
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Route {
            task,
            auto_loop,
            workflow_id,
            max_steps,
            from_taskrouter,
        } => cmd_route(
            root,
            RouteRequest {
                task,
                auto_loop,
                workflow_id,
                max_steps,
                from_taskrouter,
            },
        ),
        Command::Abort { workflow_id } => cmd_abort(root, &workflow_id),
        Command::Agents => cmd_agents(root),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_router(root, &InitOptions { force })?;
    println!("{}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_route(root: &Path, request: RouteRequest) -> Result<i32> {
    let router = open_router(root)?;
    let response = match router.route(request) {
        Ok(response) => response,
        Err(err @ RouteError::InputFormat { .. }) => {
            eprintln!("{err}");
            return Ok(exit_codes::INVALID);
        }
        Err(err) => return Err(err.into()),
    };
    print_json(&response)?;
    Ok(route_exit_code(&response))
}

fn route_exit_code(response: &RouteResponse) -> i32 {
    if response.stopped {
        exit_codes::STOPPED
    } else if !response.done && !response.forwarded {
        exit_codes::UNKNOWN_AGENT
    } else {
        exit_codes::OK
    }
}

fn cmd_abort(root: &Path, workflow_id: &str) -> Result<i32> {
    let router = open_router(root)?;
    let ack = router.abort(workflow_id)?;
    print_json(&ack)?;
    Ok(exit_codes::OK)
}

fn cmd_agents(root: &Path) -> Result<i32> {
    let paths = RouterPaths::new(root);
    let cfg = load_config_with_env(&paths.config_path)?;
    for profile in cfg.roster()?.profiles() {
        println!(
            "{}\t{}\t{}",
            profile.display_name, profile.key, profile.policy_title
        );
    }
    Ok(exit_codes::OK)
}

fn open_router(root: &Path) -> Result<ConfiguredRouter> {
    let paths = RouterPaths::new(root);
    let cfg = load_config_with_env(&paths.config_path)?;
    let log_dir = paths.log_dir(&cfg);
    debug!(log_dir = %log_dir.display(), "opening router");
    router_from_config(&cfg, &log_dir)
        .with_context(|| format!("open router in {}", log_dir.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(done: bool, forwarded: bool, stopped: bool) -> RouteResponse {
        RouteResponse {
            workflow_id: "wf".to_string(),
            step: 1,
            agent: None,
            message: None,
            done,
            forwarded,
            stopped,
            auto_loop: false,
        }
    }

    #[test]
    fn exit_codes_follow_response_shape() {
        assert_eq!(route_exit_code(&response(true, false, false)), exit_codes::OK);
        assert_eq!(route_exit_code(&response(false, true, false)), exit_codes::OK);
        assert_eq!(route_exit_code(&response(false, true, true)), exit_codes::STOPPED);
        assert_eq!(
            route_exit_code(&response(false, false, false)),
            exit_codes::UNKNOWN_AGENT
        );
    }

    #[test]
    fn auto_loop_flag_accepts_bare_and_explicit_forms() {
        let cli = Cli::parse_from(["taskrouter", "route", "X: y", "--auto-loop"]);
        let Command::Route { auto_loop, .. } = cli.command else {
            panic!("expected route");
        };
        assert_eq!(auto_loop, Some(true));

        let cli = Cli::parse_from(["taskrouter", "route", "X: y", "--auto-loop", "false"]);
        let Command::Route { auto_loop, .. } = cli.command else {
            panic!("expected route");
        };
        assert_eq!(auto_loop, Some(false));
    }
}
