//! Router server: HTTP surface over the open-loop router and the closed-loop
//! workflow tracker.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use taskrouter::io::config::load_config_with_env;
use taskrouter::io::init::RouterPaths;
use taskrouter::route::router_from_config;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "taskrouter-server")]
#[command(about = "HTTP server for task routing and workflow tracking")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8085")]
    port: u16,

    /// Project directory (contains .taskrouter/)
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskrouter::logging::init("taskrouter_server=info,taskrouter=info");

    let args = Args::parse();

    let project_dir = args.project_dir.canonicalize().unwrap_or(args.project_dir);
    info!(project_dir = %project_dir.display(), "starting taskrouter-server");

    let paths = RouterPaths::new(&project_dir);
    let cfg = load_config_with_env(&paths.config_path)?;
    let log_dir = paths.log_dir(&cfg);
    let router = router_from_config(&cfg, &log_dir)
        .with_context(|| format!("open router in {}", log_dir.display()))?;
    info!(log_dir = %log_dir.display(), max_steps = cfg.max_steps_default, "router ready");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::app_router()
        .layer(cors)
        .with_state(AppState::new(router));

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
