//! Praxis API server: workspace management, objective runs and a change feed
//! over SSE.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use praxis::io::config::{config_path, load_config};
use praxis::io::generator::{CommandGenerator, RetryingGenerator};
use praxis::io::workspace_store::{Session, WorkspaceStore};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "praxis-api")]
#[command(about = "HTTP API for Praxis workspaces and objective runs")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Base directory holding the workspace registry
    #[arg(long, env = "PRAXIS_HOME")]
    base_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("praxis_api=info".parse()?)
                .add_directive("praxis=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let base_path = match args.base_path {
        Some(path) => path,
        None => dirs::desktop_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join("PraxisWorkspaces"))
            .ok_or_else(|| anyhow!("cannot determine a home directory; pass --base-path"))?,
    };
    let store = WorkspaceStore::open(&base_path)?;
    let session = Session::persistent(store)?;
    let config = load_config(&config_path(session.store().base_path()))?;
    info!(base_path = %session.store().base_path().display(), "starting praxis-api");

    let generator = Arc::new(RetryingGenerator::new(
        CommandGenerator::new(config.agents.clone()),
        &config.retry,
    ));
    let state = AppState::new(session, config, generator);

    sse::start_file_watcher(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
