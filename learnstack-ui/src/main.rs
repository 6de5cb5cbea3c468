//! Learnstack UI server - JSON API and event stream for the browser tutor.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use learnstack::io::config::{DEFAULT_CONFIG_FILE, load_config};
use learnstack::io::service::GeminiService;
use learnstack::logging;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::state::AppState;

/// Request-level progress from the server, warnings from the library.
const LOG_DEFAULT: &str = "warn,learnstack_ui=info";

#[derive(Parser)]
#[command(name = "learnstack-ui")]
#[command(about = "Web API for the learning-stack tutor")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Config file (missing file means defaults)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory containing UI static files
    #[arg(long, default_value = "ui/dist")]
    ui_dir: PathBuf,
}

impl Args {
    fn addr(&self) -> anyhow::Result<SocketAddr> {
        let raw = format!("{}:{}", self.bind, self.port);
        raw.parse()
            .with_context(|| format!("invalid bind address '{raw}'"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LOG_DEFAULT);

    let args = Args::parse();
    let addr = args.addr()?;
    let config = load_config(&args.config)?;
    info!(
        config = %args.config.display(),
        protocol = %config.protocol,
        model = %config.service.model,
        "starting learnstack-ui"
    );

    let service = Arc::new(GeminiService::new(&config.service));
    let app = build_app(AppState::new(config, service), &args.ui_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// API under `/api`, the event stream at `/events`, and the browser bundle
/// (when present) for everything else.
fn build_app(state: AppState, ui_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    if ui_dir.is_dir() {
        info!(ui_dir = %ui_dir.display(), "serving browser tutor");
        app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true))
    } else {
        info!(ui_dir = %ui_dir.display(), "no UI bundle found; serving the API only");
        app
    }
}
