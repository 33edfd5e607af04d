use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use classroom_backend_lib::{config::load_settings, router, AppState};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Login proxy between the classroom web app and the upstream Classroom API
#[derive(Debug, Parser)]
#[command(name = "classroom-proxy", version)]
struct Cli {
    /// TOML config file (defaults to ./classroom.toml when present)
    #[arg(short, long, env = "CLASSROOM_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Listen address, overrides the configured one
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown requested, cancelling in-flight logins");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref())?;
    init_tracing(&settings.log_level, cli.json_logs);

    if let Some(pinned) = &settings.pinned_login_path {
        warn!(
            pinned = %settings.dispatch_url(pinned),
            candidates = settings.candidate_paths.len(),
            "all candidate login paths are dispatched to the pinned path; set CLASSROOM_PINNED_LOGIN_PATH= to use them as configured"
        );
    }
    info!(
        base = %settings.base_url,
        paths = ?settings.candidate_paths,
        header_mode = ?settings.header_mode(),
        verbose = settings.verbose_logging,
        "upstream login configured"
    );

    let addr = cli.bind.unwrap_or(settings.bind_addr);
    let state = AppState::new(settings).context("building login broker")?;
    let shutdown = state.shutdown.clone();
    let app = router::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}
