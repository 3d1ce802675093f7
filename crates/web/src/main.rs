mod handlers;

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use autofix_agent::tool::ClaudeCodeTool;
use autofix_core::config::Config;
use autofix_jobs::{JobContext, JobQueue, QUEUE_CAPACITY, run_dispatcher};
use axum::extract::FromRef;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// How long to wait for an in-flight job after the listener has drained.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Clone, FromRef)]
pub struct AppState {
    config: Arc<Config>,
    queue: JobQueue,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    // .env is a development convenience; missing required values are fatal
    dotenvy::dotenv().ok();
    let config: Arc<Config> = Arc::new(Config::from_env().expect("Failed to load config"));
    tracing::info!("Configured {} repo mapping(s):", config.mappings.len());
    for mapping in &config.mappings {
        tracing::info!("  {} -> {}/{}", mapping.project, mapping.owner, mapping.repo);
    }

    let (queue, rx) = JobQueue::new(QUEUE_CAPACITY);
    let generator =
        Arc::new(ClaudeCodeTool::new(&config.agent.command, config.agent.api_key.clone()));
    let cancel = CancellationToken::new();
    let dispatcher = tokio::spawn(run_dispatcher(
        rx,
        JobContext { config: config.clone(), generator },
        cancel.clone(),
    ));

    let port = config.server.port;
    let router = handlers::build_router()
        .with_state(AppState { config, queue })
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    tracing::info!("Web server: Listening on {}", addr);
    tracing::info!("  POST /webhook/sentry - Sentry webhook endpoint");
    tracing::info!("  GET /health - Health check");
    let listener = TcpListener::bind(addr).await.expect("bind error");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error");
    if let Err(e) = result {
        tracing::error!("{e}");
    }
    tracing::info!("Web server stopped");

    // Stop pulling new jobs, then give any in-flight job a bounded window to
    // finish or fail on its own error paths. Anything still queued is lost.
    cancel.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE, dispatcher).await {
        Ok(Ok(())) => tracing::info!("Shut down gracefully"),
        Ok(Err(e)) => tracing::error!("Job dispatcher panicked: {e}"),
        Err(_) => tracing::warn!("Job dispatcher did not stop within the grace period"),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler");
        tokio::select! {
            result = signal::ctrl_c() => result.expect("Failed to listen for ctrl-c"),
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for ctrl-c");
    }
}
