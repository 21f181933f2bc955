use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_exporter::cli::Cli;
use token_exporter::config;
use token_exporter::gitlab::GitLabClient;
use token_exporter::metrics::ExporterMetrics;
use token_exporter::scraper::TokenScraper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "token_exporter=info,tower_http=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();
    let port = args.port.unwrap_or(cfg.port);

    let client = GitLabClient::new(&cfg.gitlab_base_url, cfg.gitlab_token.clone())?;
    let metrics = Arc::new(ExporterMetrics::new()?);

    // Cooperative cancellation: the scraper checks this only between
    // cycles, so an in-flight cycle always completes before shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scraper = TokenScraper::new(
        client,
        metrics.clone(),
        cfg.project_ids.clone(),
        cfg.group_ids.clone(),
    );
    let scraper_task = tokio::spawn(scraper.run(cfg.scrape_interval, shutdown_rx));

    let app = axum::Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(metrics.clone())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("token exporter listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    scraper_task.await?;
    tracing::info!("exporter stopped gracefully");

    Ok(())
}

/// Serve the registry contents in Prometheus text exposition format.
async fn serve_metrics(State(metrics): State<Arc<ExporterMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.encode(),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
