use anyhow::Result;
use menulens::ai::{AiService, OpenAiClient};
use menulens::config::Config;
use menulens::db;
use menulens::http::{create_router, AppState};
use menulens::worker::WorkerPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real environment variables win.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cfg = Config::from_env()?;

    let pool = db::init_pool(&cfg.database_url).await?;
    db::run_migrations(&pool).await?;

    let ai: Arc<dyn AiService> = Arc::new(OpenAiClient::with_base_url(
        cfg.ai_api_key.clone(),
        Duration::from_secs(cfg.ai_timeout_secs),
        reqwest::Url::parse(&cfg.ai_base_url)?,
    ));
    let workers = WorkerPool::spawn(
        pool.clone(),
        ai,
        cfg.worker_count,
        cfg.enrich_concurrency,
    );

    let state = AppState {
        pool,
        queue: workers.queue(),
        max_upload_bytes: cfg.max_upload_bytes,
    };
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    workers.shutdown().await;
    Ok(())
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
            .expect("failed to install TERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received shutdown signal"),
        _ = terminate => info!("received TERM signal"),
    }
}
