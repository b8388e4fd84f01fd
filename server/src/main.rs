use anyhow::{Context, Result};
use bigsearch_core::{EngineConfig, SearchEngine};
use clap::Parser;
use server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Data directory holding barrels, rankings and semantic artifacts
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Optional JSON engine configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Seconds between background cache flushes (0 disables)
    #[arg(long, default_value_t = 60)]
    flush_interval_secs: u64,
}

const AUTOSAVE_POLL: Duration = Duration::from_secs(1);

/// Writes the word cache off the request path: whenever enough mutations have
/// piled up, and unconditionally every `flush_every`.
async fn background_persistence(engine: Arc<SearchEngine>, flush_every: Option<Duration>) {
    let mut poll = tokio::time::interval(AUTOSAVE_POLL);
    let mut last_flush = tokio::time::Instant::now();
    loop {
        poll.tick().await;
        let force = flush_every.is_some_and(|every| last_flush.elapsed() >= every);
        let task = {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || if force { engine.flush().map(|()| true) } else { engine.autosave() })
        };
        match task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %format!("{e:#}"), "background cache persistence failed"),
            Err(e) => tracing::warn!(error = %e, "background cache persistence task panicked"),
        }
        if force {
            last_flush = tokio::time::Instant::now();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    let engine = Arc::new(
        tokio::task::spawn_blocking(move || SearchEngine::open(config))
            .await?
            .context("search engine failed to start")?,
    );

    {
        let engine = Arc::clone(&engine);
        let flush_every = (args.flush_interval_secs > 0).then(|| Duration::from_secs(args.flush_interval_secs));
        tokio::spawn(background_persistence(engine, flush_every));
    }

    let app = build_app(Arc::clone(&engine), std::env::var("ADMIN_TOKEN").ok());
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    tokio::task::spawn_blocking(move || engine.flush()).await??;
    tracing::info!("final flush complete");
    Ok(())
}
