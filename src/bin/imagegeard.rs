//! `imagegeard`: HTTP server for image uploads.
//!
//! Usage:
//!   imagegeard [--upload-dir <dir>] [--addr <addr>] [--index-path <file>]
//!
//! Every flag can also be given through the environment. Without
//! `--index-path` listings scan the upload directory and no reconciler runs.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use imagegear::{DiskStore, Gallery, GalleryConfig, Limits, RedbIndex};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Image upload server.
#[derive(Parser, Debug)]
#[command(name = "imagegeard", about = "Image upload server")]
struct Cli {
    /// Directory holding uploaded files. Created when missing.
    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploads")]
    upload_dir: PathBuf,

    /// Listen address.
    #[arg(long, env = "ADDR", default_value = "0.0.0.0:9999")]
    addr: String,

    /// Origin allowed by CORS.
    #[arg(long, env = "ALLOWED_ORIGIN", default_value = "http://localhost:3000")]
    allowed_origin: String,

    /// Metadata index file. Enables indexed listings and reconciliation.
    #[arg(long, env = "INDEX_PATH")]
    index_path: Option<PathBuf>,

    /// Seconds between reconciliation passes.
    #[arg(long = "reconcile-interval", env = "RECONCILE_INTERVAL_SECS", default_value_t = 30)]
    reconcile_interval_secs: u64,

    /// Concurrent per-file workers inside one request.
    #[arg(long, env = "WORKERS", default_value_t = imagegear::config::DEFAULT_WORKERS)]
    workers: usize,

    /// Per-file ceiling in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = imagegear::limits::DEFAULT_MAX_FILE_SIZE)]
    max_file_size: u64,

    /// Request body ceiling in bytes.
    #[arg(long, env = "MAX_BODY_SIZE", default_value_t = imagegear::limits::DEFAULT_MAX_BODY_SIZE)]
    max_body_size: u64,

    /// Accepted media kinds, comma separated.
    #[arg(long, env = "ACCEPT", default_value = "jpeg,png,gif,webp")]
    accept: String,

    /// Enables debug logging.
    #[arg(long, env = "DEBUG")]
    debug: bool,
}

impl Cli {
    fn gallery_config(&self) -> anyhow::Result<GalleryConfig> {
        let config = GalleryConfig {
            limits: Limits {
                max_file_size: Some(self.max_file_size),
                max_body_size: Some(self.max_body_size),
                max_files: None,
            },
            workers: self.workers,
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            allowed_kinds: GalleryConfig::parse_kinds(&self.accept)?,
            ..GalleryConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = cli.gallery_config()?;
    let origin = HeaderValue::from_str(&cli.allowed_origin)
        .with_context(|| format!("invalid allowed origin `{}`", cli.allowed_origin))?;

    let store = DiskStore::open(&cli.upload_dir)
        .await
        .with_context(|| format!("cannot use upload dir {}", cli.upload_dir.display()))?;
    info!(dir = %store.root().display(), "upload dir ready");

    let mut builder = Gallery::builder().with_config(config).storage(store);
    if let Some(path) = &cli.index_path {
        let index = RedbIndex::open(path)
            .with_context(|| format!("failed to open index {}", path.display()))?;
        info!(path = %path.display(), "metadata index opened");
        builder = builder.shared_index(Arc::new(index));
    } else {
        info!("no metadata index configured, listing scans the upload dir");
    }
    let gallery = builder.build()?;

    let token = CancellationToken::new();
    let reconciler = gallery.spawn_reconciler(token.clone());

    let app = imagegear::axum::router(gallery, Some(origin));
    let listener = tokio::net::TcpListener::bind(&cli.addr)
        .await
        .with_context(|| format!("failed to bind {}", cli.addr))?;
    info!(addr = %cli.addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    token.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE, reconciler).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "reconciler task failed"),
        Err(_) => warn!("reconciler did not stop in time"),
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}
