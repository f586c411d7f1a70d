//! Server binary for pdf2docx-service.
//!
//! A thin shim over the library crate: parses CLI flags, loads the TOML
//! configuration, initialises logging, and starts the HTTP server.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use pdf2docx_service::http::routes::configure_routes;
use pdf2docx_service::{AppState, ConfigError, ServiceConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pdf2docx-service",
    version,
    about = "HTTP service converting PDF documents to DOCX with polled job tracking"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml", env = "PDF2DOCX_CONFIG")]
    config: PathBuf,

    /// Override the listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the request-worker count (0 = one per CPU core).
    #[arg(long)]
    workers: Option<usize>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match ServiceConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(ConfigError::Read { path, .. }) => {
            eprintln!(
                "Warning: config file '{}' not found, using defaults",
                path.display()
            );
            let mut config = ServiceConfig::default();
            config.apply_env_overrides()?;
            config
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(workers) = cli.workers {
        config.server.workers = workers;
    }
    config.validate()?;

    init_logging(&config.logging.level)?;

    info!(
        "Starting pdf2docx-service v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "Configuration loaded: host={}, port={}, engine='{}', max_concurrent={}",
        config.server.host, config.server.port, config.engine.command, config.jobs.max_concurrent
    );

    let state = AppState::with_defaults(config.clone())
        .context("creating upload/output directories")?;
    info!(
        "Storage ready: uploads={}, outputs={}",
        config.storage.upload_dir.display(),
        config.storage.output_dir.display()
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting HTTP server on {}", bind_addr);
    info!("Endpoints: POST /api/convert, GET /api/progress/{{id}}, GET /api/results/{{id}}, GET /api/download/{{filename}}");

    let workers = if config.server.workers == 0 {
        num_cpus::get()
    } else {
        config.server.workers
    };

    HttpServer::new(move || {
        // Browser clients upload directly; CORS stays wide open.
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_addr)?
    .workers(workers)
    .keep_alive(Duration::from_secs(config.server.keep_alive_seconds))
    .client_request_timeout(Duration::from_secs(config.server.client_timeout_seconds))
    .run()
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialise tracing with an env-filter; `RUST_LOG` wins over the
/// configured level. The `log` bridge picks up actix's request logger.
fn init_logging(level: &str) -> Result<()> {
    // A second init (e.g. under a test harness) is harmless.
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}
