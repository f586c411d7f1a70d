//! HTTP surface: application state, route registration, and handlers.

pub mod handlers;
pub mod routes;

use crate::analyze::{DocumentAnalyzer, PdfiumAnalyzer};
use crate::config::ServiceConfig;
use crate::engine::{CommandEngine, ConversionEngine};
use crate::job::{JobRunner, JobStore};
use std::sync::Arc;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub store: Arc<JobStore>,
    pub runner: Arc<JobRunner>,
}

impl AppState {
    /// Build application state around the given collaborators, creating
    /// the upload and output directories if absent.
    pub fn new(
        config: ServiceConfig,
        analyzer: Arc<dyn DocumentAnalyzer>,
        engine: Arc<dyn ConversionEngine>,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.storage.upload_dir)?;
        std::fs::create_dir_all(&config.storage.output_dir)?;

        let store = Arc::new(JobStore::new());
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&store),
            analyzer,
            engine,
            config.storage.output_dir.clone(),
            config.jobs.max_concurrent,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            runner,
        })
    }

    /// Build state with the production collaborators: the pdfium analyzer
    /// and the configured external converter command.
    pub fn with_defaults(config: ServiceConfig) -> std::io::Result<Self> {
        let engine = Arc::new(CommandEngine::new(config.engine.clone()));
        Self::new(config, Arc::new(PdfiumAnalyzer), engine)
    }
}
