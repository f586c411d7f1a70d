//! # pdf2docx-service
//!
//! HTTP service that converts uploaded PDF documents to DOCX and tracks
//! each conversion as a pollable job.
//!
//! ## Why a job tracker?
//!
//! Conversions take seconds to minutes, far beyond what a synchronous
//! request should hold open. Submission therefore returns a job id
//! immediately; the conversion runs on its own task and clients poll for
//! progress, then fetch a download reference once the job is terminal.
//!
//! ## Request Lifecycle
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Submit    validate + persist the file, create the job record
//!  ├─ 2. Analyze   page count, fonts, encryption (diagnostic, best-effort)
//!  ├─ 3. Convert   external engine invocation (opaque subprocess)
//!  ├─ 4. Finish    outputs + statistics + health report on the record
//!  └─ 5. Download  produced DOCX served as an attachment
//! ```
//!
//! The analyzer and the conversion engine sit behind trait seams
//! ([`DocumentAnalyzer`], [`ConversionEngine`]) so the job runner can be
//! exercised end-to-end with stub collaborators.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2docx_service::{AppState, ServiceConfig};
//! use pdf2docx_service::http::routes::configure_routes;
//! use actix_web::{App, HttpServer};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let state = AppState::with_defaults(ServiceConfig::default())?;
//!     HttpServer::new(move || {
//!         App::new()
//!             .app_data(actix_web::web::Data::new(state.clone()))
//!             .configure(configure_routes)
//!     })
//!     .bind(("0.0.0.0", 10000))?
//!     .run()
//!     .await
//! }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod job;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{AnalysisReport, DocumentAnalyzer, PdfiumAnalyzer};
pub use config::{ConfigError, ServiceConfig};
pub use engine::{CommandEngine, ConversionEngine, ConversionRequest};
pub use error::{AnalyzeError, ConvertError, EngineError, JobStage};
pub use http::AppState;
pub use job::{JobId, JobRecord, JobRunner, JobSpec, JobStatus, JobStore};
