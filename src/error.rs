//! Error types for the pdf2docx-service library.
//!
//! Three error types reflect the three places a job can go wrong:
//!
//! * [`AnalyzeError`] — the analyzer could not inspect the source PDF.
//!   Encryption is the only fatal analysis failure; everything else is
//!   downgraded to a health-report warning and the job proceeds, because
//!   analysis is diagnostic-only.
//!
//! * [`EngineError`] — the external conversion engine failed. Always fatal
//!   for the job it belongs to.
//!
//! * [`ConvertError`] — the tagged error that terminates a job run. Each
//!   variant carries the failing stage and structured context (path,
//!   underlying cause) so consumers can match on the kind instead of
//!   string-matching a message.
//!
//! HTTP handlers never see these directly: the runner folds a
//! `ConvertError` into the job record's terminal `error` field, and the
//! handlers read that.

use std::path::PathBuf;
use thiserror::Error;

/// The stage of a job run an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    /// Inspecting the source PDF (page count, fonts, encryption).
    Analyzing,
    /// Running the external conversion engine.
    Processing,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Analyzing => write!(f, "analysis"),
            JobStage::Processing => write!(f, "conversion"),
        }
    }
}

/// Failures reported by a [`crate::analyze::DocumentAnalyzer`].
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// The document is password-protected. Fatal: encrypted input is never
    /// accepted, with or without a supplied password.
    #[error("PDF '{path}' is encrypted")]
    Encrypted { path: PathBuf },

    /// The document could not be opened or parsed. Non-fatal: recorded as
    /// a warning and the run proceeds to conversion anyway.
    #[error("failed to read PDF '{path}': {detail}")]
    Unreadable { path: PathBuf, detail: String },
}

/// Failures reported by a [`crate::engine::ConversionEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The converter process could not be started at all.
    #[error("failed to spawn converter '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The converter ran but exited unsuccessfully.
    #[error("converter exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// The converter exceeded the configured wall-clock limit and was killed.
    #[error("converter timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// The converter claimed success but the output file does not exist.
    #[error("converter produced no output at '{path}'")]
    MissingOutput { path: PathBuf },
}

/// The error that terminates a job run.
///
/// `Display` output is what ends up in the job record's `error` field
/// (prefixed with `"Conversion failed: "` by the runner), so the messages
/// here are user-facing.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The source PDF is password-protected.
    #[error("Password-protected PDFs are not supported.")]
    EncryptedInput { path: PathBuf },

    /// The external conversion engine failed.
    #[error("{source}")]
    Engine {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    /// The run was cancelled through the internal cancellation flag.
    /// No HTTP surface triggers this yet.
    #[error("conversion was cancelled")]
    Cancelled,
}

impl ConvertError {
    /// The stage the error belongs to.
    pub fn stage(&self) -> JobStage {
        match self {
            ConvertError::EncryptedInput { .. } => JobStage::Analyzing,
            ConvertError::Engine { .. } | ConvertError::Cancelled => JobStage::Processing,
        }
    }

    /// The source file the failed job was working on, when known.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConvertError::EncryptedInput { path } | ConvertError::Engine { path, .. } => Some(path),
            ConvertError::Cancelled => None,
        }
    }
}
