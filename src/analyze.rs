//! Source-document analysis: structural metadata used for diagnostics.
//!
//! Analysis inspects the uploaded PDF without altering it and feeds the
//! job's health report and time estimate. It is best-effort: only
//! encryption stops a job, everything else degrades to a warning.
//!
//! ## Why a trait seam?
//!
//! The analyzer is one of the two opaque collaborators of the job runner
//! (the other being the conversion engine). Hiding it behind
//! [`DocumentAnalyzer`] keeps the runner testable with stub
//! implementations and leaves room to swap the PDF backend without
//! touching the state machine.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state; it must not run on the
//! async worker threads. `tokio::task::spawn_blocking` moves the parsing
//! onto the blocking pool so conversions never stall the HTTP executor.

use crate::error::AnalyzeError;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Structural metadata about a source document.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub page_count: usize,
    /// Whether the first page carries any font-bearing text objects.
    /// `false` usually means a scanned or image-only document.
    pub first_page_has_fonts: bool,
    /// Encryption flag. A `true` here is fatal for the job.
    pub encrypted: bool,
}

/// Inspects a source file for page count, font presence, and encryption.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<AnalysisReport, AnalyzeError>;
}

/// pdfium-backed analyzer.
pub struct PdfiumAnalyzer;

#[async_trait]
impl DocumentAnalyzer for PdfiumAnalyzer {
    async fn analyze(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let path = path.to_path_buf();
        let task_path = path.clone();
        let password = password.map(|s| s.to_string());

        tokio::task::spawn_blocking(move || analyze_blocking(&task_path, password.as_deref()))
            .await
            .map_err(|e| AnalyzeError::Unreadable {
                path,
                detail: format!("analysis task panicked: {e}"),
            })?
    }
}

/// Blocking implementation of document analysis.
fn analyze_blocking(path: &Path, password: Option<&str>) -> Result<AnalysisReport, AnalyzeError> {
    let pdfium = Pdfium::default();

    let document = pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{e:?}");
        // pdfium reports password-protected documents as a load failure;
        // that is the encryption signal the runner treats as fatal.
        if detail.contains("Password") || detail.contains("password") {
            AnalyzeError::Encrypted {
                path: path.to_path_buf(),
            }
        } else {
            AnalyzeError::Unreadable {
                path: path.to_path_buf(),
                detail,
            }
        }
    })?;

    let pages = document.pages();
    let page_count = pages.len() as usize;

    let first_page_has_fonts = match pages.get(0) {
        Ok(page) => page
            .objects()
            .iter()
            .any(|object| object.object_type() == PdfPageObjectType::Text),
        Err(_) => false,
    };

    debug!(
        "analyzed '{}': {} pages, fonts_on_first_page={}",
        path.display(),
        page_count,
        first_page_has_fonts
    );

    Ok(AnalysisReport {
        page_count,
        first_page_has_fonts,
        // Encrypted documents fail the load above; reaching here means the
        // document opened cleanly.
        encrypted: false,
    })
}
