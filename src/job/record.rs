//! Job records: the unit of state tracked from upload to terminal outcome.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// Opaque job identifier, unique for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        JobId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Lifecycle state of a job.
///
/// Transitions are one-way: `Queued → Analyzing → Processing → Complete`,
/// with `Error` reachable from `Analyzing` or `Processing`. `Complete` and
/// `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Analyzing,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Statistics collected over a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
}

/// Diagnostic metadata about the source file.
///
/// Never blocks a conversion except for encryption. `warnings` is
/// guaranteed non-empty once a job reaches a terminal state — a clean run
/// gets the placeholder entry `"None"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub encryption: String,
    pub scanned_pages: String,
    pub font_issues: String,
    pub warnings: Vec<String>,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            encryption: "None".to_string(),
            scanned_pages: "Detection not run (OCR skipped)".to_string(),
            font_issues: "Basic check passed".to_string(),
            warnings: Vec::new(),
        }
    }
}

impl HealthReport {
    /// Insert the placeholder entry so `warnings` is never empty in a
    /// terminal record.
    pub fn finalize_warnings(&mut self) {
        if self.warnings.is_empty() {
            self.warnings.push("None".to_string());
        }
    }
}

/// One tracked conversion job.
///
/// Created by the HTTP surface on upload, mutated only by its runner task
/// while running, read by polling clients throughout.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    /// Integer percentage. Non-decreasing within a run, reset to 0 on error.
    pub progress: u8,
    /// Seconds estimate, set after analysis, set to 0 on completion.
    pub estimated_time: Option<f64>,
    /// Captured at creation; elapsed processing time is measured from here.
    pub started_at: Instant,
    pub input_path: PathBuf,
    pub original_filename: Option<String>,
    /// Output kind ("docx") to produced file path. Populated iff complete.
    pub outputs: Option<HashMap<String, PathBuf>>,
    pub stats: JobStats,
    pub health: HealthReport,
    /// Populated iff status is [`JobStatus::Error`].
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(id: JobId, input_path: PathBuf, original_filename: Option<String>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            estimated_time: None,
            started_at: Instant::now(),
            input_path,
            original_filename,
            outputs: None,
            stats: JobStats::default(),
            health: HealthReport::default(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Analyzing).unwrap(),
            "\"analyzing\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Analyzing.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn fresh_record_is_queued_with_empty_diagnostics() {
        let rec = JobRecord::new(JobId::new(), PathBuf::from("/tmp/in.pdf"), None);
        assert_eq!(rec.status, JobStatus::Queued);
        assert_eq!(rec.progress, 0);
        assert!(rec.outputs.is_none());
        assert!(rec.error.is_none());
        assert!(rec.health.warnings.is_empty());
        assert_eq!(rec.health.encryption, "None");
    }

    #[test]
    fn finalize_warnings_inserts_placeholder_once() {
        let mut health = HealthReport::default();
        health.finalize_warnings();
        assert_eq!(health.warnings, vec!["None".to_string()]);

        let mut health = HealthReport::default();
        health.warnings.push("Analysis Error: boom".to_string());
        health.finalize_warnings();
        assert_eq!(health.warnings.len(), 1);
        assert_ne!(health.warnings[0], "None");
    }

    #[test]
    fn stats_skip_unset_fields() {
        let json = serde_json::to_value(JobStats::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let json = serde_json::to_value(JobStats {
            page_count: Some(3),
            processing_time_seconds: Some(1.25),
        })
        .unwrap();
        assert_eq!(json["page_count"], 3);
    }
}
