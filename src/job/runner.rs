//! Job runner: drives one conversion through its lifecycle.
//!
//! ## State machine
//!
//! ```text
//! queued → analyzing → processing → complete
//!              │            │
//!              └────────────┴──→ error   (terminal, one-way)
//! ```
//!
//! Every transition mutates the job's store entry; nothing else is
//! observable outside the record. Within one job transitions are strictly
//! sequential; across jobs there is no ordering guarantee.
//!
//! ## Admission control
//!
//! Runs are admitted through a semaphore of `max_concurrent` permits
//! rather than an unbounded task-per-job spawn. A submission beyond the
//! cap stays `queued` (progress 0) until a slot frees, which is exactly
//! what the status already communicates to polling clients.
//!
//! ## Cancellation
//!
//! Each run carries a [`CancelFlag`], checked between stages. Nothing on
//! the HTTP surface raises it yet; it exists so client-initiated
//! cancellation can land without reworking the runner.

use crate::analyze::DocumentAnalyzer;
use crate::engine::{self, ConversionEngine, ConversionRequest};
use crate::error::{AnalyzeError, ConvertError};
use crate::job::record::{JobId, JobStatus};
use crate::job::store::JobStore;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Everything the runner needs to execute one submitted job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: JobId,
    pub input_path: PathBuf,
    pub original_filename: Option<String>,
    /// Accepted but deliberately without effect on the engine invocation;
    /// non-"balanced" values only produce a health-report warning.
    pub optimizer_setting: String,
    pub password: Option<String>,
}

/// Cooperative cancellation flag, checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a spawned job run.
pub struct JobHandle {
    id: JobId,
    cancel: CancelFlag,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Raise the cancellation flag. The run notices at its next
    /// stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish (terminal state reached).
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

/// Orchestrates job lifecycles against the store, analyzer, and engine.
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    store: Arc<JobStore>,
    analyzer: Arc<dyn DocumentAnalyzer>,
    engine: Arc<dyn ConversionEngine>,
    output_dir: PathBuf,
    limiter: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        analyzer: Arc<dyn DocumentAnalyzer>,
        engine: Arc<dyn ConversionEngine>,
        output_dir: PathBuf,
        max_concurrent: usize,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                store,
                analyzer,
                engine,
                output_dir,
                limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            }),
        }
    }

    /// Launch a run for `spec` and return immediately.
    ///
    /// The corresponding record must already exist in the store.
    pub fn spawn(&self, spec: JobSpec) -> JobHandle {
        let id = spec.id.clone();
        let cancel = CancelFlag::new();
        let inner = Arc::clone(&self.inner);
        let flag = cancel.clone();

        let task = tokio::spawn(async move {
            inner.run(spec, flag).await;
        });

        JobHandle { id, cancel, task }
    }
}

impl RunnerInner {
    async fn run(&self, spec: JobSpec, cancel: CancelFlag) {
        // Admission: stay queued until a slot frees.
        let _permit = match Arc::clone(&self.limiter).acquire_owned().await {
            Ok(permit) => permit,
            // Closed semaphore means the process is shutting down.
            Err(_) => return,
        };

        let id = spec.id.clone();
        // Nothing may escape the run silently: errors and panics alike end
        // as a terminal error state on the record.
        let outcome = AssertUnwindSafe(self.execute(&spec, &cancel))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => info!("job {}: conversion successful", id),
            Ok(Err(err)) => {
                warn!("job {}: {}", id, err);
                self.fail_job(&id, format!("Conversion failed: {err}"));
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                warn!("job {}: run panicked: {}", id, detail);
                self.fail_job(&id, format!("Conversion failed: {detail}"));
            }
        }
    }

    fn fail_job(&self, id: &JobId, message: String) {
        self.store.update(id, |rec| {
            rec.status = JobStatus::Error;
            rec.error = Some(message);
            rec.progress = 0;
            // Partial stats and health gathered before the failure stay on
            // the record.
            rec.health.finalize_warnings();
        });
    }

    async fn execute(&self, spec: &JobSpec, cancel: &CancelFlag) -> Result<(), ConvertError> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        // ── queued → analyzing ───────────────────────────────────────────
        self.store.update(&spec.id, |rec| {
            rec.status = JobStatus::Analyzing;
            rec.progress = 5;
        });

        match self
            .analyzer
            .analyze(&spec.input_path, spec.password.as_deref())
            .await
        {
            Ok(report) if report.encrypted => {
                let err = AnalyzeError::Encrypted {
                    path: spec.input_path.clone(),
                };
                self.store.update(&spec.id, |rec| {
                    rec.health.encryption = "Encrypted (Not Supported)".to_string();
                    rec.health.warnings.push(format!("Analysis Error: {err}"));
                });
                return Err(ConvertError::EncryptedInput {
                    path: spec.input_path.clone(),
                });
            }
            Ok(report) => {
                self.store.update(&spec.id, |rec| {
                    rec.stats.page_count = Some(report.page_count);
                    if !report.first_page_has_fonts {
                        rec.health.font_issues =
                            "No fonts detected on first page (potential issue).".to_string();
                    }
                    rec.estimated_time = Some(10.0 + 0.5 * report.page_count as f64);
                });
            }
            Err(err @ AnalyzeError::Encrypted { .. }) => {
                self.store.update(&spec.id, |rec| {
                    rec.health.encryption = "Encrypted (Not Supported)".to_string();
                    rec.health.warnings.push(format!("Analysis Error: {err}"));
                });
                return Err(ConvertError::EncryptedInput {
                    path: spec.input_path.clone(),
                });
            }
            Err(err) => {
                // Analysis is diagnostic-only: anything short of encryption
                // is a warning and the run proceeds.
                warn!("job {}: analysis failed, continuing: {}", spec.id, err);
                self.store.update(&spec.id, |rec| {
                    rec.health.warnings.push(format!("Analysis Error: {err}"));
                });
            }
        }

        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        // ── analyzing → processing ───────────────────────────────────────
        let optimizer_warning = optimizer_warning(&spec.optimizer_setting);
        self.store.update(&spec.id, |rec| {
            rec.status = JobStatus::Processing;
            rec.progress = 10;
            if let Some(w) = optimizer_warning {
                rec.health.warnings.push(w);
            }
        });

        let output = engine::output_path(&self.output_dir, &output_stem(spec));
        self.engine
            .convert(&ConversionRequest {
                input: spec.input_path.clone(),
                output: output.clone(),
                password: spec.password.clone(),
            })
            .await
            .map_err(|source| ConvertError::Engine {
                path: spec.input_path.clone(),
                source,
            })?;

        // ── processing → complete ────────────────────────────────────────
        self.store.update(&spec.id, |rec| {
            rec.progress = 95;
        });

        self.store.update(&spec.id, |rec| {
            let mut outputs = HashMap::new();
            outputs.insert("docx".to_string(), output.clone());
            rec.outputs = Some(outputs);
            rec.status = JobStatus::Complete;
            rec.progress = 100;
            rec.estimated_time = Some(0.0);

            let elapsed = rec.started_at.elapsed().as_secs_f64();
            rec.stats.processing_time_seconds = Some((elapsed * 100.0).round() / 100.0);
            rec.health.finalize_warnings();
        });

        Ok(())
    }
}

/// Best-effort extraction of a panic payload message.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "internal error".to_string()
    }
}

/// Warning appended for optimizer settings the engine cannot honour.
fn optimizer_warning(setting: &str) -> Option<String> {
    match setting {
        "balanced" => None,
        "compact" => Some("Compact optimization setting ignored.".to_string()),
        "quality" => Some("Quality optimization setting ignored.".to_string()),
        other => Some(format!("Optimization setting '{other}' ignored.")),
    }
}

/// Base name for the produced file: `{job_id}_{display name}`.
///
/// Uploads are stored as `{job_id}_{original name}`, so the job-id prefix
/// is stripped before re-prefixing to avoid doubling it.
fn output_stem(spec: &JobSpec) -> String {
    let base = match &spec.original_filename {
        Some(name) if !name.is_empty() => name.clone(),
        _ => {
            let stem = spec
                .input_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document");
            let prefix = format!("{}_", spec.id);
            stem.strip_prefix(prefix.as_str()).unwrap_or(stem).to_string()
        }
    };
    format!("{}_{}", spec.id, base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{AnalysisReport, DocumentAnalyzer};
    use crate::engine::ConversionEngine;
    use crate::error::EngineError;
    use crate::job::record::JobRecord;
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::sync::Semaphore as GateSemaphore;

    // ── Stub collaborators ───────────────────────────────────────────────

    struct StubAnalyzer {
        result: fn(&Path) -> Result<AnalysisReport, AnalyzeError>,
    }

    #[async_trait]
    impl DocumentAnalyzer for StubAnalyzer {
        async fn analyze(
            &self,
            path: &Path,
            _password: Option<&str>,
        ) -> Result<AnalysisReport, AnalyzeError> {
            (self.result)(path)
        }
    }

    fn three_pages(_: &Path) -> Result<AnalysisReport, AnalyzeError> {
        Ok(AnalysisReport {
            page_count: 3,
            first_page_has_fonts: true,
            encrypted: false,
        })
    }

    /// Engine that writes a placeholder file, optionally waiting on a gate
    /// first so tests can hold jobs inside the processing stage.
    struct StubEngine {
        gate: Option<Arc<GateSemaphore>>,
        fail: bool,
    }

    #[async_trait]
    impl ConversionEngine for StubEngine {
        async fn convert(&self, request: &ConversionRequest) -> Result<(), EngineError> {
            if let Some(gate) = &self.gate {
                let permit = gate.acquire().await.expect("gate open");
                permit.forget();
            }
            if self.fail {
                return Err(EngineError::Failed {
                    code: Some(1),
                    stderr: "converter blew up".to_string(),
                });
            }
            std::fs::write(&request.output, b"docx bytes").map_err(|e| EngineError::Spawn {
                command: "stub".to_string(),
                source: e,
            })?;
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<JobStore>,
        runner: Arc<JobRunner>,
        _dir: tempfile::TempDir,
        input: PathBuf,
    }

    fn fixture(
        analyze: fn(&Path) -> Result<AnalysisReport, AnalyzeError>,
        engine: StubEngine,
        max_concurrent: usize,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, b"%PDF-1.4 fake").unwrap();

        let store = Arc::new(JobStore::new());
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&store),
            Arc::new(StubAnalyzer { result: analyze }),
            Arc::new(engine),
            dir.path().to_path_buf(),
            max_concurrent,
        ));

        Fixture {
            store,
            runner,
            _dir: dir,
            input,
        }
    }

    fn submit(fixture: &Fixture, optimizer: &str) -> (JobSpec, JobId) {
        let id = JobId::new();
        let spec = JobSpec {
            id: id.clone(),
            input_path: fixture.input.clone(),
            original_filename: None,
            optimizer_setting: optimizer.to_string(),
            password: None,
        };
        fixture.store.create(JobRecord::new(
            id.clone(),
            fixture.input.clone(),
            None,
        ));
        (spec, id)
    }

    // ── Tests ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn successful_run_reaches_complete() {
        let fx = fixture(three_pages, StubEngine { gate: None, fail: false }, 2);
        let (spec, id) = submit(&fx, "balanced");

        fx.runner.spawn(spec).wait().await;

        let rec = fx.store.get(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Complete);
        assert_eq!(rec.progress, 100);
        assert_eq!(rec.estimated_time, Some(0.0));
        assert_eq!(rec.stats.page_count, Some(3));
        assert!(rec.stats.processing_time_seconds.is_some());
        assert_eq!(rec.health.warnings, vec!["None".to_string()]);

        let outputs = rec.outputs.expect("outputs populated on complete");
        assert!(outputs["docx"].exists());
        assert!(rec.error.is_none());
    }

    #[tokio::test]
    async fn encrypted_input_is_fatal() {
        fn encrypted(path: &Path) -> Result<AnalysisReport, AnalyzeError> {
            Err(AnalyzeError::Encrypted {
                path: path.to_path_buf(),
            })
        }
        let fx = fixture(encrypted, StubEngine { gate: None, fail: false }, 2);
        let (spec, id) = submit(&fx, "balanced");

        fx.runner.spawn(spec).wait().await;

        let rec = fx.store.get(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Error);
        assert_eq!(rec.progress, 0);
        assert!(rec.outputs.is_none());
        let msg = rec.error.expect("error message populated");
        assert!(msg.contains("Password-protected"), "got: {msg}");
        assert_eq!(rec.health.encryption, "Encrypted (Not Supported)");
        assert!(!rec.health.warnings.is_empty());
    }

    #[tokio::test]
    async fn encrypted_flag_in_report_is_also_fatal() {
        fn flagged(_: &Path) -> Result<AnalysisReport, AnalyzeError> {
            Ok(AnalysisReport {
                page_count: 1,
                first_page_has_fonts: true,
                encrypted: true,
            })
        }
        let fx = fixture(flagged, StubEngine { gate: None, fail: false }, 2);
        let (spec, id) = submit(&fx, "quality");

        fx.runner.spawn(spec).wait().await;

        let rec = fx.store.get(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Error);
        assert!(rec.error.unwrap().contains("Password-protected"));
    }

    #[tokio::test]
    async fn analysis_failure_is_downgraded_to_warning() {
        fn unreadable(path: &Path) -> Result<AnalysisReport, AnalyzeError> {
            Err(AnalyzeError::Unreadable {
                path: path.to_path_buf(),
                detail: "bad xref table".to_string(),
            })
        }
        let fx = fixture(unreadable, StubEngine { gate: None, fail: false }, 2);
        let (spec, id) = submit(&fx, "balanced");

        fx.runner.spawn(spec).wait().await;

        let rec = fx.store.get(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Complete);
        assert!(rec
            .health
            .warnings
            .iter()
            .any(|w| w.starts_with("Analysis Error:")));
        // Diagnostic-only analysis never populated the stats.
        assert!(rec.stats.page_count.is_none());
    }

    #[tokio::test]
    async fn non_balanced_optimizer_only_adds_warning() {
        let fx = fixture(three_pages, StubEngine { gate: None, fail: false }, 2);
        let (spec, id) = submit(&fx, "compact");

        fx.runner.spawn(spec).wait().await;

        let rec = fx.store.get(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Complete);
        assert!(rec
            .health
            .warnings
            .contains(&"Compact optimization setting ignored.".to_string()));
    }

    #[tokio::test]
    async fn engine_failure_retains_partial_diagnostics() {
        let fx = fixture(three_pages, StubEngine { gate: None, fail: true }, 2);
        let (spec, id) = submit(&fx, "balanced");

        fx.runner.spawn(spec).wait().await;

        let rec = fx.store.get(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Error);
        assert_eq!(rec.progress, 0);
        assert!(rec.outputs.is_none());
        assert!(rec.error.unwrap().starts_with("Conversion failed:"));
        // Stats gathered before the failure survive.
        assert_eq!(rec.stats.page_count, Some(3));
        assert!(!rec.health.warnings.is_empty());
    }

    #[tokio::test]
    async fn panicking_collaborator_still_terminates_the_job() {
        fn boom(_: &Path) -> Result<AnalysisReport, AnalyzeError> {
            panic!("analyzer exploded")
        }
        let fx = fixture(boom, StubEngine { gate: None, fail: false }, 2);
        let (spec, id) = submit(&fx, "balanced");

        fx.runner.spawn(spec).wait().await;

        let rec = fx.store.get(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Error);
        assert!(rec.error.unwrap().contains("analyzer exploded"));
        assert!(!rec.health.warnings.is_empty());
    }

    #[tokio::test]
    async fn admission_is_bounded_by_max_concurrent() {
        let gate = Arc::new(GateSemaphore::new(0));
        let fx = fixture(
            three_pages,
            StubEngine {
                gate: Some(Arc::clone(&gate)),
                fail: false,
            },
            1,
        );

        let (spec_a, id_a) = submit(&fx, "balanced");
        let (spec_b, id_b) = submit(&fx, "balanced");

        let handle_a = fx.runner.spawn(spec_a);
        let handle_b = fx.runner.spawn(spec_b);

        // Wait for one job to reach the engine (holding the only permit).
        let mut spins = 0;
        while fx.store.get(&id_a).unwrap().status != JobStatus::Processing
            && fx.store.get(&id_b).unwrap().status != JobStatus::Processing
        {
            spins += 1;
            assert!(spins < 500, "no job reached processing");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        // The other submission is still waiting for admission.
        let (first, second) =
            if fx.store.get(&id_a).unwrap().status == JobStatus::Processing {
                (id_a.clone(), id_b.clone())
            } else {
                (id_b.clone(), id_a.clone())
            };
        let queued = fx.store.get(&second).unwrap();
        assert_eq!(queued.status, JobStatus::Queued);
        assert_eq!(queued.progress, 0);

        // Release both engine invocations and drain.
        gate.add_permits(2);
        handle_a.wait().await;
        handle_b.wait().await;

        assert_eq!(fx.store.get(&first).unwrap().status, JobStatus::Complete);
        assert_eq!(fx.store.get(&second).unwrap().status, JobStatus::Complete);
    }

    #[tokio::test]
    async fn cancelled_while_queued_terminates_with_error() {
        let gate = Arc::new(GateSemaphore::new(0));
        let fx = fixture(
            three_pages,
            StubEngine {
                gate: Some(Arc::clone(&gate)),
                fail: false,
            },
            1,
        );

        let (spec_a, id_a) = submit(&fx, "balanced");
        let (spec_b, id_b) = submit(&fx, "balanced");

        let handle_a = fx.runner.spawn(spec_a);
        // Make sure job A holds the permit before job B is spawned.
        let mut spins = 0;
        while fx.store.get(&id_a).unwrap().status != JobStatus::Processing {
            spins += 1;
            assert!(spins < 500, "job A never reached processing");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let handle_b = fx.runner.spawn(spec_b);
        handle_b.cancel();

        gate.add_permits(2);
        handle_a.wait().await;
        handle_b.wait().await;

        let rec = fx.store.get(&id_b).unwrap();
        assert_eq!(rec.status, JobStatus::Error);
        assert!(rec.error.unwrap().contains("cancelled"));
    }

    #[test]
    fn output_stem_strips_duplicate_job_prefix() {
        let id = JobId::from("abc-123");
        let spec = JobSpec {
            id: id.clone(),
            input_path: PathBuf::from("/uploads/abc-123_report.pdf"),
            original_filename: None,
            optimizer_setting: "balanced".to_string(),
            password: None,
        };
        assert_eq!(output_stem(&spec), "abc-123_report");

        let named = JobSpec {
            original_filename: Some("Quarterly Report".to_string()),
            ..spec
        };
        assert_eq!(output_stem(&named), "abc-123_Quarterly Report");
    }
}
