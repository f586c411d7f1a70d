//! Request handlers for the conversion API.
//!
//! ## Submission flow
//! 1. Parse the multipart form (`pdf_file` plus optional text fields)
//! 2. Validate the filename and extension before anything touches disk
//! 3. Persist the upload under `{job_id}_{name}` to avoid collisions
//! 4. Create the job record, launch the runner, return 202 immediately
//!
//! Polling, results, and download handlers only read the job store; the
//! runner task is the record's single writer.

use crate::http::AppState;
use crate::job::{JobId, JobRecord, JobSpec, JobStatus};
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{get, post, web, HttpResponse, Responder};
use futures::TryStreamExt;
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

/// The only accepted upload extension.
const ALLOWED_EXTENSION: &str = "pdf";

/// GET / - liveness probe
#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "PDF to Word Converter API is running!"
    }))
}

/// Collected multipart form fields for a submission.
#[derive(Default)]
struct SubmissionForm {
    /// `(client filename, bytes)` of the `pdf_file` part.
    file: Option<(String, Vec<u8>)>,
    optimizer_setting: Option<String>,
    password: Option<String>,
    original_filename: Option<String>,
}

/// POST /api/convert - accept a PDF and start a conversion job
#[post("/api/convert")]
pub async fn submit_conversion(
    payload: Multipart,
    state: web::Data<AppState>,
) -> impl Responder {
    let form = match collect_form(payload, state.config.limits.max_upload_bytes).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let Some((client_filename, data)) = form.file else {
        return HttpResponse::BadRequest().json(json!({
            "message": "No 'pdf_file' part in the request"
        }));
    };

    if client_filename.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "message": "No selected file"
        }));
    }

    if !allowed_file(&client_filename) {
        return HttpResponse::BadRequest().json(json!({
            "message": "Invalid file type. Only PDF files are allowed."
        }));
    }

    let job_id = JobId::new();

    // Strip any directory components the client may have sent; only the
    // final name component lands on disk, prefixed with the job id.
    let safe_name = Path::new(&client_filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.pdf".to_string());
    let stored_name = format!("{job_id}_{safe_name}");
    let input_path = state.config.storage.upload_dir.join(&stored_name);

    if let Err(e) = tokio::fs::write(&input_path, &data).await {
        warn!("failed to persist upload for job {}: {}", job_id, e);
        return HttpResponse::InternalServerError().json(json!({
            "message": format!("Failed to save file or start conversion: {e}")
        }));
    }

    state.store.create(JobRecord::new(
        job_id.clone(),
        input_path.clone(),
        form.original_filename.clone(),
    ));

    // The handle is dropped: the run is detached and tracked only through
    // the store, like every other poll-visible job.
    state.runner.spawn(JobSpec {
        id: job_id.clone(),
        input_path,
        original_filename: form.original_filename,
        optimizer_setting: form
            .optimizer_setting
            .unwrap_or_else(|| "balanced".to_string()),
        password: form.password,
    });

    info!("job {}: accepted upload '{}'", job_id, safe_name);

    HttpResponse::Accepted().json(json!({
        "message": "File uploaded successfully, conversion process initiated.",
        "job_id": job_id
    }))
}

/// GET /api/progress/{job_id} - poll job status
#[get("/api/progress/{job_id}")]
pub async fn job_progress(path: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let id = JobId::from(path.into_inner().as_str());

    let Some(job) = state.store.get(&id) else {
        return HttpResponse::NotFound().json(json!({ "message": "Job ID not found" }));
    };

    let mut body = json!({
        "job_id": id,
        "status": job.status,
        "progress": job.progress,
        "estimated_time": job.estimated_time,
    });

    let message = match job.status {
        JobStatus::Error => Some(
            job.error
                .unwrap_or_else(|| "An unknown error occurred.".to_string()),
        ),
        JobStatus::Queued => Some("Conversion is queued and will start shortly.".to_string()),
        JobStatus::Analyzing => Some("Analyzing PDF structure...".to_string()),
        JobStatus::Processing => Some("Converting PDF to DOCX...".to_string()),
        JobStatus::Complete => None,
    };
    if let Some(message) = message {
        body["message"] = json!(message);
    }

    HttpResponse::Ok().json(body)
}

/// GET /api/results/{job_id} - fetch results of a finished job
#[get("/api/results/{job_id}")]
pub async fn job_results(path: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let id = JobId::from(path.into_inner().as_str());

    let Some(job) = state.store.get(&id) else {
        return HttpResponse::NotFound().json(json!({ "message": "Job ID not found" }));
    };

    if job.status == JobStatus::Error {
        return HttpResponse::BadRequest().json(json!({
            "job_id": id,
            "status": job.status,
            "message": job.error.unwrap_or_else(|| "Conversion failed.".to_string()),
            "statistics": job.stats,
            "health_report": job.health,
        }));
    }

    if job.status != JobStatus::Complete {
        return HttpResponse::Accepted().json(json!({
            "message": format!("Job is not yet complete. Current status: {}", job.status)
        }));
    }

    let mut download_urls = serde_json::Map::new();
    if let Some(outputs) = &job.outputs {
        if let Some(path) = outputs.get("docx") {
            if let Some(filename) = path.file_name().map(|n| n.to_string_lossy()) {
                download_urls.insert("docx".to_string(), json!(format!("/api/download/{filename}")));
            }
        }
    }

    HttpResponse::Ok().json(json!({
        "job_id": id,
        "status": job.status,
        "download_urls": download_urls,
        "statistics": job.stats,
        "health_report": job.health,
    }))
}

/// GET /api/download/{filename} - retrieve a produced file
#[get("/api/download/{filename}")]
pub async fn download_output(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> impl Responder {
    let filename = path.into_inner();

    // Traversal rejection happens before any filesystem access.
    if filename.contains("..")
        || filename.starts_with('/')
        || filename.contains('/')
        || filename.contains('\\')
    {
        return HttpResponse::BadRequest().json(json!({ "message": "Invalid filename" }));
    }

    let full_path = state.config.storage.output_dir.join(&filename);
    let data = match tokio::fs::read(&full_path).await {
        Ok(data) => data,
        Err(_) => {
            return HttpResponse::NotFound().json(json!({ "message": "File not found" }));
        }
    };

    // Produced files are named `{job_id}_{base}.docx`; when the record
    // carries a client display name, offer the download under that instead.
    let download_name = filename
        .split_once('_')
        .and_then(|(prefix, _)| state.store.get(&JobId::from(prefix)))
        .and_then(|job| job.original_filename)
        .map(|original| format!("{original}.docx"))
        .unwrap_or_else(|| filename.clone());

    HttpResponse::Ok()
        .content_type(guess_content_type(&filename))
        .append_header((
            "Content-Disposition",
            format!("attachment; filename=\"{download_name}\""),
        ))
        .body(data)
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Accept only filenames with the allowed extension.
fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case(ALLOWED_EXTENSION))
        .unwrap_or(false)
}

fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}

/// Drain the multipart stream into a [`SubmissionForm`].
///
/// Returns the ready-built error response on malformed payloads or when
/// the file part exceeds `max_upload_bytes`.
async fn collect_form(
    mut payload: Multipart,
    max_upload_bytes: usize,
) -> Result<SubmissionForm, HttpResponse> {
    let mut form = SubmissionForm::default();

    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(HttpResponse::BadRequest().json(json!({
                    "message": format!("Malformed multipart request: {e}")
                })));
            }
        };

        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();

        match name.as_str() {
            "pdf_file" => {
                let filename = field
                    .content_disposition()
                    .get_filename()
                    .map(|s| s.to_string())
                    .unwrap_or_default();

                let mut data = Vec::new();
                loop {
                    match field.try_next().await {
                        Ok(Some(chunk)) => {
                            data.extend_from_slice(&chunk);
                            if data.len() > max_upload_bytes {
                                return Err(HttpResponse::BadRequest().json(json!({
                                    "message": "Uploaded file exceeds the size limit."
                                })));
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            return Err(HttpResponse::BadRequest().json(json!({
                                "message": format!("Failed to read upload: {e}")
                            })));
                        }
                    }
                }
                form.file = Some((filename, data));
            }
            "optimizer_setting" => {
                form.optimizer_setting =
                    read_text(&mut field).await.ok().filter(|s| !s.is_empty())
            }
            "password" => form.password = read_text(&mut field).await.ok().filter(|s| !s.is_empty()),
            "original_filename" => {
                form.original_filename =
                    read_text(&mut field).await.ok().filter(|s| !s.is_empty())
            }
            // Unknown parts are drained and ignored.
            _ => while let Ok(Some(_)) = field.try_next().await {},
        }
    }

    Ok(form)
}

/// Read a text field into a trimmed string.
async fn read_text(field: &mut Field) -> Result<String, MultipartError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        data.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&data).trim().to_string())
}
