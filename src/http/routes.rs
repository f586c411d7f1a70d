//! HTTP route registration.
//!
//! Keeps the server entrypoint lightweight: the binary only wires
//! middleware and calls [`configure_routes`].

use crate::http::handlers;
use actix_web::web;

/// Register all service routes:
/// - `GET  /` — liveness
/// - `POST /api/convert` — submit a PDF for conversion
/// - `GET  /api/progress/{job_id}` — poll job status
/// - `GET  /api/results/{job_id}` — fetch results of a finished job
/// - `GET  /api/download/{filename}` — retrieve a produced file
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::index)
        .service(handlers::submit_conversion)
        .service(handlers::job_progress)
        .service(handlers::job_results)
        .service(handlers::download_output);
}
