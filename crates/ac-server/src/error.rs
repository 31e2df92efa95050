//! Maps `ac_core::AssessmentError` onto the HTTP error body shape (spec §6:
//! `{status, message, details, path, timestamp, correlationId, context}`).
//!
//! The teacher's handlers build `HttpResponse` directly per branch
//! (`rbp_auth::handlers`) rather than going through a shared `ResponseError`
//! impl, since every error there was a bespoke string. Here every failure
//! already carries a `status_hint()` and (for `Internal`) a correlation id,
//! so one conversion function replaces the teacher's per-branch
//! `HttpResponse::BadRequest().body(...)` calls without losing that idiom
//! at the call site: handlers still match on `Result` and return early,
//! they just hand the `Err` arm to this function instead of writing out
//! the status/body themselves.
use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use ac_core::AssessmentError;
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    message: String,
    details: serde_json::Value,
    path: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "correlationId")]
    correlation_id: String,
    context: serde_json::Value,
}

/// Renders an `AssessmentError` as the response for `path`. `details` and
/// `context` are currently always `null` — the taxonomy's variants carry
/// their extra information in `message` rather than structured fields, so
/// there is nothing further to put there yet.
pub fn error_response(err: &AssessmentError, path: &str) -> HttpResponse {
    let status = StatusCode::from_u16(err.status_hint()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let correlation_id = err.correlation_id().map(str::to_string).unwrap_or_else(ac_core::correlation_id);
    let body = ErrorBody {
        status: status.as_u16(),
        message: err.to_string(),
        details: serde_json::Value::Null,
        path: path.to_string(),
        timestamp: chrono::Utc::now(),
        correlation_id,
        context: serde_json::Value::Null,
    };
    HttpResponse::build(status).json(body)
}
