//! `GET /tests/results/{id}` (spec §6).
//!
//! `ResultRepository` exposes only `get_by_session` (spec §4.F invariant 1:
//! "at most one result per session", keyed by `session_id`) — there is no
//! `get_by_id` lookup, and adding one would mean indexing results twice for
//! a lookup this system never needs outside the one-to-one session
//! relationship. Resolved (see DESIGN.md): `{id}` in this route is the
//! *session* id, exactly as it is in every other `/tests/sessions/{id}/...`
//! route; a client that already has the session id (it has to, to have
//! completed it) never needs a separate result id.
use crate::auth::Authenticated;
use crate::auth::authorize_session;
use crate::error::error_response;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::Responder;
use actix_web::web;
use ac_core::AssessmentError;
use ac_core::ID;
use ac_scoring::ResultRepository;
use ac_session::SessionRepository;
use std::sync::Arc;
use tokio_postgres::Client;
use uuid::Uuid;

pub async fn get_by_session(req: HttpRequest, db: web::Data<Arc<Client>>, auth: Authenticated, path: web::Path<Uuid>) -> impl Responder {
    let Authenticated(principal) = auth;
    let session_id = path.into_inner();

    let session = match SessionRepository::get(db.get_ref(), ID::from(session_id)).await {
        Ok(Some(session)) => session,
        Ok(None) => return error_response(&AssessmentError::not_found("TestSession", session_id), req.path()),
        Err(err) => return error_response(&err, req.path()),
    };
    if let Err(err) = authorize_session(&session, &principal) {
        return error_response(&err, req.path());
    }

    match ResultRepository::get_by_session(db.get_ref(), ID::from(session_id)).await {
        Ok(Some(result)) => HttpResponse::Ok().json(result),
        Ok(None) => error_response(&AssessmentError::not_found("TestResult", session_id), req.path()),
        Err(err) => error_response(&err, req.path()),
    }
}
