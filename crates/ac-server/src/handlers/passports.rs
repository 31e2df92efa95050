//! `GET /passports/user/{clerkUserId}` (spec §6).
//!
//! A passport carries every competency score the identity has ever earned
//! across goals (spec §4.I), so it is strictly more sensitive than any one
//! session result; only the owning member can read it. There is no
//! "anonymous passport" — an `Principal::Anonymous` session never has one to
//! merge into (spec §4.I only merges on `TestSession` completion for a
//! `Member` owner), so an anonymous bearer token is rejected outright rather
//! than checked against the path id.
use crate::auth::Authenticated;
use crate::auth::Principal;
use crate::error::error_response;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::Responder;
use actix_web::web;
use ac_core::AssessmentError;
use ac_passport::PassportRepository;
use ac_passport::effective;
use std::sync::Arc;
use tokio_postgres::Client;

pub async fn get_by_user(req: HttpRequest, db: web::Data<Arc<Client>>, auth: Authenticated, path: web::Path<String>) -> impl Responder {
    let Authenticated(principal) = auth;
    let clerk_user_id = path.into_inner();

    match &principal {
        Principal::Member(id) if *id == clerk_user_id => {}
        _ => return error_response(&AssessmentError::permission_denied("a passport can only be read by the member it belongs to"), req.path()),
    }

    let now = chrono::Utc::now();
    match PassportRepository::get_passport(db.get_ref(), &clerk_user_id).await {
        Ok(Some(passport)) => match effective(&passport, now) {
            Some(passport) => HttpResponse::Ok().json(passport),
            None => error_response(&AssessmentError::not_found("CompetencyPassport", clerk_user_id), req.path()),
        },
        Ok(None) => error_response(&AssessmentError::not_found("CompetencyPassport", clerk_user_id), req.path()),
        Err(err) => error_response(&err, req.path()),
    }
}
