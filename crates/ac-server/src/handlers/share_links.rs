//! `POST /share-links/{token}/sessions` (spec §6): start an anonymous
//! session without a Clerk identity.
//!
//! The template itself is what's shared — there is no separate share-link
//! record distinct from the template (spec.md leaves the token/template
//! relationship unspecified; see DESIGN.md). `{token}` is the template's
//! own id: a `Visibility::Link` template's id *is* its share link, the same
//! way an unlisted document is "shared" by sharing a URL containing its id
//! rather than a second secret. The per-session credential that actually
//! gates subsequent access (spec §4.E "the cleartext token is ... thereafter
//! accepted as the session's bearer credential") is the freshly issued
//! `ac_session::anonymous` token, returned once in this response.
use crate::error::error_response;
use crate::handlers::sessions::SessionView;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::Responder;
use actix_web::web;
use ac_blueprint::TemplateRepository;
use ac_blueprint::TestTemplate;
use ac_blueprint::Visibility;
use ac_core::AssessmentError;
use ac_core::Config;
use ac_core::ID;
use ac_core::Unique;
use ac_session::RateLimitRecord;
use ac_session::RateLimitRepository;
use ac_session::SessionEngine;
use ac_session::SessionOwner;
use ac_session::TestSession;
use ac_session::hash_token;
use ac_session::issue_token;
use chrono::Duration as ChronoDuration;
use serde::Serialize;
use std::sync::Arc;
use tokio_postgres::Client;
use uuid::Uuid;

/// Rereads, reapplies the attempt, and retries on a CAS `Conflict` (spec §5:
/// "a single row per IP with an optimistic update") so two concurrent
/// requests from the same IP can't both observe `count=k` and both persist
/// `k+1` — matching `ac_core::retry`'s bounded-backoff convention, but
/// written out here rather than routed through `with_default_backoff`
/// because only a version-mismatch `Conflict` is worth retrying; a
/// `RateLimited` business outcome from `record_attempt` must still be
/// persisted and returned, not retried.
async fn rate_limit(db: &Arc<Client>, ip: &str, config: &Config, now: chrono::DateTime<chrono::Utc>) -> Result<(), AssessmentError> {
    const MAX_ATTEMPTS: u32 = 5;
    let mut delay = std::time::Duration::from_millis(20);
    for attempt in 0..MAX_ATTEMPTS {
        let mut record = RateLimitRepository::get(db, ip)
            .await?
            .unwrap_or_else(|| RateLimitRecord::fresh(ip, now));
        let result = record.record_attempt(now, config.anon_rate_limit_per_hour, ChronoDuration::seconds(config.anon_rate_limit_block_secs as i64));
        match RateLimitRepository::upsert(db, &record).await {
            Ok(()) => return result,
            Err(AssessmentError::Conflict { .. }) if attempt + 1 < MAX_ATTEMPTS => {
                log::warn!("rate limit record for {ip} updated concurrently, retrying (attempt {}/{MAX_ATTEMPTS})", attempt + 1);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
    Err(AssessmentError::conflict(format!("rate limit record for {ip} stayed contended after {MAX_ATTEMPTS} attempts")))
}

#[derive(Serialize)]
pub struct StartAnonymousSessionResponse {
    pub session: SessionView,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

pub async fn start(req: HttpRequest, db: web::Data<Arc<Client>>, config: web::Data<Config>, path: web::Path<Uuid>) -> impl Responder {
    let template_id: ID<TestTemplate> = ID::from(path.into_inner());

    let client_ip = req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string();
    let now = chrono::Utc::now();
    if let Err(err) = rate_limit(db.get_ref(), &client_ip, &config, now).await {
        return error_response(&err, req.path());
    }

    let template = match TemplateRepository::get_latest(db.get_ref(), template_id).await {
        Ok(Some(t)) => t,
        Ok(None) => return error_response(&AssessmentError::not_found("TestTemplate", template_id.inner()), req.path()),
        Err(err) => return error_response(&err, req.path()),
    };
    if template.visibility() != Visibility::Link {
        return error_response(&AssessmentError::permission_denied("this template is not shared by link"), req.path());
    }

    // Job-fit/team-fit blueprints need a passport-bearing identity to
    // resolve against (spec §4.C); only overview-goal templates make sense
    // for an anonymous taker.
    let passport = None;
    let context = ac_blueprint::ResolutionContext {
        user_clerk_id: String::new(),
        team_profile: None,
        onet_profile: None,
        passport,
        now,
    };
    let plan = match ac_blueprint::BlueprintResolver::resolve(&template, &context) {
        Ok(plan) => plan,
        Err(err) => return error_response(&err, req.path()),
    };

    let session_seed = {
        use rand::RngCore;
        rand::rng().next_u64()
    };
    let engine = ac_assembly::AssemblyEngine::new(db.get_ref());
    let assembled = match engine
        .assemble(ac_assembly::AssemblyRequest {
            plan,
            template_context: crate::handlers::sessions::context_scope_for(&template),
            questions_per_indicator: template.questions_per_indicator(),
            inventory_floor: config.selector_inventory_floor,
            session_seed,
            shuffle_questions: template.shuffle_questions(),
        })
        .await
    {
        Ok(a) => a,
        Err(err) => return error_response(&err, req.path()),
    };

    let user_agent = req.headers().get("User-Agent").and_then(|h| h.to_str().ok()).map(|s| s.to_string());
    let issued = issue_token();

    let session = TestSession::start(
        ID::default(),
        template.id(),
        template.version(),
        SessionOwner::Anonymous,
        assembled.question_order,
        session_seed,
        template.time_limit_seconds(),
        Some(client_ip),
        user_agent,
        now,
    )
    .with_share_link(template.id().inner().to_string())
    .with_access_token_hash(hash_token(&issued.cleartext));

    let session_engine = SessionEngine::new(db.get_ref(), db.get_ref());
    match session_engine.start(session).await {
        Ok(session) => HttpResponse::Created().json(StartAnonymousSessionResponse {
            session: SessionView::of(&session),
            access_token: issued.cleartext,
        }),
        Err(err) => error_response(&err, req.path()),
    }
}
