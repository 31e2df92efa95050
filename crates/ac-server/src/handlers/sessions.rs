//! `/tests/sessions/*` (spec §6): start, read the current item, submit or
//! replace an answer, and complete.
//!
//! Follows the teacher's `rbp-auth::handlers` idiom — free functions taking
//! `web::Data`/extractors, matching on each fallible step and returning the
//! mapped error immediately rather than propagating with `?` into the
//! framework (actix handlers can't use `?` against a non-`ResponseError`
//! error type without losing the correlation id `error::error_response`
//! attaches).
use crate::auth::Authenticated;
use crate::auth::Principal;
use crate::auth::authorize_session;
use crate::error::error_response;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::Responder;
use actix_web::web;
use ac_blueprint::BlueprintResolver;
use ac_blueprint::ResolutionContext;
use ac_blueprint::TemplateRepository;
use ac_blueprint::TestTemplate;
use ac_core::AssessmentError;
use ac_core::Config;
use ac_core::ID;
use ac_core::Unique;
use ac_items::ContextScope;
use ac_scoring::OnetProfileProvider;
use ac_scoring::ScoringOrchestrator;
use ac_scoring::TeamProfileProvider;
use ac_passport::PassportRepository;
use ac_passport::effective as effective_passport;
use ac_activity::AuditSink;
use ac_activity::ActivitySink;
use ac_assembly::AssemblyEngine;
use ac_assembly::AssemblyRequest;
use ac_session::AnswerPayload;
use ac_session::AnswerRepository;
use ac_session::CurrentQuestion;
use ac_session::SessionEngine;
use ac_session::SessionOwner;
use ac_session::SessionPolicy;
use ac_session::SessionRepository;
use ac_session::TestSession;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use tokio_postgres::Client;
use uuid::Uuid;

/// Blueprint goals don't carry an indicator-context scope of their own
/// (spec §3 leaves item-context targeting to the indicator/template-author
/// relationship, not the goal); this maps each goal onto the scope its
/// wording is written for, so `job-fit`/`team-fit` templates preferentially
/// draw on the indicators authored for that audience before falling back
/// to `Universal` (`ac-selector`'s context-match rule).
pub(crate) fn context_scope_for(template: &TestTemplate) -> ContextScope {
    match template.blueprint() {
        ac_blueprint::Blueprint::Overview { .. } => ContextScope::Universal,
        ac_blueprint::Blueprint::JobFit { .. } => ContextScope::Professional,
        ac_blueprint::Blueprint::TeamFit { .. } => ContextScope::Managerial,
    }
}

#[derive(Deserialize)]
pub struct StartSessionRequest {
    pub template_id: Uuid,
}

#[derive(Serialize)]
pub struct StartSessionResponse {
    pub session: SessionView,
}

#[derive(Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub status: String,
    pub version: u32,
    #[serde(rename = "currentQuestionIndex")]
    pub current_question_index: u32,
    #[serde(rename = "questionCount")]
    pub question_count: u32,
}

impl SessionView {
    pub(crate) fn of(session: &TestSession) -> Self {
        Self {
            id: session.id().inner(),
            status: session.status().as_str().to_string(),
            version: session.version(),
            current_question_index: session.current_question_index(),
            question_count: session.question_order().len() as u32,
        }
    }
}

async fn resolve_and_assemble(
    client: &Arc<Client>,
    config: &Config,
    template: &TestTemplate,
    user_clerk_id: String,
    session_seed: u64,
    now: chrono::DateTime<chrono::Utc>,
    onet: &dyn OnetProfileProvider,
    team: &dyn TeamProfileProvider,
) -> Result<ac_assembly::AssemblyResult, AssessmentError> {
    let passport = PassportRepository::get_passport(client, &user_clerk_id)
        .await?
        .filter(|p| effective_passport(p, now).is_some());

    let onet_profile = match template.blueprint() {
        ac_blueprint::Blueprint::JobFit { onet_occupation_code, .. } => Some(onet.fetch(onet_occupation_code).await?),
        _ => None,
    };
    let team_profile = match template.blueprint() {
        ac_blueprint::Blueprint::TeamFit { team_id } => Some(team.fetch(team_id).await?),
        _ => None,
    };

    let context = ResolutionContext {
        user_clerk_id,
        team_profile,
        onet_profile,
        passport,
        now,
    };
    let plan = BlueprintResolver::resolve(template, &context)?;

    let engine = AssemblyEngine::new(client);
    engine
        .assemble(AssemblyRequest {
            plan,
            template_context: context_scope_for(template),
            questions_per_indicator: template.questions_per_indicator(),
            inventory_floor: config.selector_inventory_floor,
            session_seed,
            shuffle_questions: template.shuffle_questions(),
        })
        .await
}

pub async fn start(
    req: HttpRequest,
    db: web::Data<Arc<Client>>,
    config: web::Data<Config>,
    onet: web::Data<Arc<dyn OnetProfileProvider>>,
    team: web::Data<Arc<dyn TeamProfileProvider>>,
    auth: Authenticated,
    body: web::Json<StartSessionRequest>,
) -> impl Responder {
    let Authenticated(principal) = auth;
    let user_clerk_id = match principal {
        Principal::Member(id) => id,
        Principal::Anonymous(_) => return error_response(&AssessmentError::permission_denied("start a session with a member token, or use a share link"), req.path()),
    };

    let template = match TemplateRepository::get_latest(db.get_ref(), ID::from(body.template_id)).await {
        Ok(Some(t)) => t,
        Ok(None) => return error_response(&AssessmentError::not_found("TestTemplate", body.template_id), req.path()),
        Err(err) => return error_response(&err, req.path()),
    };

    let now = chrono::Utc::now();
    let session_seed = rand::rng().next_u64();
    let assembled = match resolve_and_assemble(
        db.get_ref(),
        &config,
        &template,
        user_clerk_id.clone(),
        session_seed,
        now,
        onet.get_ref().as_ref(),
        team.get_ref().as_ref(),
    )
    .await
    {
        Ok(a) => a,
        Err(err) => return error_response(&err, req.path()),
    };

    let client_ip = req.connection_info().realip_remote_addr().map(|s| s.to_string());
    let user_agent = req.headers().get("User-Agent").and_then(|h| h.to_str().ok()).map(|s| s.to_string());

    let session = TestSession::start(
        ID::default(),
        template.id(),
        template.version(),
        SessionOwner::Member(user_clerk_id),
        assembled.question_order,
        session_seed,
        template.time_limit_seconds(),
        client_ip,
        user_agent,
        now,
    );

    let engine = SessionEngine::new(db.get_ref(), db.get_ref());
    match engine.start(session).await {
        Ok(session) => HttpResponse::Created().json(StartSessionResponse { session: SessionView::of(&session) }),
        Err(err) => error_response(&err, req.path()),
    }
}

#[derive(Serialize)]
pub struct CurrentQuestionResponse {
    #[serde(rename = "questionId")]
    pub question_id: Option<Uuid>,
    pub index: u32,
    pub total: u32,
    #[serde(rename = "timeRemainingSeconds")]
    pub time_remaining_seconds: i64,
}

impl From<CurrentQuestion> for CurrentQuestionResponse {
    fn from(q: CurrentQuestion) -> Self {
        Self {
            question_id: q.question_id.map(|id| id.inner()),
            index: q.index,
            total: q.total,
            time_remaining_seconds: q.time_remaining_seconds,
        }
    }
}

async fn load_session_authorized(
    db: &Arc<Client>,
    session_id: Uuid,
    principal: &Principal,
) -> Result<TestSession, AssessmentError> {
    let session = SessionRepository::get(db, ID::from(session_id))
        .await?
        .ok_or_else(|| AssessmentError::not_found("TestSession", session_id))?;
    authorize_session(&session, principal)?;
    Ok(session)
}

pub async fn current(req: HttpRequest, db: web::Data<Arc<Client>>, auth: Authenticated, path: web::Path<Uuid>) -> impl Responder {
    let Authenticated(principal) = auth;
    let session_id = path.into_inner();
    if let Err(err) = load_session_authorized(db.get_ref(), session_id, &principal).await {
        return error_response(&err, req.path());
    }
    let engine = SessionEngine::new(db.get_ref(), db.get_ref());
    match engine.get_current(ID::from(session_id), chrono::Utc::now()).await {
        Ok(current) => HttpResponse::Ok().json(CurrentQuestionResponse::from(current)),
        Err(err) => error_response(&err, req.path()),
    }
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    #[serde(rename = "expectedVersion")]
    pub expected_version: u32,
    pub payload: AnswerPayload,
    #[serde(rename = "timeSpentSeconds")]
    pub time_spent_seconds: u32,
}

pub async fn answer(
    req: HttpRequest,
    db: web::Data<Arc<Client>>,
    auth: Authenticated,
    path: web::Path<Uuid>,
    body: web::Json<AnswerRequest>,
) -> impl Responder {
    let Authenticated(principal) = auth;
    let session_id = path.into_inner();
    if let Err(err) = load_session_authorized(db.get_ref(), session_id, &principal).await {
        return error_response(&err, req.path());
    }
    let engine = SessionEngine::new(db.get_ref(), db.get_ref());
    let body = body.into_inner();
    match engine
        .submit_answer(ID::from(session_id), body.expected_version, body.payload, body.time_spent_seconds, chrono::Utc::now())
        .await
    {
        Ok(session) => HttpResponse::Ok().json(StartSessionResponse { session: SessionView::of(&session) }),
        Err(err) => error_response(&err, req.path()),
    }
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    #[serde(rename = "expectedVersion")]
    pub expected_version: u32,
    #[serde(rename = "takerInfo")]
    pub taker_info: Option<serde_json::Value>,
}

pub async fn complete(
    req: HttpRequest,
    db: web::Data<Arc<Client>>,
    audit: web::Data<Arc<dyn AuditSink>>,
    activity: web::Data<Arc<dyn ActivitySink>>,
    onet: web::Data<Arc<dyn OnetProfileProvider>>,
    team: web::Data<Arc<dyn TeamProfileProvider>>,
    auth: Authenticated,
    path: web::Path<Uuid>,
    body: web::Json<CompleteRequest>,
) -> impl Responder {
    let Authenticated(principal) = auth;
    let session_id = path.into_inner();
    if let Err(err) = load_session_authorized(db.get_ref(), session_id, &principal).await {
        return error_response(&err, req.path());
    }

    let now = chrono::Utc::now();
    let engine = SessionEngine::new(db.get_ref(), db.get_ref());
    let session = match engine.complete(ID::from(session_id), body.expected_version, now).await {
        Ok(session) => session,
        Err(err) => return error_response(&err, req.path()),
    };

    if let Some(taker_info) = body.into_inner().taker_info {
        let mut updated = session.clone();
        if let Err(err) = updated.attach_taker_info(taker_info) {
            return error_response(&err, req.path());
        }
        if let Err(err) = SessionRepository::update(db.get_ref(), &updated).await {
            return error_response(&err, req.path());
        }
    }

    let orchestrator = ScoringOrchestrator::new(
        db.get_ref() as &dyn TemplateRepository,
        db.get_ref() as &dyn SessionRepository,
        db.get_ref() as &dyn AnswerRepository,
        db.get_ref() as &dyn ac_items::ItemRepository,
        db.get_ref() as &dyn ac_scoring::ResultRepository,
        db.get_ref() as &dyn PassportRepository,
        audit.get_ref().as_ref(),
        activity.get_ref().as_ref(),
        onet.get_ref().as_ref(),
        team.get_ref().as_ref(),
    );
    match orchestrator.complete(ID::from(session_id), now).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(err) => error_response(&err, req.path()),
    }
}
