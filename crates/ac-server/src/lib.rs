//! Unified Assessment Server
//!
//! HTTP surface for the test-assembly, session, scoring, and passport
//! system, plus the two background jobs that keep it healthy without an
//! operator driving them by hand: the session sweep (spec §4.E timeouts/
//! idle-abandon) and the psychometric analyser (spec §4.H item
//! recalibration).
//!
//! ## Submodules
//!
//! - [`auth`] — bearer-token extraction and session ownership checks
//! - [`handlers`] — one module per route group
//! - [`correlation`] — per-request id middleware
//! - [`error`] — `AssessmentError` to HTTP response mapping
//! - [`providers`] — production stand-ins for external profile lookups
pub mod auth;
pub mod correlation;
pub mod error;
pub mod handlers;
pub mod providers;

use crate::providers::UnavailableOnetProvider;
use crate::providers::UnavailableTeamProvider;
use actix_cors::Cors;
use actix_web::App;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::Responder;
use actix_web::middleware::Logger;
use actix_web::web;
use ac_activity::ActivitySink;
use ac_activity::AuditSink;
use ac_blueprint::TestTemplate;
use ac_core::Config;
use ac_items::AssessmentQuestion;
use ac_items::BehavioralIndicator;
use ac_items::BigFiveReliability;
use ac_items::Competency;
use ac_items::CompetencyReliability;
use ac_items::ItemStatistics;
use ac_passport::CompetencyPassport;
use ac_psychometrics::AnalyserSettings;
use ac_psychometrics::PsychometricAnalyser;
use ac_psychometrics::SchedulerLockRepository;
use ac_psychometrics::SchedulerLockTable;
use ac_psychometrics::run_under_lock;
use ac_scoring::OnetProfileProvider;
use ac_scoring::TeamProfileProvider;
use ac_scoring::TestResult;
use ac_session::RateLimitRecord;
use ac_session::SessionEngine;
use ac_session::TestAnswer;
use ac_session::TestSession;
use std::sync::Arc;
use tokio_postgres::Client;

async fn health(client: web::Data<Arc<Client>>) -> impl Responder {
    match client.execute("SELECT 1", &[]).await.inspect_err(|e| log::error!("health check failed: {e}")) {
        Ok(_) => HttpResponse::Ok().body("ok"),
        Err(_) => HttpResponse::ServiceUnavailable().body("database unavailable"),
    }
}

async fn bring_up_schema(client: &Client) -> Result<(), ac_pg::PgErr> {
    ac_pg::ensure_schema::<Competency>(client).await?;
    ac_pg::ensure_schema::<BehavioralIndicator>(client).await?;
    ac_pg::ensure_schema::<AssessmentQuestion>(client).await?;
    ac_pg::ensure_schema::<CompetencyReliability>(client).await?;
    ac_pg::ensure_schema::<BigFiveReliability>(client).await?;
    ac_pg::ensure_schema::<ItemStatistics>(client).await?;
    ac_pg::ensure_schema::<TestTemplate>(client).await?;
    ac_pg::ensure_schema::<TestSession>(client).await?;
    ac_pg::ensure_schema::<TestAnswer>(client).await?;
    ac_pg::ensure_schema::<TestResult>(client).await?;
    ac_pg::ensure_schema::<CompetencyPassport>(client).await?;
    ac_pg::ensure_schema::<RateLimitRecord>(client).await?;
    ac_pg::ensure_schema::<SchedulerLockTable>(client).await?;
    ac_pg::ensure_schema::<ac_activity::ScoringAuditLog>(client).await?;
    ac_pg::ensure_schema::<ac_activity::ActivityEvent>(client).await?;
    Ok(())
}

/// Runs the session sweep (spec §4.E) on a fixed interval, under the
/// distributed lock so only one process instance sweeps at a time
/// (SPEC_FULL.md §2 expansion).
fn spawn_sweep_task(client: Arc<Client>, config: Config, instance_id: String) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();
            let locks: &dyn SchedulerLockRepository = &client;
            let result = run_under_lock(locks, "session-sweep", &instance_id, now, chrono::Duration::from_std(config.sweep_interval).unwrap_or(chrono::Duration::seconds(30)), || async {
                let engine = SessionEngine::new(&client, &client);
                engine.sweep(now).await
            })
            .await;
            match result {
                Ok(Some(Ok(swept))) if !swept.is_empty() => log::info!("session sweep closed {} sessions", swept.len()),
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(err))) => log::error!("session sweep failed: {err}"),
                Ok(None) => {}
                Err(err) => log::error!("session sweep lock error: {err}"),
            }
        }
    });
}

/// Runs the psychometric analyser (spec §4.H) on a fixed interval, under
/// the same distributed lock convention as the sweep task.
fn spawn_psychometric_task(client: Arc<Client>, config: Config, instance_id: String) {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(60 * 60);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();
            let locks: &dyn SchedulerLockRepository = &client;
            let settings = AnalyserSettings {
                min_responses: config.psychometric_min_responses,
                review_dwell: chrono::Duration::days(config.psychometric_review_dwell_days),
            };
            let result = run_under_lock(locks, "psychometric-analysis", &instance_id, now, chrono::Duration::hours(1), || async {
                let analyser = PsychometricAnalyser::new(&client, &client, &client);
                analyser.analyse_all(settings, now).await
            })
            .await;
            match result {
                Ok(Some(Ok(report))) => log::info!(
                    "psychometric analysis considered {} items, updated {}, flagged {} below threshold, {} failed",
                    report.items_considered,
                    report.items_updated,
                    report.items_below_threshold,
                    report.items_failed,
                ),
                Ok(Some(Err(err))) => log::error!("psychometric analysis failed: {err}"),
                Ok(None) => {}
                Err(err) => log::error!("psychometric analysis lock error: {err}"),
            }
        }
    });
}

#[rustfmt::skip]
pub async fn run() -> Result<(), std::io::Error> {
    let config = Config::from_env();
    let client = ac_pg::connect(&config.db_url).await.expect("connect to database");
    bring_up_schema(&client).await.expect("bring up schema");

    let instance_id = ac_core::correlation_id();
    spawn_sweep_task(client.clone(), config.clone(), instance_id.clone());
    spawn_psychometric_task(client.clone(), config.clone(), instance_id);

    let crypto = web::Data::new(crate::auth::Crypto::from_env());
    let config_data = web::Data::new(config.clone());
    let audit: web::Data<Arc<dyn AuditSink>> = web::Data::new(client.clone() as Arc<dyn AuditSink>);
    let activity: web::Data<Arc<dyn ActivitySink>> = web::Data::new(client.clone() as Arc<dyn ActivitySink>);
    let onet: web::Data<Arc<dyn OnetProfileProvider>> = web::Data::new(Arc::new(UnavailableOnetProvider) as Arc<dyn OnetProfileProvider>);
    let team: web::Data<Arc<dyn TeamProfileProvider>> = web::Data::new(Arc::new(UnavailableTeamProvider) as Arc<dyn TeamProfileProvider>);
    let client = web::Data::new(client);

    log::info!("starting assessment server");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%r %s %Ts"))
            .wrap(crate::correlation::CorrelationId)
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header(),
            )
            .app_data(client.clone())
            .app_data(config_data.clone())
            .app_data(crypto.clone())
            .app_data(audit.clone())
            .app_data(activity.clone())
            .app_data(onet.clone())
            .app_data(team.clone())
            .route("/health", web::get().to(health))
            .service(
                web::scope("/tests/sessions")
                    .route("", web::post().to(handlers::sessions::start))
                    .route("/{id}/current", web::get().to(handlers::sessions::current))
                    .route("/{id}/answers", web::post().to(handlers::sessions::answer))
                    .route("/{id}/complete", web::post().to(handlers::sessions::complete)),
            )
            .service(
                web::scope("/tests/results")
                    .route("/{id}", web::get().to(handlers::results::get_by_session)),
            )
            .service(
                web::scope("/share-links")
                    .route("/{token}/sessions", web::post().to(handlers::share_links::start)),
            )
            .service(
                web::scope("/passports")
                    .route("/user/{clerkUserId}", web::get().to(handlers::passports::get_by_user)),
            )
    })
    .workers(6)
    .bind(&config.bind_addr)?
    .run()
    .await
}
