//! PostgreSQL connectivity and table-name constants for the assessment core.
//!
//! ## Connectivity
//!
//! - [`connect()`] — establishes a connection from `Config::db_url`
//!
//! ## Schema
//!
//! - [`Schema`] — table metadata and DDL generation (one impl per entity,
//!   defined alongside the entity in `ac-items`/`ac-blueprint`/etc.)
mod schema;

pub use schema::Schema;

use std::sync::Arc;
use tokio_postgres::Client;

/// PostgreSQL error type alias, matching the teacher's `rbp_pg::PgErr`.
pub type PgErr = tokio_postgres::Error;

/// Establishes a database connection from the given URL.
///
/// Spawns the connection driver onto the Tokio runtime (teacher's
/// `rbp_pg::db()` convention) and returns a shared client handle suitable for
/// cloning into `web::Data` or passing to background jobs.
pub async fn connect(db_url: &str) -> Result<Arc<Client>, PgErr> {
    log::info!("connecting to database");
    let tls = tokio_postgres::tls::NoTls;
    let (client, connection) = tokio_postgres::connect(db_url, tls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("postgres connection driver terminated: {}", e);
        }
    });
    client
        .execute("SET client_min_messages TO WARNING", &[])
        .await?;
    Ok(Arc::new(client))
}

/// Runs `T::creates()` then `T::indices()` against the given client.
/// Intended for boot-time schema bring-up in local/dev environments;
/// production deployments apply migrations forward-only via a separate
/// migration tool (out of scope per spec §1).
pub async fn ensure_schema<T: Schema>(client: &Client) -> Result<(), PgErr> {
    client.batch_execute(T::creates()).await?;
    client.batch_execute(T::indices()).await?;
    Ok(())
}

// ============================================================================
// TABLE NAMES
// ============================================================================
#[rustfmt::skip]
pub const COMPETENCIES:         &str = "competencies";
#[rustfmt::skip]
pub const INDICATORS:           &str = "behavioral_indicators";
#[rustfmt::skip]
pub const ITEMS:                &str = "assessment_questions";
#[rustfmt::skip]
pub const ITEM_STATISTICS:      &str = "item_statistics";
#[rustfmt::skip]
pub const COMPETENCY_RELIABILITY: &str = "competency_reliability";
#[rustfmt::skip]
pub const BIG_FIVE_RELIABILITY: &str = "big_five_reliability";
#[rustfmt::skip]
pub const TEMPLATES:            &str = "test_templates";
#[rustfmt::skip]
pub const SESSIONS:             &str = "test_sessions";
#[rustfmt::skip]
pub const ANSWERS:              &str = "test_answers";
#[rustfmt::skip]
pub const RESULTS:              &str = "test_results";
#[rustfmt::skip]
pub const PASSPORTS:            &str = "competency_passports";
#[rustfmt::skip]
pub const ACTIVITY_EVENTS:      &str = "activity_events";
#[rustfmt::skip]
pub const SCORING_AUDIT_LOG:    &str = "scoring_audit_log";
#[rustfmt::skip]
pub const RATE_LIMITS:          &str = "anon_rate_limits";
#[rustfmt::skip]
pub const SCHEDULER_LOCKS:      &str = "scheduler_locks";
