//! Scoring audit trail (spec §3 `ScoringAuditLog`, §4.F/§4.J).
use ac_blueprint::Goal;
use ac_blueprint::TestTemplate;
use ac_core::AssessmentError;
use ac_core::ID;
use ac_session::TestSession;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use std::sync::RwLock;
use tokio_postgres::Client;

/// One row per scoring run (spec §4.F step 3: "append ScoringAuditLog with a
/// snapshot of indicator weights, goal-specific configuration, timing, and
/// answered/skipped counts"). `result_id` is a raw `Uuid` rather than a typed
/// `ID<TestResult>` for the same reason [`ac_passport::CompetencyPassport`]
/// stores one — `ac-scoring` owns `TestResult` and already depends on this
/// crate, so a typed back-reference would cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringAuditLog {
    id: ID<ScoringAuditLog>,
    session_id: ID<TestSession>,
    result_id: uuid::Uuid,
    template_id: ID<TestTemplate>,
    goal: Goal,
    strategy_tag: String,
    weights_snapshot: serde_json::Value,
    competency_breakdown_snapshot: serde_json::Value,
    config_snapshot: serde_json::Value,
    answered_count: u32,
    skipped_count: u32,
    duration_ms: u64,
    created_at: DateTime<Utc>,
}

impl ScoringAuditLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: ID<TestSession>,
        result_id: uuid::Uuid,
        template_id: ID<TestTemplate>,
        goal: Goal,
        strategy_tag: impl Into<String>,
        weights_snapshot: serde_json::Value,
        competency_breakdown_snapshot: serde_json::Value,
        config_snapshot: serde_json::Value,
        answered_count: u32,
        skipped_count: u32,
        duration_ms: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ID::default(),
            session_id,
            result_id,
            template_id,
            goal,
            strategy_tag: strategy_tag.into(),
            weights_snapshot,
            competency_breakdown_snapshot,
            config_snapshot,
            answered_count,
            skipped_count,
            duration_ms,
            created_at,
        }
    }

    pub fn session_id(&self) -> ID<TestSession> {
        self.session_id
    }
    pub fn result_id(&self) -> uuid::Uuid {
        self.result_id
    }
    pub fn goal(&self) -> Goal {
        self.goal
    }
    pub fn strategy_tag(&self) -> &str {
        &self.strategy_tag
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl ac_core::Unique for ScoringAuditLog {
    fn id(&self) -> ID<Self> {
        self.id
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, log: &ScoringAuditLog) -> Result<(), AssessmentError>;
    async fn get_for_session(&self, session_id: ID<TestSession>) -> Result<Option<ScoringAuditLog>, AssessmentError>;
}

/// Spec §4.J: audit writes never block the critical path. A failure here is
/// logged and dropped, never surfaced to the scoring orchestrator's caller.
pub async fn append_best_effort(sink: &dyn AuditSink, entry: ScoringAuditLog) {
    if let Err(err) = ac_core::retry::with_default_backoff(|| async { sink.append(&entry).await }).await {
        log::error!("scoring audit log for session {} dropped: {}", entry.session_id(), err);
    }
}

#[derive(Default)]
pub struct InMemoryAuditSink {
    logs: RwLock<Vec<ScoringAuditLog>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, log: &ScoringAuditLog) -> Result<(), AssessmentError> {
        self.logs.write().unwrap().push(log.clone());
        Ok(())
    }
    async fn get_for_session(&self, session_id: ID<TestSession>) -> Result<Option<ScoringAuditLog>, AssessmentError> {
        Ok(self.logs.read().unwrap().iter().find(|l| l.session_id() == session_id).cloned())
    }
}

pub(crate) mod pg_schema {
    use super::*;
    use ac_pg::SCORING_AUDIT_LOG;
    use ac_pg::Schema;

    impl Schema for ScoringAuditLog {
        fn name() -> &'static str {
            SCORING_AUDIT_LOG
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                SCORING_AUDIT_LOG,
                " (
                    id                              UUID PRIMARY KEY,
                    session_id                      UUID NOT NULL,
                    result_id                       UUID NOT NULL,
                    template_id                     UUID NOT NULL,
                    goal                            VARCHAR(16) NOT NULL,
                    strategy_tag                    VARCHAR(64) NOT NULL,
                    weights_snapshot                JSONB NOT NULL DEFAULT '{}',
                    competency_breakdown_snapshot   JSONB NOT NULL DEFAULT '{}',
                    config_snapshot                 JSONB NOT NULL DEFAULT '{}',
                    answered_count                  INTEGER NOT NULL,
                    skipped_count                   INTEGER NOT NULL,
                    duration_ms                     BIGINT NOT NULL,
                    created_at                      TIMESTAMPTZ NOT NULL
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_audit_session ON ",
                SCORING_AUDIT_LOG,
                " (session_id);"
            )
        }
    }
}

fn row_to_log(row: &tokio_postgres::Row) -> ScoringAuditLog {
    let goal_raw: String = row.get(4);
    ScoringAuditLog {
        id: ID::from(row.get::<_, uuid::Uuid>(0)),
        session_id: ID::from(row.get::<_, uuid::Uuid>(1)),
        result_id: row.get(2),
        template_id: ID::from(row.get::<_, uuid::Uuid>(3)),
        goal: Goal::parse(&goal_raw).unwrap_or(Goal::Overview),
        strategy_tag: row.get(5),
        weights_snapshot: row.get(6),
        competency_breakdown_snapshot: row.get(7),
        config_snapshot: row.get(8),
        answered_count: row.get::<_, i32>(9) as u32,
        skipped_count: row.get::<_, i32>(10) as u32,
        duration_ms: row.get::<_, i64>(11) as u64,
        created_at: row.get(12),
    }
}

#[async_trait]
impl AuditSink for Arc<Client> {
    async fn append(&self, log: &ScoringAuditLog) -> Result<(), AssessmentError> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                ac_pg::SCORING_AUDIT_LOG,
                " (id, session_id, result_id, template_id, goal, strategy_tag, weights_snapshot,
                   competency_breakdown_snapshot, config_snapshot, answered_count, skipped_count,
                   duration_ms, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
                 ON CONFLICT (session_id) DO NOTHING"
            ),
            &[
                &log.id.inner(),
                &log.session_id().inner(),
                &log.result_id(),
                &log.template_id.inner(),
                &log.goal().as_str(),
                &log.strategy_tag(),
                &log.weights_snapshot,
                &log.competency_breakdown_snapshot,
                &log.config_snapshot,
                &(log.answered_count as i32),
                &(log.skipped_count as i32),
                &(log.duration_ms as i64),
                &log.created_at(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_for_session(&self, session_id: ID<TestSession>) -> Result<Option<ScoringAuditLog>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT id, session_id, result_id, template_id, goal, strategy_tag, weights_snapshot,
                            competency_breakdown_snapshot, config_snapshot, answered_count, skipped_count,
                            duration_ms, created_at FROM ",
                    ac_pg::SCORING_AUDIT_LOG,
                    " WHERE session_id = $1"
                ),
                &[&session_id.inner()],
            )
            .await?;
        Ok(row.as_ref().map(row_to_log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_sink_finds_the_one_log_per_session() {
        let sink = InMemoryAuditSink::new();
        let session_id = ID::default();
        let log = ScoringAuditLog::new(
            session_id,
            uuid::Uuid::now_v7(),
            ID::default(),
            Goal::Overview,
            "overview",
            serde_json::json!({}),
            serde_json::json!({}),
            serde_json::json!({}),
            10,
            2,
            42,
            DateTime::UNIX_EPOCH,
        );
        append_best_effort(&sink, log).await;
        let found = sink.get_for_session(session_id).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().strategy_tag(), "overview");
    }
}
