//! Append-only session lifecycle events (spec §3 `ActivityEvent`, §4.J).
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityEventKind {
    SessionStarted,
    SessionCompleted,
    SessionAbandoned,
    SessionTimedOut,
}

impl ActivityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "SessionStarted",
            Self::SessionCompleted => "SessionCompleted",
            Self::SessionAbandoned => "SessionAbandoned",
            Self::SessionTimedOut => "SessionTimedOut",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "SessionStarted" => Self::SessionStarted,
            "SessionCompleted" => Self::SessionCompleted,
            "SessionAbandoned" => Self::SessionAbandoned,
            "SessionTimedOut" => Self::SessionTimedOut,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    id: ID<ActivityEvent>,
    kind: ActivityEventKind,
    session_id: ID<TestSession>,
    template_id: ID<TestTemplate>,
    user_id: Option<String>,
    occurred_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

impl ActivityEvent {
    pub fn new(
        kind: ActivityEventKind,
        session_id: ID<TestSession>,
        template_id: ID<TestTemplate>,
        user_id: Option<String>,
        occurred_at: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: ID::default(),
            kind,
            session_id,
            template_id,
            user_id,
            occurred_at,
            metadata,
        }
    }

    pub fn kind(&self) -> ActivityEventKind {
        self.kind
    }
    pub fn session_id(&self) -> ID<TestSession> {
        self.session_id
    }
    pub fn template_id(&self) -> ID<TestTemplate> {
        self.template_id
    }
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }
}

impl ac_core::Unique for ActivityEvent {
    fn id(&self) -> ID<Self> {
        self.id
    }
}

/// Write interface for the activity sink (spec §4.J: "neither is on the
/// session's critical path"). The trait itself may fail; callers use
/// [`record_best_effort`] rather than propagating the error.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, event: &ActivityEvent) -> Result<(), AssessmentError>;
    async fn list_for_session(&self, session_id: ID<TestSession>) -> Result<Vec<ActivityEvent>, AssessmentError>;
}

/// Logs and swallows a sink failure instead of letting it reach the caller —
/// a session must be able to complete even if the audit trail can't be
/// written (spec §4.J).
pub async fn record_best_effort(sink: &dyn ActivitySink, event: ActivityEvent) {
    if let Err(err) = ac_core::retry::with_default_backoff(|| async { sink.record(&event).await }).await {
        log::error!("activity event {:?} for session {} dropped: {}", event.kind(), event.session_id(), err);
    }
}

#[derive(Default)]
pub struct InMemoryActivitySink {
    events: RwLock<Vec<ActivityEvent>>,
}

impl InMemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivitySink {
    async fn record(&self, event: &ActivityEvent) -> Result<(), AssessmentError> {
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }
    async fn list_for_session(&self, session_id: ID<TestSession>) -> Result<Vec<ActivityEvent>, AssessmentError> {
        Ok(self
            .events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.session_id() == session_id)
            .cloned()
            .collect())
    }
}

pub(crate) mod pg_schema {
    use super::*;
    use ac_pg::ACTIVITY_EVENTS;
    use ac_pg::Schema;

    impl Schema for ActivityEvent {
        fn name() -> &'static str {
            ACTIVITY_EVENTS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                ACTIVITY_EVENTS,
                " (
                    id           UUID PRIMARY KEY,
                    kind         VARCHAR(32) NOT NULL,
                    session_id   UUID NOT NULL,
                    template_id  UUID NOT NULL,
                    user_id      VARCHAR(128),
                    occurred_at  TIMESTAMPTZ NOT NULL,
                    metadata     JSONB NOT NULL DEFAULT '{}'
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE INDEX IF NOT EXISTS idx_activity_session ON ",
                ACTIVITY_EVENTS,
                " (session_id);"
            )
        }
    }
}

fn row_to_event(row: &tokio_postgres::Row) -> ActivityEvent {
    let kind_raw: String = row.get(1);
    ActivityEvent {
        id: ID::from(row.get::<_, uuid::Uuid>(0)),
        kind: ActivityEventKind::parse(&kind_raw).unwrap_or(ActivityEventKind::SessionStarted),
        session_id: ID::from(row.get::<_, uuid::Uuid>(2)),
        template_id: ID::from(row.get::<_, uuid::Uuid>(3)),
        user_id: row.get(4),
        occurred_at: row.get(5),
        metadata: row.get(6),
    }
}

#[async_trait]
impl ActivitySink for Arc<Client> {
    async fn record(&self, event: &ActivityEvent) -> Result<(), AssessmentError> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                ac_pg::ACTIVITY_EVENTS,
                " (id, kind, session_id, template_id, user_id, occurred_at, metadata)
                 VALUES ($1,$2,$3,$4,$5,$6,$7)"
            ),
            &[
                &event.id.inner(),
                &event.kind().as_str(),
                &event.session_id().inner(),
                &event.template_id().inner(),
                &event.user_id(),
                &event.occurred_at(),
                &event.metadata(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_for_session(&self, session_id: ID<TestSession>) -> Result<Vec<ActivityEvent>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT id, kind, session_id, template_id, user_id, occurred_at, metadata FROM ",
                    ac_pg::ACTIVITY_EVENTS,
                    " WHERE session_id = $1 ORDER BY occurred_at"
                ),
                &[&session_id.inner()],
            )
            .await?;
        Ok(rows.iter().map(row_to_event).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn best_effort_record_swallows_errors_silently() {
        struct AlwaysFails;
        #[async_trait]
        impl ActivitySink for AlwaysFails {
            async fn record(&self, _event: &ActivityEvent) -> Result<(), AssessmentError> {
                Err(AssessmentError::internal("db unreachable"))
            }
            async fn list_for_session(&self, _session_id: ID<TestSession>) -> Result<Vec<ActivityEvent>, AssessmentError> {
                Ok(vec![])
            }
        }
        let event = ActivityEvent::new(
            ActivityEventKind::SessionStarted,
            ID::default(),
            ID::default(),
            None,
            DateTime::UNIX_EPOCH,
            serde_json::json!({}),
        );
        record_best_effort(&AlwaysFails, event).await;
    }

    #[tokio::test]
    async fn in_memory_sink_lists_only_matching_session() {
        let sink = InMemoryActivitySink::new();
        let session_a = ID::default();
        let session_b = ID::default();
        sink.record(&ActivityEvent::new(
            ActivityEventKind::SessionStarted,
            session_a,
            ID::default(),
            None,
            DateTime::UNIX_EPOCH,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
        sink.record(&ActivityEvent::new(
            ActivityEventKind::SessionStarted,
            session_b,
            ID::default(),
            None,
            DateTime::UNIX_EPOCH,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
        let events = sink.list_for_session(session_a).await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
