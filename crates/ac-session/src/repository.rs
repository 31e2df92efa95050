use crate::AnswerPayload;
use crate::RateLimitRecord;
use crate::SessionOwner;
use crate::SessionStatus;
use crate::TestAnswer;
use crate::TestSession;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use ac_items::AssessmentQuestion;
use ac_pg::ANSWERS;
use ac_pg::RATE_LIMITS;
use ac_pg::SESSIONS;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use tokio_postgres::Client;
use tokio_postgres::Row;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, id: ID<TestSession>) -> Result<Option<TestSession>, AssessmentError>;
    async fn get_by_access_token_hash(&self, hash: &str) -> Result<Option<TestSession>, AssessmentError>;
    async fn insert(&self, session: &TestSession) -> Result<(), AssessmentError>;

    /// Succeeds only if the stored row's version still equals
    /// `session.version()`, then bumps it by one (spec §4.E / §5 "at most
    /// one concurrent update succeeds per session"). Returns `Conflict`
    /// otherwise so the caller rereads and retries.
    async fn update(&self, session: &TestSession) -> Result<(), AssessmentError>;

    /// For the timeout/stale-abandon sweep (spec §4.E cleanup job).
    async fn list_in_progress(&self) -> Result<Vec<TestSession>, AssessmentError>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    async fn get(
        &self,
        session_id: ID<TestSession>,
        question_id: ID<AssessmentQuestion>,
    ) -> Result<Option<TestAnswer>, AssessmentError>;
    async fn list_for_session(&self, session_id: ID<TestSession>) -> Result<Vec<TestAnswer>, AssessmentError>;

    /// Every answer ever submitted to this item across all sessions, used by
    /// the psychometric job to compute p-value and point-biserial
    /// discrimination (spec §4.H); unlike `list_for_session` this fans out
    /// across respondents rather than within one.
    async fn list_for_question(&self, question_id: ID<AssessmentQuestion>) -> Result<Vec<TestAnswer>, AssessmentError>;
    async fn upsert(&self, answer: &TestAnswer) -> Result<(), AssessmentError>;
}

#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    async fn get(&self, ip: &str) -> Result<Option<RateLimitRecord>, AssessmentError>;

    /// Succeeds only if the stored row's version still equals
    /// `record.version()` (or the row doesn't exist yet), then bumps it by
    /// one — the same optimistic-concurrency guard as
    /// `SessionRepository::update` (spec §5 "a single row per IP with an
    /// optimistic update"). Returns `Conflict` otherwise so the caller
    /// rereads, reapplies the attempt, and retries.
    async fn upsert(&self, record: &RateLimitRecord) -> Result<(), AssessmentError>;
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<uuid::Uuid, TestSession>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get(&self, id: ID<TestSession>) -> Result<Option<TestSession>, AssessmentError> {
        Ok(self.sessions.read().unwrap().get(&id.inner()).cloned())
    }
    async fn get_by_access_token_hash(&self, hash: &str) -> Result<Option<TestSession>, AssessmentError> {
        Ok(self
            .sessions
            .read()
            .unwrap()
            .values()
            .find(|s| s.access_token_hash() == Some(hash))
            .cloned())
    }
    async fn insert(&self, session: &TestSession) -> Result<(), AssessmentError> {
        self.sessions.write().unwrap().insert(session.id().inner(), session.clone());
        Ok(())
    }
    async fn update(&self, session: &TestSession) -> Result<(), AssessmentError> {
        let mut sessions = self.sessions.write().unwrap();
        let stored = sessions
            .get(&session.id().inner())
            .ok_or_else(|| AssessmentError::not_found("TestSession", session.id().inner()))?;
        if stored.version() != session.version() {
            return Err(AssessmentError::conflict("session version mismatch"));
        }
        let mut updated = session.clone();
        updated.bump_version();
        sessions.insert(session.id().inner(), updated);
        Ok(())
    }
    async fn list_in_progress(&self) -> Result<Vec<TestSession>, AssessmentError> {
        Ok(self
            .sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.status() == SessionStatus::InProgress)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryAnswerRepository {
    answers: RwLock<HashMap<(uuid::Uuid, uuid::Uuid), TestAnswer>>,
}

impl InMemoryAnswerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnswerRepository for InMemoryAnswerRepository {
    async fn get(
        &self,
        session_id: ID<TestSession>,
        question_id: ID<AssessmentQuestion>,
    ) -> Result<Option<TestAnswer>, AssessmentError> {
        Ok(self
            .answers
            .read()
            .unwrap()
            .get(&(session_id.inner(), question_id.inner()))
            .cloned())
    }
    async fn list_for_session(&self, session_id: ID<TestSession>) -> Result<Vec<TestAnswer>, AssessmentError> {
        Ok(self
            .answers
            .read()
            .unwrap()
            .values()
            .filter(|a| a.session_id() == session_id)
            .cloned()
            .collect())
    }
    async fn list_for_question(&self, question_id: ID<AssessmentQuestion>) -> Result<Vec<TestAnswer>, AssessmentError> {
        Ok(self
            .answers
            .read()
            .unwrap()
            .values()
            .filter(|a| a.question_id() == question_id)
            .cloned()
            .collect())
    }
    async fn upsert(&self, answer: &TestAnswer) -> Result<(), AssessmentError> {
        self.answers
            .write()
            .unwrap()
            .insert((answer.session_id().inner(), answer.question_id().inner()), answer.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRateLimitRepository {
    records: RwLock<HashMap<String, RateLimitRecord>>,
}

impl InMemoryRateLimitRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitRepository for InMemoryRateLimitRepository {
    async fn get(&self, ip: &str) -> Result<Option<RateLimitRecord>, AssessmentError> {
        Ok(self.records.read().unwrap().get(ip).cloned())
    }
    async fn upsert(&self, record: &RateLimitRecord) -> Result<(), AssessmentError> {
        let mut records = self.records.write().unwrap();
        if let Some(stored) = records.get(record.ip()) {
            if stored.version() != record.version() {
                return Err(AssessmentError::conflict("rate limit record version mismatch"));
            }
        }
        let mut updated = record.clone();
        updated.bump_version();
        records.insert(record.ip().to_string(), updated);
        Ok(())
    }
}

fn decode<T>(column: &str, raw: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, AssessmentError> {
    parse(raw).ok_or_else(|| AssessmentError::internal(format!("unrecognized {column} value in storage: {raw}")))
}

fn row_to_session(row: &Row) -> Result<TestSession, AssessmentError> {
    let id: ID<TestSession> = ID::from(row.get::<_, uuid::Uuid>(0));
    let template_id = ID::from(row.get::<_, uuid::Uuid>(1));
    let template_version: i32 = row.get(2);
    let clerk_user_id: Option<String> = row.get(3);
    let status_raw: String = row.get(4);
    let current_question_index: i32 = row.get(5);
    let question_order_raw: serde_json::Value = row.get(6);
    let time_limit_seconds: i32 = row.get(7);
    let last_activity_at: chrono::DateTime<chrono::Utc> = row.get(8);
    let version: i32 = row.get(9);
    let started_at: chrono::DateTime<chrono::Utc> = row.get(10);
    let completed_at: Option<chrono::DateTime<chrono::Utc>> = row.get(11);
    let session_seed: i64 = row.get(12);
    let share_link_token: Option<String> = row.get(13);
    let access_token_hash: Option<String> = row.get(14);
    let client_ip: Option<String> = row.get(15);
    let user_agent: Option<String> = row.get(16);
    let taker_info: Option<serde_json::Value> = row.get(17);

    let status = decode("status", &status_raw, SessionStatus::parse)?;
    let question_order_strings: Vec<String> =
        serde_json::from_value(question_order_raw).map_err(|e| AssessmentError::internal(e.to_string()))?;
    let question_order = question_order_strings
        .into_iter()
        .map(|s| {
            uuid::Uuid::parse_str(&s)
                .map(ID::from)
                .map_err(|e| AssessmentError::internal(format!("corrupt question id: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let owner = match clerk_user_id {
        Some(id) => SessionOwner::Member(id),
        None => SessionOwner::Anonymous,
    };

    let mut session = TestSession::start(
        id,
        template_id,
        template_version as u32,
        owner,
        question_order,
        session_seed as u64,
        time_limit_seconds as u32,
        client_ip,
        user_agent,
        started_at,
    );
    if let Some(token) = share_link_token {
        session = session.with_share_link(token);
    }
    if let Some(hash) = access_token_hash {
        session = session.with_access_token_hash(hash);
    }
    session.restore(status, current_question_index as u32, last_activity_at, version as u32, completed_at, taker_info);
    Ok(session)
}

const SESSION_COLUMNS: &str = "id, template_id, template_version, clerk_user_id, status, current_question_index, \
     question_order, time_limit_seconds, last_activity_at, version, started_at, completed_at, session_seed, \
     share_link_token, access_token_hash, client_ip, user_agent, taker_info";

#[async_trait]
impl SessionRepository for Arc<Client> {
    async fn get(&self, id: ID<TestSession>) -> Result<Option<TestSession>, AssessmentError> {
        let row = self
            .query_opt(
                &format!("SELECT {SESSION_COLUMNS} FROM {SESSIONS} WHERE id = $1"),
                &[&id.inner()],
            )
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn get_by_access_token_hash(&self, hash: &str) -> Result<Option<TestSession>, AssessmentError> {
        let row = self
            .query_opt(
                &format!("SELECT {SESSION_COLUMNS} FROM {SESSIONS} WHERE access_token_hash = $1"),
                &[&hash],
            )
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn insert(&self, session: &TestSession) -> Result<(), AssessmentError> {
        let question_order: Vec<String> = session.question_order().iter().map(|id| id.inner().to_string()).collect();
        let question_order_json = serde_json::to_value(question_order).unwrap_or_default();
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                SESSIONS,
                " (id, template_id, template_version, clerk_user_id, status, current_question_index,
                   question_order, time_limit_seconds, last_activity_at, version, started_at, completed_at,
                   session_seed, share_link_token, access_token_hash, client_ip, user_agent, taker_info)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)"
            ),
            &[
                &session.id().inner(),
                &session.template_id().inner(),
                &(session.template_version() as i32),
                &session.owner().clerk_user_id(),
                &session.status().as_str(),
                &(session.current_question_index() as i32),
                &question_order_json,
                &(session.time_limit_seconds() as i32),
                &session.last_activity_at(),
                &(session.version() as i32),
                &session.started_at(),
                &session.completed_at(),
                &(session.session_seed() as i64),
                &session.share_link_token(),
                &session.access_token_hash(),
                &session.client_ip(),
                &session.user_agent(),
                &session.taker_info(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn update(&self, session: &TestSession) -> Result<(), AssessmentError> {
        let rows = self
            .execute(
                const_format::concatcp!(
                    "UPDATE ",
                    SESSIONS,
                    " SET status = $1, current_question_index = $2, last_activity_at = $3,
                         version = version + 1, completed_at = $4, taker_info = $5
                     WHERE id = $6 AND version = $7"
                ),
                &[
                    &session.status().as_str(),
                    &(session.current_question_index() as i32),
                    &session.last_activity_at(),
                    &session.completed_at(),
                    &session.taker_info(),
                    &session.id().inner(),
                    &(session.version() as i32),
                ],
            )
            .await?;
        if rows == 0 {
            return Err(AssessmentError::conflict("session version mismatch"));
        }
        Ok(())
    }

    async fn list_in_progress(&self) -> Result<Vec<TestSession>, AssessmentError> {
        let rows = self
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM {SESSIONS} WHERE status = 'InProgress'"),
                &[],
            )
            .await?;
        rows.iter().map(row_to_session).collect()
    }
}

fn row_to_answer(row: &Row) -> Result<TestAnswer, AssessmentError> {
    let session_id: ID<TestSession> = ID::from(row.get::<_, uuid::Uuid>(0));
    let question_id: ID<AssessmentQuestion> = ID::from(row.get::<_, uuid::Uuid>(1));
    let payload_raw: Option<serde_json::Value> = row.get(2);
    let answered_at: chrono::DateTime<chrono::Utc> = row.get(3);
    let time_spent_seconds: i32 = row.get(4);
    let is_skipped: bool = row.get(5);
    let score: Option<f64> = row.get(6);
    let max_score: Option<f64> = row.get(7);

    let payload: Option<AnswerPayload> = payload_raw
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| AssessmentError::internal(e.to_string()))?;

    let mut answer = match (payload, is_skipped) {
        (Some(payload), _) => TestAnswer::new(session_id, question_id, payload, answered_at, time_spent_seconds as u32),
        (None, _) => TestAnswer::skipped(session_id, question_id, answered_at, time_spent_seconds as u32),
    };
    if let (Some(score), Some(max_score)) = (score, max_score) {
        answer.set_score(score, max_score);
    }
    Ok(answer)
}

#[async_trait]
impl AnswerRepository for Arc<Client> {
    async fn get(
        &self,
        session_id: ID<TestSession>,
        question_id: ID<AssessmentQuestion>,
    ) -> Result<Option<TestAnswer>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT session_id, question_id, payload, answered_at, time_spent_seconds, is_skipped,
                            score, max_score FROM ",
                    ANSWERS,
                    " WHERE session_id = $1 AND question_id = $2"
                ),
                &[&session_id.inner(), &question_id.inner()],
            )
            .await?;
        row.as_ref().map(row_to_answer).transpose()
    }

    async fn list_for_session(&self, session_id: ID<TestSession>) -> Result<Vec<TestAnswer>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT session_id, question_id, payload, answered_at, time_spent_seconds, is_skipped,
                            score, max_score FROM ",
                    ANSWERS,
                    " WHERE session_id = $1"
                ),
                &[&session_id.inner()],
            )
            .await?;
        rows.iter().map(row_to_answer).collect()
    }

    async fn list_for_question(&self, question_id: ID<AssessmentQuestion>) -> Result<Vec<TestAnswer>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT session_id, question_id, payload, answered_at, time_spent_seconds, is_skipped,
                            score, max_score FROM ",
                    ANSWERS,
                    " WHERE question_id = $1"
                ),
                &[&question_id.inner()],
            )
            .await?;
        rows.iter().map(row_to_answer).collect()
    }

    async fn upsert(&self, answer: &TestAnswer) -> Result<(), AssessmentError> {
        let payload_json = answer.payload().map(|p| serde_json::to_value(p).unwrap_or_default());
        ac_core::retry::with_default_backoff(|| async {
            self.execute(
                const_format::concatcp!(
                    "INSERT INTO ",
                    ANSWERS,
                    " (session_id, question_id, payload, answered_at, time_spent_seconds, is_skipped, score, max_score)
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
                     ON CONFLICT (session_id, question_id) DO UPDATE SET
                       payload = EXCLUDED.payload,
                       answered_at = EXCLUDED.answered_at,
                       time_spent_seconds = EXCLUDED.time_spent_seconds,
                       is_skipped = EXCLUDED.is_skipped,
                       score = EXCLUDED.score,
                       max_score = EXCLUDED.max_score"
                ),
                &[
                    &answer.session_id().inner(),
                    &answer.question_id().inner(),
                    &payload_json,
                    &answer.answered_at(),
                    &(answer.time_spent_seconds() as i32),
                    &answer.is_skipped(),
                    &answer.score(),
                    &answer.max_score(),
                ],
            )
            .await
            .map_err(AssessmentError::from)
        })
        .await?;
        Ok(())
    }
}

fn row_to_rate_limit(row: &Row) -> RateLimitRecord {
    RateLimitRecord::restore(
        row.get::<_, String>(0),
        row.get::<_, i32>(1) as u32,
        row.get(2),
        row.get(3),
        row.get::<_, i32>(4) as u32,
    )
}

#[async_trait]
impl RateLimitRepository for Arc<Client> {
    async fn get(&self, ip: &str) -> Result<Option<RateLimitRecord>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT ip, count, window_started_at, blocked_until, version FROM ",
                    RATE_LIMITS,
                    " WHERE ip = $1"
                ),
                &[&ip],
            )
            .await?;
        Ok(row.as_ref().map(row_to_rate_limit))
    }

    /// Optimistic CAS in one statement: the `ON CONFLICT ... WHERE` clause
    /// only applies the update (and only bumps `version`) if the stored row
    /// is still at `record.version()`; otherwise zero rows are affected and
    /// the caller sees `Conflict`, matching `SessionRepository::update`'s
    /// `WHERE id = $.. AND version = $..` guard.
    async fn upsert(&self, record: &RateLimitRecord) -> Result<(), AssessmentError> {
        let rows = self
            .execute(
                const_format::concatcp!(
                    "INSERT INTO ",
                    RATE_LIMITS,
                    " (ip, count, window_started_at, blocked_until, version) VALUES ($1,$2,$3,$4,$5 + 1)
                     ON CONFLICT (ip) DO UPDATE SET
                       count = EXCLUDED.count,
                       window_started_at = EXCLUDED.window_started_at,
                       blocked_until = EXCLUDED.blocked_until,
                       version = ",
                    RATE_LIMITS,
                    ".version + 1
                     WHERE ",
                    RATE_LIMITS,
                    ".version = $5"
                ),
                &[&record.ip(), &(record.count() as i32), &record.window_started_at(), &record.blocked_until(), &(record.version() as i32)],
            )
            .await?;
        if rows == 0 {
            return Err(AssessmentError::conflict("rate limit record version mismatch"));
        }
        Ok(())
    }
}
