use ac_blueprint::TestTemplate;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use ac_items::AssessmentQuestion;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// A user's progress through one assembled test (spec §3 `TestSession`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSession {
    id: ID<TestSession>,
    template_id: ID<TestTemplate>,
    template_version: u32,
    owner: SessionOwner,
    status: SessionStatus,
    current_question_index: u32,
    question_order: Vec<ID<AssessmentQuestion>>,
    time_limit_seconds: u32,
    last_activity_at: DateTime<Utc>,
    version: u32,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    /// Seed the Assembly Engine used to shuffle `question_order`; also
    /// drives `ac_assembly::shuffled_option_order` so a retake can
    /// reproduce the exact presentation without storing a second array.
    session_seed: u64,
    share_link_token: Option<String>,
    access_token_hash: Option<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    taker_info: Option<serde_json::Value>,
}

impl TestSession {
    /// The assembled order is immutable once a session exists (spec §8
    /// property 3), so there is no separate `NotStarted` constructor: the
    /// diagram's `NotStarted --start--> InProgress` transition happens
    /// entirely inside the caller that assembles `question_order` and then
    /// calls this constructor, never as two observable states.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        id: ID<TestSession>,
        template_id: ID<TestTemplate>,
        template_version: u32,
        owner: SessionOwner,
        question_order: Vec<ID<AssessmentQuestion>>,
        session_seed: u64,
        time_limit_seconds: u32,
        client_ip: Option<String>,
        user_agent: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            template_id,
            template_version,
            owner,
            status: SessionStatus::InProgress,
            current_question_index: 0,
            question_order,
            time_limit_seconds,
            last_activity_at: now,
            version: 0,
            started_at: now,
            completed_at: None,
            session_seed,
            share_link_token: None,
            access_token_hash: None,
            client_ip,
            user_agent,
            taker_info: None,
        }
    }

    pub fn with_share_link(mut self, token: String) -> Self {
        self.share_link_token = Some(token);
        self
    }
    pub fn with_access_token_hash(mut self, hash: String) -> Self {
        self.access_token_hash = Some(hash);
        self
    }

    pub fn template_id(&self) -> ID<TestTemplate> {
        self.template_id
    }
    pub fn template_version(&self) -> u32 {
        self.template_version
    }
    pub fn owner(&self) -> &SessionOwner {
        &self.owner
    }
    pub fn status(&self) -> SessionStatus {
        self.status
    }
    pub fn current_question_index(&self) -> u32 {
        self.current_question_index
    }
    pub fn question_order(&self) -> &[ID<AssessmentQuestion>] {
        &self.question_order
    }
    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }
    pub fn version(&self) -> u32 {
        self.version
    }
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
    pub fn session_seed(&self) -> u64 {
        self.session_seed
    }
    pub fn share_link_token(&self) -> Option<&str> {
        self.share_link_token.as_deref()
    }
    pub fn access_token_hash(&self) -> Option<&str> {
        self.access_token_hash.as_deref()
    }
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
    pub fn taker_info(&self) -> Option<&serde_json::Value> {
        self.taker_info.as_ref()
    }

    pub fn current_question_id(&self) -> Option<ID<AssessmentQuestion>> {
        self.question_order.get(self.current_question_index as usize).copied()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Abandoned | SessionStatus::TimedOut
        )
    }

    /// `time_limit_seconds - elapsed`, recomputed rather than decremented by
    /// a ticking counter (spec §4.E: "recomputed from
    /// started_at + time_limit - now"), so a late sweep never drifts.
    pub fn time_remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.time_limit_seconds as i64 - (now - self.started_at).num_seconds()
    }

    fn require_in_progress(&self) -> Result<(), AssessmentError> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(AssessmentError::invalid_state(format!(
                "session is {:?}, not InProgress",
                self.status
            )))
        }
    }

    /// Advances past the current question only after its answer has been
    /// persisted by the caller (spec §4.E: "current_question_index is
    /// advanced only after the answer is persisted").
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.require_in_progress()?;
        if (self.current_question_index as usize) < self.question_order.len() {
            self.current_question_index += 1;
        }
        self.last_activity_at = now;
        Ok(())
    }

    pub fn navigate_back(&mut self, allow_back_navigation: bool, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.require_in_progress()?;
        if !allow_back_navigation {
            return Err(AssessmentError::invalid_state("back navigation is disabled for this template"));
        }
        if self.current_question_index == 0 {
            return Err(AssessmentError::invalid_state("already at the first question"));
        }
        self.current_question_index -= 1;
        self.last_activity_at = now;
        Ok(())
    }

    pub fn attach_taker_info(&mut self, info: serde_json::Value) -> Result<(), AssessmentError> {
        if self.status != SessionStatus::Completed {
            return Err(AssessmentError::invalid_state("taker info may only be attached after completion"));
        }
        self.taker_info = Some(info);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.require_in_progress()?;
        self.status = SessionStatus::Completed;
        self.completed_at = Some(now);
        self.last_activity_at = now;
        Ok(())
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.require_in_progress()?;
        self.status = SessionStatus::Abandoned;
        self.completed_at = Some(now);
        self.last_activity_at = now;
        Ok(())
    }

    /// Only the sweep calls this: a session times out on its own schedule,
    /// never as a side effect of a user-initiated call.
    pub fn time_out(&mut self, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.require_in_progress()?;
        self.status = SessionStatus::TimedOut;
        self.completed_at = Some(now);
        self.last_activity_at = now;
        Ok(())
    }

    /// Bumps the optimistic version; called by the in-memory repository's
    /// compare-and-swap update. The Postgres repository does this in SQL
    /// (`version = version + 1`) instead.
    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Rehydrates fields the repository owns at read time; `start` always
    /// builds a fresh `InProgress` session, so reloading a persisted row
    /// overwrites status/index/version/completed_at with the stored values.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        &mut self,
        status: SessionStatus,
        current_question_index: u32,
        last_activity_at: DateTime<Utc>,
        version: u32,
        completed_at: Option<DateTime<Utc>>,
        taker_info: Option<serde_json::Value>,
    ) {
        self.status = status;
        self.current_question_index = current_question_index;
        self.last_activity_at = last_activity_at;
        self.version = version;
        self.completed_at = completed_at;
        self.taker_info = taker_info;
    }
}

impl Unique for TestSession {
    fn id(&self) -> ID<Self> {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
    TimedOut,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Abandoned => "Abandoned",
            Self::TimedOut => "TimedOut",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "NotStarted" => Self::NotStarted,
            "InProgress" => Self::InProgress,
            "Completed" => Self::Completed,
            "Abandoned" => Self::Abandoned,
            "TimedOut" => Self::TimedOut,
            _ => return None,
        })
    }
}

/// Who is taking the test (spec §3/§4.E: "`clerk_user_id` is nullable").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOwner {
    Member(String),
    Anonymous,
}

impl SessionOwner {
    pub fn clerk_user_id(&self) -> Option<&str> {
        match self {
            Self::Member(id) => Some(id),
            Self::Anonymous => None,
        }
    }
}

pub(crate) mod pg_schema {
    use super::*;
    use ac_pg::SESSIONS;
    use ac_pg::Schema;

    impl Schema for TestSession {
        fn name() -> &'static str {
            SESSIONS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                SESSIONS,
                " (
                    id                      UUID PRIMARY KEY,
                    template_id             UUID NOT NULL,
                    template_version        INTEGER NOT NULL,
                    clerk_user_id           VARCHAR(128),
                    status                  VARCHAR(16) NOT NULL,
                    current_question_index  INTEGER NOT NULL,
                    question_order          JSONB NOT NULL,
                    time_limit_seconds      INTEGER NOT NULL,
                    last_activity_at        TIMESTAMPTZ NOT NULL,
                    version                 INTEGER NOT NULL,
                    started_at              TIMESTAMPTZ NOT NULL,
                    completed_at            TIMESTAMPTZ,
                    session_seed            BIGINT NOT NULL,
                    share_link_token        VARCHAR(128),
                    access_token_hash       VARCHAR(64),
                    client_ip               VARCHAR(64),
                    user_agent              VARCHAR(256),
                    taker_info              JSONB
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE INDEX IF NOT EXISTS idx_sessions_status ON ",
                SESSIONS,
                " (status);
                 CREATE INDEX IF NOT EXISTS idx_sessions_clerk_user ON ",
                SESSIONS,
                " (clerk_user_id);
                 CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_access_token ON ",
                SESSIONS,
                " (access_token_hash) WHERE access_token_hash IS NOT NULL;"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TestSession {
        TestSession::start(
            ID::default(),
            ID::default(),
            1,
            SessionOwner::Member("clerk_1".into()),
            vec![ID::default(), ID::default()],
            7,
            1800,
            None,
            None,
            DateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn fresh_session_starts_in_progress_at_index_zero() {
        let s = session();
        assert_eq!(s.status(), SessionStatus::InProgress);
        assert_eq!(s.current_question_index(), 0);
    }

    #[test]
    fn advancing_past_the_last_question_holds_at_the_boundary() {
        let mut s = session();
        s.advance(DateTime::UNIX_EPOCH).unwrap();
        s.advance(DateTime::UNIX_EPOCH).unwrap();
        s.advance(DateTime::UNIX_EPOCH).unwrap();
        assert_eq!(s.current_question_index() as usize, s.question_order().len());
    }

    #[test]
    fn navigating_back_is_rejected_when_disabled() {
        let mut s = session();
        s.advance(DateTime::UNIX_EPOCH).unwrap();
        assert!(s.navigate_back(false, DateTime::UNIX_EPOCH).is_err());
        assert!(s.navigate_back(true, DateTime::UNIX_EPOCH).is_ok());
    }

    #[test]
    fn terminal_session_rejects_further_mutation() {
        let mut s = session();
        s.complete(DateTime::UNIX_EPOCH).unwrap();
        assert!(s.is_terminal());
        assert!(s.advance(DateTime::UNIX_EPOCH).is_err());
        assert!(s.complete(DateTime::UNIX_EPOCH).is_err());
    }

    #[test]
    fn time_remaining_counts_down_from_the_limit() {
        let s = session();
        assert_eq!(s.time_remaining_seconds(DateTime::UNIX_EPOCH + chrono::Duration::seconds(100)), 1700);
    }
}
