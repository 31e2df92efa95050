use crate::TestSession;
use ac_core::ID;
use ac_items::AssessmentQuestion;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// One submitted response, keyed uniquely by `(session_id, question_id)`
/// (spec §3 `TestAnswer`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAnswer {
    session_id: ID<TestSession>,
    question_id: ID<AssessmentQuestion>,
    payload: Option<AnswerPayload>,
    answered_at: DateTime<Utc>,
    time_spent_seconds: u32,
    is_skipped: bool,
    /// Filled in by the scoring orchestrator, not at submission time — the
    /// session engine has no access to item rubrics, only to the question
    /// id the answer targets.
    score: Option<f64>,
    max_score: Option<f64>,
}

impl TestAnswer {
    pub fn new(
        session_id: ID<TestSession>,
        question_id: ID<AssessmentQuestion>,
        payload: AnswerPayload,
        answered_at: DateTime<Utc>,
        time_spent_seconds: u32,
    ) -> Self {
        Self {
            session_id,
            question_id,
            payload: Some(payload),
            answered_at,
            time_spent_seconds,
            is_skipped: false,
            score: None,
            max_score: None,
        }
    }

    pub fn skipped(
        session_id: ID<TestSession>,
        question_id: ID<AssessmentQuestion>,
        answered_at: DateTime<Utc>,
        time_spent_seconds: u32,
    ) -> Self {
        Self {
            session_id,
            question_id,
            payload: None,
            answered_at,
            time_spent_seconds,
            is_skipped: true,
            score: None,
            max_score: None,
        }
    }

    pub fn session_id(&self) -> ID<TestSession> {
        self.session_id
    }
    pub fn question_id(&self) -> ID<AssessmentQuestion> {
        self.question_id
    }
    pub fn payload(&self) -> Option<&AnswerPayload> {
        self.payload.as_ref()
    }
    pub fn answered_at(&self) -> DateTime<Utc> {
        self.answered_at
    }
    pub fn time_spent_seconds(&self) -> u32 {
        self.time_spent_seconds
    }
    pub fn is_skipped(&self) -> bool {
        self.is_skipped
    }
    pub fn score(&self) -> Option<f64> {
        self.score
    }
    pub fn max_score(&self) -> Option<f64> {
        self.max_score
    }

    pub fn set_score(&mut self, score: f64, max_score: f64) {
        self.score = Some(score);
        self.max_score = Some(max_score);
    }

    /// Spec §8 property 2: resubmitting the same payload is a no-op; a
    /// different payload replaces it (the caller is responsible for
    /// checking the session is still mutable before calling this).
    pub fn replace_payload(&mut self, payload: AnswerPayload, answered_at: DateTime<Utc>, time_spent_seconds: u32) {
        self.payload = Some(payload);
        self.is_skipped = false;
        self.answered_at = answered_at;
        self.time_spent_seconds = time_spent_seconds;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnswerPayload {
    Likert(u8),
    SelectedOptions(Vec<String>),
    Ranking(Vec<String>),
    FreeText(String),
}

impl AnswerPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Likert(_) => "Likert",
            Self::SelectedOptions(_) => "SelectedOptions",
            Self::Ranking(_) => "Ranking",
            Self::FreeText(_) => "FreeText",
        }
    }
}

pub(crate) mod pg_schema {
    use super::*;
    use ac_pg::ANSWERS;
    use ac_pg::Schema;

    impl Schema for TestAnswer {
        fn name() -> &'static str {
            ANSWERS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                ANSWERS,
                " (
                    session_id          UUID NOT NULL,
                    question_id         UUID NOT NULL,
                    payload             JSONB,
                    answered_at         TIMESTAMPTZ NOT NULL,
                    time_spent_seconds  INTEGER NOT NULL,
                    is_skipped          BOOLEAN NOT NULL DEFAULT FALSE,
                    score               DOUBLE PRECISION,
                    max_score           DOUBLE PRECISION,
                    PRIMARY KEY (session_id, question_id)
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE INDEX IF NOT EXISTS idx_answers_session ON ",
                ANSWERS,
                " (session_id);"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacing_a_payload_clears_skipped() {
        let mut answer = TestAnswer::skipped(ID::default(), ID::default(), DateTime::UNIX_EPOCH, 0);
        assert!(answer.is_skipped());
        answer.replace_payload(AnswerPayload::Likert(5), DateTime::UNIX_EPOCH, 12);
        assert!(!answer.is_skipped());
        assert_eq!(answer.payload(), Some(&AnswerPayload::Likert(5)));
    }
}
