//! The canonical scored outcome of a session (spec §3 `TestResult`, §4.F).
use ac_blueprint::Goal;
use ac_blueprint::TestTemplate;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use ac_items::BigFiveTrait;
use ac_items::Competency;
use ac_session::TestSession;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use tokio_postgres::Client;

/// Per-competency breakdown shared by every goal strategy (spec §4.G: "all
/// strategies also return a `competency_scores` breakdown").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompetencyScoreBreakdown {
    pub score: f64,
    pub percentage: f64,
    pub questions_answered: u32,
    pub questions_correct_equivalent: f64,
}

/// Resolved per DESIGN.md Open Question (a): a result produced when an
/// external dependency (O*NET, team profile) stayed unavailable through its
/// bounded retries. `passed` is forced `false` regardless of the computed
/// percentage when this variant is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestResultStatus {
    Completed,
    Degraded,
}

impl TestResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Degraded => "Degraded",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Completed" => Self::Completed,
            "Degraded" => Self::Degraded,
            _ => return None,
        })
    }
}

/// The single canonical scoring outcome for a session (spec §4.F invariant
/// 1: at most one row per `session_id`, enforced by the repository's unique
/// constraint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    id: ID<TestResult>,
    session_id: ID<TestSession>,
    template_id: ID<TestTemplate>,
    goal: Goal,
    user_id: Option<String>,
    status: TestResultStatus,
    overall_score: f64,
    overall_percentage: f64,
    percentile: Option<f64>,
    passed: bool,
    competency_breakdown: BTreeMap<ID<Competency>, CompetencyScoreBreakdown>,
    big_five_profile: Option<BTreeMap<BigFiveTrait, f64>>,
    extended_metrics: serde_json::Value,
    answered_count: u32,
    skipped_count: u32,
    total_time_seconds: u32,
    completed_at: DateTime<Utc>,
}

impl TestResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: ID<TestSession>,
        template_id: ID<TestTemplate>,
        goal: Goal,
        user_id: Option<String>,
        status: TestResultStatus,
        overall_score: f64,
        overall_percentage: f64,
        passed: bool,
        competency_breakdown: BTreeMap<ID<Competency>, CompetencyScoreBreakdown>,
        big_five_profile: Option<BTreeMap<BigFiveTrait, f64>>,
        extended_metrics: serde_json::Value,
        answered_count: u32,
        skipped_count: u32,
        total_time_seconds: u32,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ID::default(),
            session_id,
            template_id,
            goal,
            user_id,
            status,
            overall_score,
            overall_percentage,
            percentile: None,
            // Spec §4.F / DESIGN.md Open Question (a): a Degraded result is
            // never reported as passed, regardless of the computed percentage.
            passed: passed && matches!(status, TestResultStatus::Completed),
            competency_breakdown,
            big_five_profile,
            extended_metrics,
            answered_count,
            skipped_count,
            total_time_seconds,
            completed_at,
        }
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = Some(percentile);
        self
    }

    pub fn session_id(&self) -> ID<TestSession> {
        self.session_id
    }
    pub fn template_id(&self) -> ID<TestTemplate> {
        self.template_id
    }
    pub fn goal(&self) -> Goal {
        self.goal
    }
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
    pub fn status(&self) -> TestResultStatus {
        self.status
    }
    pub fn overall_score(&self) -> f64 {
        self.overall_score
    }
    pub fn overall_percentage(&self) -> f64 {
        self.overall_percentage
    }
    pub fn percentile(&self) -> Option<f64> {
        self.percentile
    }
    pub fn passed(&self) -> bool {
        self.passed
    }
    pub fn competency_breakdown(&self) -> &BTreeMap<ID<Competency>, CompetencyScoreBreakdown> {
        &self.competency_breakdown
    }
    pub fn big_five_profile(&self) -> Option<&BTreeMap<BigFiveTrait, f64>> {
        self.big_five_profile.as_ref()
    }
    pub fn extended_metrics(&self) -> &serde_json::Value {
        &self.extended_metrics
    }
    pub fn answered_count(&self) -> u32 {
        self.answered_count
    }
    pub fn skipped_count(&self) -> u32 {
        self.skipped_count
    }
    pub fn total_time_seconds(&self) -> u32 {
        self.total_time_seconds
    }
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

impl ac_core::Unique for TestResult {
    fn id(&self) -> ID<Self> {
        self.id
    }
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    async fn get_by_session(&self, session_id: ID<TestSession>) -> Result<Option<TestResult>, AssessmentError>;

    /// Spec §4.F invariant 1: "re-entry returns the existing row" — this
    /// never overwrites an already-persisted result for the same session.
    async fn insert_if_absent(&self, result: TestResult) -> Result<TestResult, AssessmentError>;

    /// Prior `overall_percentage` values for the same template, used for the
    /// Overview strategy's percentile computation (spec §4.G).
    async fn overall_percentages_for_template(&self, template_id: ID<TestTemplate>) -> Result<Vec<f64>, AssessmentError>;
}

#[derive(Default)]
pub struct InMemoryResultRepository {
    results: RwLock<HashMap<uuid::Uuid, TestResult>>,
}

impl InMemoryResultRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultRepository for InMemoryResultRepository {
    async fn get_by_session(&self, session_id: ID<TestSession>) -> Result<Option<TestResult>, AssessmentError> {
        Ok(self.results.read().unwrap().get(&session_id.inner()).cloned())
    }

    async fn insert_if_absent(&self, result: TestResult) -> Result<TestResult, AssessmentError> {
        let mut guard = self.results.write().unwrap();
        if let Some(existing) = guard.get(&result.session_id().inner()) {
            return Ok(existing.clone());
        }
        guard.insert(result.session_id().inner(), result.clone());
        Ok(result)
    }

    async fn overall_percentages_for_template(&self, template_id: ID<TestTemplate>) -> Result<Vec<f64>, AssessmentError> {
        Ok(self
            .results
            .read()
            .unwrap()
            .values()
            .filter(|r| r.template_id() == template_id)
            .map(|r| r.overall_percentage())
            .collect())
    }
}

pub(crate) fn competency_breakdown_to_json(breakdown: &BTreeMap<ID<Competency>, CompetencyScoreBreakdown>) -> serde_json::Value {
    let map: BTreeMap<String, CompetencyScoreBreakdown> =
        breakdown.iter().map(|(id, b)| (id.inner().to_string(), *b)).collect();
    serde_json::to_value(map).unwrap_or_default()
}

fn competency_breakdown_from_json(value: serde_json::Value) -> Result<BTreeMap<ID<Competency>, CompetencyScoreBreakdown>, AssessmentError> {
    let raw: BTreeMap<String, CompetencyScoreBreakdown> =
        serde_json::from_value(value).map_err(|e| AssessmentError::internal(e.to_string()))?;
    raw.into_iter()
        .map(|(k, v)| {
            uuid::Uuid::parse_str(&k)
                .map(|u| (ID::from(u), v))
                .map_err(|e| AssessmentError::internal(format!("corrupt competency id: {e}")))
        })
        .collect()
}

fn big_five_to_json(profile: &Option<BTreeMap<BigFiveTrait, f64>>) -> Option<serde_json::Value> {
    profile.as_ref().map(|p| {
        let map: BTreeMap<String, f64> = p.iter().map(|(t, v)| (t.as_str().to_string(), *v)).collect();
        serde_json::to_value(map).unwrap_or_default()
    })
}

fn big_five_from_json(value: Option<serde_json::Value>) -> Result<Option<BTreeMap<BigFiveTrait, f64>>, AssessmentError> {
    value
        .map(|raw| -> Result<BTreeMap<BigFiveTrait, f64>, AssessmentError> {
            let map: BTreeMap<String, f64> = serde_json::from_value(raw).map_err(|e| AssessmentError::internal(e.to_string()))?;
            map.into_iter()
                .map(|(k, v)| {
                    BigFiveTrait::parse(&k)
                        .ok_or_else(|| AssessmentError::internal(format!("unrecognized trait {k}")))
                        .map(|t| (t, v))
                })
                .collect()
        })
        .transpose()
}

pub(crate) mod pg_schema {
    use super::*;
    use ac_pg::RESULTS;
    use ac_pg::Schema;

    impl Schema for TestResult {
        fn name() -> &'static str {
            RESULTS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                RESULTS,
                " (
                    id                     UUID PRIMARY KEY,
                    session_id             UUID NOT NULL,
                    template_id            UUID NOT NULL,
                    goal                   VARCHAR(16) NOT NULL,
                    user_id                VARCHAR(128),
                    status                 VARCHAR(16) NOT NULL,
                    overall_score          DOUBLE PRECISION NOT NULL,
                    overall_percentage     DOUBLE PRECISION NOT NULL,
                    percentile             DOUBLE PRECISION,
                    passed                 BOOLEAN NOT NULL,
                    competency_breakdown   JSONB NOT NULL DEFAULT '{}',
                    big_five_profile       JSONB,
                    extended_metrics       JSONB NOT NULL DEFAULT '{}',
                    answered_count         INTEGER NOT NULL,
                    skipped_count          INTEGER NOT NULL,
                    total_time_seconds     INTEGER NOT NULL,
                    completed_at           TIMESTAMPTZ NOT NULL
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_results_session ON ",
                RESULTS,
                " (session_id);
                 CREATE INDEX IF NOT EXISTS idx_results_template ON ",
                RESULTS,
                " (template_id);"
            )
        }
    }
}

fn row_to_result(row: &tokio_postgres::Row) -> Result<TestResult, AssessmentError> {
    let goal_raw: String = row.get(3);
    let status_raw: String = row.get(5);
    Ok(TestResult {
        id: ID::from(row.get::<_, uuid::Uuid>(0)),
        session_id: ID::from(row.get::<_, uuid::Uuid>(1)),
        template_id: ID::from(row.get::<_, uuid::Uuid>(2)),
        goal: Goal::parse(&goal_raw).unwrap_or(Goal::Overview),
        user_id: row.get(4),
        status: TestResultStatus::parse(&status_raw).unwrap_or(TestResultStatus::Completed),
        overall_score: row.get(6),
        overall_percentage: row.get(7),
        percentile: row.get(8),
        passed: row.get(9),
        competency_breakdown: competency_breakdown_from_json(row.get(10))?,
        big_five_profile: big_five_from_json(row.get(11))?,
        extended_metrics: row.get(12),
        answered_count: row.get::<_, i32>(13) as u32,
        skipped_count: row.get::<_, i32>(14) as u32,
        total_time_seconds: row.get::<_, i32>(15) as u32,
        completed_at: row.get(16),
    })
}

#[async_trait]
impl ResultRepository for Arc<Client> {
    async fn get_by_session(&self, session_id: ID<TestSession>) -> Result<Option<TestResult>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT id, session_id, template_id, goal, user_id, status, overall_score,
                            overall_percentage, percentile, passed, competency_breakdown,
                            big_five_profile, extended_metrics, answered_count, skipped_count,
                            total_time_seconds, completed_at FROM ",
                    ac_pg::RESULTS,
                    " WHERE session_id = $1"
                ),
                &[&session_id.inner()],
            )
            .await?;
        row.as_ref().map(row_to_result).transpose()
    }

    async fn insert_if_absent(&self, result: TestResult) -> Result<TestResult, AssessmentError> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                ac_pg::RESULTS,
                " (id, session_id, template_id, goal, user_id, status, overall_score, overall_percentage,
                   percentile, passed, competency_breakdown, big_five_profile, extended_metrics,
                   answered_count, skipped_count, total_time_seconds, completed_at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
                 ON CONFLICT (session_id) DO NOTHING"
            ),
            &[
                &result.id.inner(),
                &result.session_id().inner(),
                &result.template_id().inner(),
                &result.goal().as_str(),
                &result.user_id(),
                &result.status().as_str(),
                &result.overall_score(),
                &result.overall_percentage(),
                &result.percentile(),
                &result.passed(),
                &competency_breakdown_to_json(result.competency_breakdown()),
                &big_five_to_json(&result.big_five_profile),
                &result.extended_metrics(),
                &(result.answered_count() as i32),
                &(result.skipped_count() as i32),
                &(result.total_time_seconds() as i32),
                &result.completed_at(),
            ],
        )
        .await?;
        self.get_by_session(result.session_id())
            .await?
            .ok_or_else(|| AssessmentError::internal("result vanished immediately after insert"))
    }

    async fn overall_percentages_for_template(&self, template_id: ID<TestTemplate>) -> Result<Vec<f64>, AssessmentError> {
        let rows = self
            .query(
                const_format::concatcp!(
                    "SELECT overall_percentage FROM ",
                    ac_pg::RESULTS,
                    " WHERE template_id = $1"
                ),
                &[&template_id.inner()],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(session_id: ID<TestSession>, template_id: ID<TestTemplate>, percentage: f64) -> TestResult {
        TestResult::new(
            session_id,
            template_id,
            Goal::Overview,
            Some("clerk_1".into()),
            TestResultStatus::Completed,
            percentage / 100.0,
            percentage,
            percentage >= 70.0,
            BTreeMap::new(),
            None,
            serde_json::json!({}),
            10,
            2,
            900,
            DateTime::UNIX_EPOCH,
        )
    }

    #[tokio::test]
    async fn reentry_returns_the_existing_row_rather_than_overwriting() {
        let repo = InMemoryResultRepository::new();
        let session_id = ID::default();
        let template_id = ID::default();
        let first = repo.insert_if_absent(sample(session_id, template_id, 83.33)).await.unwrap();
        let second = repo.insert_if_absent(sample(session_id, template_id, 12.0)).await.unwrap();
        assert_eq!(first.overall_percentage(), second.overall_percentage());
        assert_eq!(second.overall_percentage(), 83.33);
    }

    #[tokio::test]
    async fn percentile_distribution_is_scoped_to_template() {
        let repo = InMemoryResultRepository::new();
        let template_a = ID::default();
        let template_b = ID::default();
        repo.insert_if_absent(sample(ID::default(), template_a, 50.0)).await.unwrap();
        repo.insert_if_absent(sample(ID::default(), template_a, 90.0)).await.unwrap();
        repo.insert_if_absent(sample(ID::default(), template_b, 10.0)).await.unwrap();
        let values = repo.overall_percentages_for_template(template_a).await.unwrap();
        assert_eq!(values.len(), 2);
    }
}
