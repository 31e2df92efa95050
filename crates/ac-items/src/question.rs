use crate::BehavioralIndicator;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// A single item in the pool (spec §3 `AssessmentQuestion`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentQuestion {
    id: ID<AssessmentQuestion>,
    indicator_id: ID<BehavioralIndicator>,
    text: String,
    kind: QuestionType,
    options: Vec<AnswerOption>,
    rubric: ScoringRubric,
    difficulty_band: DifficultyBand,
    time_limit_seconds: u32,
    metadata: BTreeMap<String, serde_json::Value>,
    active: bool,
    exposure_count: u64,
}

impl AssessmentQuestion {
    pub fn new(
        id: ID<AssessmentQuestion>,
        indicator_id: ID<BehavioralIndicator>,
        text: String,
        kind: QuestionType,
        options: Vec<AnswerOption>,
        rubric: ScoringRubric,
        difficulty_band: DifficultyBand,
        time_limit_seconds: u32,
    ) -> Result<Self, AssessmentError> {
        let question = Self {
            id,
            indicator_id,
            text,
            kind,
            options,
            rubric,
            difficulty_band,
            time_limit_seconds,
            metadata: BTreeMap::new(),
            active: true,
            exposure_count: 0,
        };
        question.validate()?;
        Ok(question)
    }

    /// Spec §3 invariant: Likert carries a 1-7 response; MCQ/SJT have scored
    /// option maps; rubric is non-null for scored types.
    fn validate(&self) -> Result<(), AssessmentError> {
        match (self.kind, &self.rubric) {
            (QuestionType::Likert, ScoringRubric::Likert) => Ok(()),
            (QuestionType::MultipleChoice, ScoringRubric::OptionScores(_))
            | (QuestionType::SituationalJudgment, ScoringRubric::OptionScores(_)) => Ok(()),
            (QuestionType::Ranking, ScoringRubric::RankingKey(_)) => Ok(()),
            (QuestionType::FreeText, ScoringRubric::None) => Ok(()),
            _ => Err(AssessmentError::invalid_argument(format!(
                "question type {:?} requires a matching rubric",
                self.kind
            ))),
        }
    }

    pub fn indicator_id(&self) -> ID<BehavioralIndicator> {
        self.indicator_id
    }
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn kind(&self) -> QuestionType {
        self.kind
    }
    pub fn rubric(&self) -> &ScoringRubric {
        &self.rubric
    }
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }
    pub fn difficulty_band(&self) -> DifficultyBand {
        self.difficulty_band
    }
    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }
    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
    /// Retires an item from future selection without deleting its row
    /// (mirrors [`Competency::archive`][crate::Competency::archive]); existing
    /// sessions referencing it continue to score.
    pub fn deactivate(&mut self) {
        self.active = false;
    }
    pub fn exposure_count(&self) -> u64 {
        self.exposure_count
    }
    /// Monotone increment, mirrored by the repository's atomic SQL update
    /// (spec §3 invariant, §4.A "Atomic exposure increment").
    pub fn bump_exposure(&mut self) {
        self.exposure_count += 1;
    }
    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata
            .get("tags")
            .and_then(|v| v.as_array())
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(tag)))
    }
}

impl Unique for AssessmentQuestion {
    fn id(&self) -> ID<Self> {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    Likert,
    MultipleChoice,
    SituationalJudgment,
    Ranking,
    FreeText,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Likert => "Likert",
            Self::MultipleChoice => "MultipleChoice",
            Self::SituationalJudgment => "SituationalJudgment",
            Self::Ranking => "Ranking",
            Self::FreeText => "FreeText",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Likert" => Self::Likert,
            "MultipleChoice" => Self::MultipleChoice,
            "SituationalJudgment" => Self::SituationalJudgment,
            "Ranking" => Self::Ranking,
            "FreeText" => Self::FreeText,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DifficultyBand {
    Foundational,
    Intermediate,
    Advanced,
    Expert,
    Specialized,
}

impl DifficultyBand {
    /// The three bands an Overview/JobFit assembly plan spans (spec §4.C).
    pub fn core_three() -> [DifficultyBand; 3] {
        [Self::Foundational, Self::Intermediate, Self::Advanced]
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foundational => "Foundational",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
            Self::Expert => "Expert",
            Self::Specialized => "Specialized",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Foundational" => Self::Foundational,
            "Intermediate" => Self::Intermediate,
            "Advanced" => Self::Advanced,
            "Expert" => Self::Expert,
            "Specialized" => Self::Specialized,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
}

/// How a question's payload is converted into a normalized `[0,1]` score
/// (spec §4.G). Free text is unscored and excluded from aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoringRubric {
    /// 1-7 response, normalized as `(value - 1) / 6`.
    Likert,
    /// Option id -> normalized `[0,1]` score, for MCQ/SJT.
    OptionScores(BTreeMap<String, f64>),
    /// The ideal ordering of option ids; ranking responses score by rank
    /// correlation against this key.
    RankingKey(Vec<String>),
    /// Free text: never contributes a numeric score.
    None,
}

mod pg_schema {
    use super::*;
    use ac_pg::ITEMS;
    use ac_pg::Schema;

    impl Schema for AssessmentQuestion {
        fn name() -> &'static str {
            ITEMS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                ITEMS,
                " (
                    id              UUID PRIMARY KEY,
                    indicator_id    UUID NOT NULL,
                    text            TEXT NOT NULL,
                    kind            VARCHAR(32) NOT NULL,
                    options         JSONB NOT NULL DEFAULT '[]',
                    rubric          JSONB NOT NULL,
                    difficulty_band VARCHAR(32) NOT NULL,
                    time_limit_seconds INTEGER NOT NULL,
                    metadata        JSONB NOT NULL DEFAULT '{}',
                    active          BOOLEAN NOT NULL DEFAULT TRUE,
                    exposure_count  BIGINT NOT NULL DEFAULT 0
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE INDEX IF NOT EXISTS idx_items_indicator ON ",
                ITEMS,
                " (indicator_id, difficulty_band, active);
                 CREATE INDEX IF NOT EXISTS idx_items_metadata ON ",
                ITEMS,
                " USING GIN (metadata);"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn likert(id: ID<AssessmentQuestion>) -> AssessmentQuestion {
        AssessmentQuestion::new(
            id,
            ID::default(),
            "I enjoy working in teams".into(),
            QuestionType::Likert,
            vec![],
            ScoringRubric::Likert,
            DifficultyBand::Foundational,
            60,
        )
        .unwrap()
    }

    #[test]
    fn likert_rubric_mismatch_is_rejected() {
        let err = AssessmentQuestion::new(
            ID::default(),
            ID::default(),
            "text".into(),
            QuestionType::Likert,
            vec![],
            ScoringRubric::None,
            DifficultyBand::Foundational,
            60,
        )
        .unwrap_err();
        assert_eq!(err.status_hint(), 400);
    }

    #[test]
    fn free_text_is_unscored_rubric() {
        let q = AssessmentQuestion::new(
            ID::default(),
            ID::default(),
            "describe a conflict you resolved".into(),
            QuestionType::FreeText,
            vec![],
            ScoringRubric::None,
            DifficultyBand::Advanced,
            300,
        )
        .unwrap();
        assert!(matches!(q.rubric(), ScoringRubric::None));
    }

    #[test]
    fn bump_exposure_is_monotone() {
        let mut q = likert(ID::default());
        assert_eq!(q.exposure_count(), 0);
        q.bump_exposure();
        q.bump_exposure();
        assert_eq!(q.exposure_count(), 2);
    }

    #[test]
    fn has_tag_reads_metadata_array() {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "tags".to_string(),
            serde_json::json!(["leadership", "remote"]),
        );
        let q = likert(ID::default()).with_metadata(metadata);
        assert!(q.has_tag("remote"));
        assert!(!q.has_tag("finance"));
    }
}
