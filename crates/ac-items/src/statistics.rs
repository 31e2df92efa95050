use crate::AssessmentQuestion;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Per-item psychometric statistics, 1:1 with [`AssessmentQuestion`] (spec §3
/// `ItemStatistics`). Written exclusively by the psychometric job
/// (`ac-psychometrics`) under its named distributed lock (spec §5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStatistics {
    item_id: ID<AssessmentQuestion>,
    p_value: f64,
    discrimination: f64,
    previous_discrimination: Option<f64>,
    irt: Option<IrtFit>,
    response_count: u32,
    validity_status: ValidityStatus,
    difficulty_flag: DifficultyFlag,
    discrimination_flag: DiscriminationFlag,
    history: Vec<StatusChange>,
}

impl ItemStatistics {
    pub fn new(item_id: ID<AssessmentQuestion>) -> Self {
        Self {
            item_id,
            p_value: 0.0,
            discrimination: 0.0,
            previous_discrimination: None,
            irt: None,
            response_count: 0,
            validity_status: ValidityStatus::Probation,
            difficulty_flag: DifficultyFlag::None,
            discrimination_flag: DiscriminationFlag::None,
            history: Vec::new(),
        }
    }

    pub fn item_id(&self) -> ID<AssessmentQuestion> {
        self.item_id
    }
    pub fn p_value(&self) -> f64 {
        self.p_value
    }
    pub fn discrimination(&self) -> f64 {
        self.discrimination
    }
    pub fn previous_discrimination(&self) -> Option<f64> {
        self.previous_discrimination
    }
    pub fn irt(&self) -> Option<&IrtFit> {
        self.irt.as_ref()
    }
    pub fn response_count(&self) -> u32 {
        self.response_count
    }
    pub fn validity_status(&self) -> ValidityStatus {
        self.validity_status
    }
    pub fn difficulty_flag(&self) -> DifficultyFlag {
        self.difficulty_flag
    }
    pub fn discrimination_flag(&self) -> DiscriminationFlag {
        self.discrimination_flag
    }
    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    /// Spec §4.B freshness rule: `FlaggedForReview` is excluded from *new*
    /// assembly, `Retired` is excluded globally.
    pub fn is_eligible_for_new_assembly(&self) -> bool {
        matches!(
            self.validity_status,
            ValidityStatus::Active | ValidityStatus::Probation
        )
    }

    /// Open Question (b) resolution (DESIGN.md): a `FlaggedForReview` item
    /// remains eligible for continuation of an already-started session.
    pub fn is_eligible_for_continuation(&self) -> bool {
        self.validity_status != ValidityStatus::Retired
    }

    /// Updates `p_value`/`discrimination`/IRT fit and recomputes flags with
    /// hysteresis bands (spec §4.H). Does not itself decide status
    /// transitions — callers (the psychometric job) call
    /// [`Self::transition`] separately so the transition reason is explicit.
    pub fn record_metrics(
        &mut self,
        p_value: f64,
        discrimination: f64,
        irt: Option<IrtFit>,
        response_count: u32,
    ) -> Result<(), AssessmentError> {
        if !(0.0..=1.0).contains(&p_value) {
            return Err(AssessmentError::invalid_argument("p_value out of [0,1]"));
        }
        if !(-1.0..=1.0).contains(&discrimination) {
            return Err(AssessmentError::invalid_argument(
                "discrimination out of [-1,1]",
            ));
        }
        self.previous_discrimination = Some(self.discrimination);
        self.p_value = p_value;
        self.discrimination = discrimination;
        self.irt = irt;
        self.response_count = response_count;
        self.difficulty_flag = DifficultyFlag::from_p_value(p_value);
        self.discrimination_flag = DiscriminationFlag::from_discrimination(discrimination);
        Ok(())
    }

    /// Rehydrates persisted status/flag/history state after
    /// [`Self::record_metrics`] has set the numeric fields. Used only by the
    /// repository layer when reading a row back; never call this to drive a
    /// transition, use [`Self::transition`] for that.
    pub(crate) fn restore(
        &mut self,
        validity_status: ValidityStatus,
        difficulty_flag: DifficultyFlag,
        discrimination_flag: DiscriminationFlag,
        previous_discrimination: Option<f64>,
        history: Vec<StatusChange>,
    ) {
        self.validity_status = validity_status;
        self.difficulty_flag = difficulty_flag;
        self.discrimination_flag = discrimination_flag;
        self.previous_discrimination = previous_discrimination;
        self.history = history;
    }

    /// Appends a status transition (spec §3 invariant: history is
    /// append-only; retired items never leave `Retired`).
    pub fn transition(
        &mut self,
        to: ValidityStatus,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), AssessmentError> {
        if self.validity_status == ValidityStatus::Retired {
            return Err(AssessmentError::invalid_state(
                "retired items never leave Retired",
            ));
        }
        let from = self.validity_status;
        self.history.push(StatusChange {
            from,
            to,
            at,
            reason: reason.into(),
        });
        self.validity_status = to;
        Ok(())
    }
}

impl Unique for ItemStatistics {
    fn id(&self) -> ID<AssessmentQuestion> {
        self.item_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrtFit {
    pub a: f64,
    pub b: f64,
    pub c: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidityStatus {
    Probation,
    Active,
    FlaggedForReview,
    Retired,
}

impl ValidityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Probation => "Probation",
            Self::Active => "Active",
            Self::FlaggedForReview => "FlaggedForReview",
            Self::Retired => "Retired",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Probation" => Self::Probation,
            "Active" => Self::Active,
            "FlaggedForReview" => Self::FlaggedForReview,
            "Retired" => Self::Retired,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifficultyFlag {
    None,
    TooEasy,
    TooHard,
}

impl DifficultyFlag {
    /// Spec §4.H: `p>0.90` -> TooEasy; `p<0.20` -> TooHard; else None.
    pub fn from_p_value(p: f64) -> Self {
        if p > 0.90 {
            Self::TooEasy
        } else if p < 0.20 {
            Self::TooHard
        } else {
            Self::None
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::TooEasy => "TooEasy",
            Self::TooHard => "TooHard",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "None" => Self::None,
            "TooEasy" => Self::TooEasy,
            "TooHard" => Self::TooHard,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscriminationFlag {
    None,
    Warning,
    Critical,
    Negative,
}

impl DiscriminationFlag {
    /// Spec §4.H: `disc<0` -> Negative; `[0,0.10)` -> Critical;
    /// `[0.10,0.25)` -> Warning; else None.
    pub fn from_discrimination(disc: f64) -> Self {
        if disc < 0.0 {
            Self::Negative
        } else if disc < 0.10 {
            Self::Critical
        } else if disc < 0.25 {
            Self::Warning
        } else {
            Self::None
        }
    }
    pub fn is_persistently_bad(&self) -> bool {
        matches!(self, Self::Critical | Self::Negative)
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
            Self::Negative => "Negative",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "None" => Self::None,
            "Warning" => Self::Warning,
            "Critical" => Self::Critical,
            "Negative" => Self::Negative,
            _ => return None,
        })
    }
}

/// One append-only entry in an item's status history (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ValidityStatus,
    pub to: ValidityStatus,
    pub at: DateTime<Utc>,
    pub reason: String,
}

mod pg_schema {
    use ac_pg::ITEM_STATISTICS;
    use ac_pg::Schema;

    use super::ItemStatistics;

    impl Schema for ItemStatistics {
        fn name() -> &'static str {
            ITEM_STATISTICS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                ITEM_STATISTICS,
                " (
                    item_id                  UUID PRIMARY KEY,
                    p_value                  DOUBLE PRECISION NOT NULL DEFAULT 0,
                    discrimination            DOUBLE PRECISION NOT NULL DEFAULT 0,
                    previous_discrimination   DOUBLE PRECISION,
                    irt_a                    DOUBLE PRECISION,
                    irt_b                    DOUBLE PRECISION,
                    irt_c                    DOUBLE PRECISION,
                    response_count           INTEGER NOT NULL DEFAULT 0,
                    validity_status          VARCHAR(32) NOT NULL DEFAULT 'Probation',
                    difficulty_flag          VARCHAR(16) NOT NULL DEFAULT 'None',
                    discrimination_flag      VARCHAR(16) NOT NULL DEFAULT 'None',
                    status_change_history    JSONB NOT NULL DEFAULT '[]'
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE INDEX IF NOT EXISTS idx_item_stats_status ON ",
                ITEM_STATISTICS,
                " (validity_status);"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_p_value() {
        let mut stats = ItemStatistics::new(ID::default());
        let err = stats.record_metrics(1.5, 0.2, None, 100).unwrap_err();
        assert_eq!(err.status_hint(), 400);
    }

    #[test]
    fn rejects_out_of_range_discrimination() {
        let mut stats = ItemStatistics::new(ID::default());
        let err = stats.record_metrics(0.5, -1.5, None, 100).unwrap_err();
        assert_eq!(err.status_hint(), 400);
    }

    #[test]
    fn difficulty_flag_hysteresis_bands() {
        assert_eq!(DifficultyFlag::from_p_value(0.95), DifficultyFlag::TooEasy);
        assert_eq!(DifficultyFlag::from_p_value(0.10), DifficultyFlag::TooHard);
        assert_eq!(DifficultyFlag::from_p_value(0.5), DifficultyFlag::None);
    }

    #[test]
    fn discrimination_flag_bands() {
        assert_eq!(
            DiscriminationFlag::from_discrimination(-0.1),
            DiscriminationFlag::Negative
        );
        assert_eq!(
            DiscriminationFlag::from_discrimination(0.05),
            DiscriminationFlag::Critical
        );
        assert_eq!(
            DiscriminationFlag::from_discrimination(0.15),
            DiscriminationFlag::Warning
        );
        assert_eq!(
            DiscriminationFlag::from_discrimination(0.5),
            DiscriminationFlag::None
        );
    }

    #[test]
    fn retired_is_irreversible() {
        let mut stats = ItemStatistics::new(ID::default());
        stats
            .transition(ValidityStatus::Active, "enough responses", Utc::now())
            .unwrap();
        stats
            .transition(ValidityStatus::Retired, "chronically negative", Utc::now())
            .unwrap();
        let err = stats
            .transition(ValidityStatus::Active, "oops", Utc::now())
            .unwrap_err();
        assert_eq!(err.status_hint(), 400);
        assert_eq!(stats.validity_status(), ValidityStatus::Retired);
    }

    #[test]
    fn history_is_append_only() {
        let mut stats = ItemStatistics::new(ID::default());
        stats
            .transition(ValidityStatus::Active, "first", Utc::now())
            .unwrap();
        stats
            .transition(ValidityStatus::FlaggedForReview, "second", Utc::now())
            .unwrap();
        assert_eq!(stats.history().len(), 2);
        assert_eq!(stats.history()[0].to, ValidityStatus::Active);
        assert_eq!(stats.history()[1].to, ValidityStatus::FlaggedForReview);
    }

    #[test]
    fn flagged_for_review_is_eligible_for_continuation_not_new_assembly() {
        let mut stats = ItemStatistics::new(ID::default());
        stats
            .transition(ValidityStatus::FlaggedForReview, "critical discrimination", Utc::now())
            .unwrap();
        assert!(!stats.is_eligible_for_new_assembly());
        assert!(stats.is_eligible_for_continuation());
    }
}
