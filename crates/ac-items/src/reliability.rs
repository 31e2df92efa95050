use crate::BigFiveTrait;
use crate::Competency;
use ac_core::ID;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// Reliability band shared by [`CompetencyReliability`] and
/// [`BigFiveReliability`] (spec §3, §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReliabilityStatus {
    Reliable,
    Acceptable,
    Unreliable,
    InsufficientData,
}

impl ReliabilityStatus {
    /// Spec §4.H: α≥0.70 Reliable, 0.60-0.70 Acceptable, <0.60 Unreliable;
    /// insufficient sample is reported separately by the caller.
    pub fn from_alpha(alpha: f64, sample_size: u32, min_sample: u32) -> Self {
        if sample_size < min_sample {
            return Self::InsufficientData;
        }
        if alpha >= 0.70 {
            Self::Reliable
        } else if alpha >= 0.60 {
            Self::Acceptable
        } else {
            Self::Unreliable
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reliable => "Reliable",
            Self::Acceptable => "Acceptable",
            Self::Unreliable => "Unreliable",
            Self::InsufficientData => "InsufficientData",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Reliable" => Self::Reliable,
            "Acceptable" => Self::Acceptable,
            "Unreliable" => Self::Unreliable,
            "InsufficientData" => Self::InsufficientData,
            _ => return None,
        })
    }
}

/// Cronbach's α for a competency's active items, 1:1 (spec §3
/// `CompetencyReliability`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyReliability {
    competency_id: ID<Competency>,
    alpha: f64,
    sample_size: u32,
    item_count: u32,
    status: ReliabilityStatus,
    alpha_if_deleted: BTreeMap<String, f64>,
}

impl CompetencyReliability {
    pub fn new(
        competency_id: ID<Competency>,
        alpha: f64,
        sample_size: u32,
        item_count: u32,
        min_sample: u32,
        alpha_if_deleted: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            competency_id,
            alpha,
            sample_size,
            item_count,
            status: ReliabilityStatus::from_alpha(alpha, sample_size, min_sample),
            alpha_if_deleted,
        }
    }
    pub fn competency_id(&self) -> ID<Competency> {
        self.competency_id
    }
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
    pub fn sample_size(&self) -> u32 {
        self.sample_size
    }
    pub fn item_count(&self) -> u32 {
        self.item_count
    }
    pub fn status(&self) -> ReliabilityStatus {
        self.status
    }
    pub fn alpha_if_deleted(&self) -> &BTreeMap<String, f64> {
        &self.alpha_if_deleted
    }
    /// Pins an already-persisted status verbatim instead of recomputing it
    /// from `min_sample`, which is a config threshold and may have moved
    /// since the row was written. Repository-layer use only.
    pub(crate) fn with_status(mut self, status: ReliabilityStatus) -> Self {
        self.status = status;
        self
    }
}

/// Cronbach's α for one Big Five trait, aggregated over its contributing
/// competencies' items (spec §3 `BigFiveReliability`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigFiveReliability {
    trait_: BigFiveTrait,
    alpha: f64,
    sample_size: u32,
    item_count: u32,
    status: ReliabilityStatus,
}

impl BigFiveReliability {
    pub fn new(
        trait_: BigFiveTrait,
        alpha: f64,
        sample_size: u32,
        item_count: u32,
        min_sample: u32,
    ) -> Self {
        Self {
            trait_,
            alpha,
            sample_size,
            item_count,
            status: ReliabilityStatus::from_alpha(alpha, sample_size, min_sample),
        }
    }
    pub fn trait_(&self) -> BigFiveTrait {
        self.trait_
    }
    pub fn status(&self) -> ReliabilityStatus {
        self.status
    }
    pub(crate) fn with_status(mut self, status: ReliabilityStatus) -> Self {
        self.status = status;
        self
    }
}

/// Spec §3: all five Big Five traits must be `Reliable` for templates
/// requesting Big-Five output to be publishable.
pub fn all_traits_reliable(reliabilities: &[BigFiveReliability]) -> bool {
    BigFiveTrait::all().iter().all(|t| {
        reliabilities
            .iter()
            .find(|r| r.trait_() == *t)
            .is_some_and(|r| r.status() == ReliabilityStatus::Reliable)
    })
}

mod pg_schema {
    use super::*;
    use ac_pg::BIG_FIVE_RELIABILITY;
    use ac_pg::COMPETENCY_RELIABILITY;
    use ac_pg::Schema;

    impl Schema for CompetencyReliability {
        fn name() -> &'static str {
            COMPETENCY_RELIABILITY
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                COMPETENCY_RELIABILITY,
                " (
                    competency_id    UUID PRIMARY KEY,
                    alpha            DOUBLE PRECISION NOT NULL,
                    sample_size      INTEGER NOT NULL,
                    item_count       INTEGER NOT NULL,
                    status           VARCHAR(32) NOT NULL,
                    alpha_if_deleted JSONB NOT NULL DEFAULT '{}'
                );"
            )
        }
        fn indices() -> &'static str {
            ""
        }
    }

    impl Schema for BigFiveReliability {
        fn name() -> &'static str {
            BIG_FIVE_RELIABILITY
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                BIG_FIVE_RELIABILITY,
                " (
                    trait_name  VARCHAR(32) PRIMARY KEY,
                    alpha       DOUBLE PRECISION NOT NULL,
                    sample_size INTEGER NOT NULL,
                    item_count  INTEGER NOT NULL,
                    status      VARCHAR(32) NOT NULL
                );"
            )
        }
        fn indices() -> &'static str {
            ""
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reliability(t: BigFiveTrait, status: ReliabilityStatus) -> BigFiveReliability {
        let alpha = match status {
            ReliabilityStatus::Reliable => 0.8,
            ReliabilityStatus::Acceptable => 0.65,
            ReliabilityStatus::Unreliable => 0.4,
            ReliabilityStatus::InsufficientData => 0.8,
        };
        let sample = if status == ReliabilityStatus::InsufficientData {
            5
        } else {
            200
        };
        BigFiveReliability::new(t, alpha, sample, 10, 50)
    }

    #[test]
    fn all_reliable_requires_every_trait() {
        let all: Vec<_> = BigFiveTrait::all()
            .iter()
            .map(|t| reliability(*t, ReliabilityStatus::Reliable))
            .collect();
        assert!(all_traits_reliable(&all));
    }

    #[test]
    fn one_unreliable_trait_suppresses_output() {
        let mut all: Vec<_> = BigFiveTrait::all()
            .iter()
            .map(|t| reliability(*t, ReliabilityStatus::Reliable))
            .collect();
        all[0] = reliability(BigFiveTrait::Openness, ReliabilityStatus::Unreliable);
        assert!(!all_traits_reliable(&all));
    }

    #[test]
    fn missing_trait_suppresses_output() {
        let all: Vec<_> = BigFiveTrait::all()
            .iter()
            .skip(1)
            .map(|t| reliability(*t, ReliabilityStatus::Reliable))
            .collect();
        assert!(!all_traits_reliable(&all));
    }

    #[test]
    fn insufficient_sample_overrides_alpha() {
        let r = reliability(BigFiveTrait::Openness, ReliabilityStatus::InsufficientData);
        assert_eq!(r.status(), ReliabilityStatus::InsufficientData);
    }
}
