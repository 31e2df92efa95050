use ac_core::Unique;
use ac_core::ID;
use serde::Deserialize;
use serde::Serialize;

/// A named skill category an assessment measures (spec §3 `Competency`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competency {
    id: ID<Competency>,
    name: String,
    active: bool,
    big_five_trait: Option<BigFiveTrait>,
}

impl Competency {
    pub fn new(id: ID<Competency>, name: String, big_five_trait: Option<BigFiveTrait>) -> Self {
        Self {
            id,
            name,
            active: true,
            big_five_trait,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn big_five_trait(&self) -> Option<BigFiveTrait> {
        self.big_five_trait
    }
    /// Archives the competency. Archival cascades to "not selectable for new
    /// assembly" (`ac-selector` filters on `is_active`) but existing sessions
    /// referencing this competency must continue to score (spec §3 invariant) —
    /// archival never deletes the row, and `ac-scoring` never checks `active`.
    pub fn archive(&mut self) {
        self.active = false;
    }
}

impl Unique for Competency {
    fn id(&self) -> ID<Self> {
        self.id
    }
}

/// One of the Big Five personality traits a competency may project onto
/// (spec §3 `Competency`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BigFiveTrait {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    EmotionalStability,
}

impl BigFiveTrait {
    pub fn all() -> [BigFiveTrait; 5] {
        [
            Self::Openness,
            Self::Conscientiousness,
            Self::Extraversion,
            Self::Agreeableness,
            Self::EmotionalStability,
        ]
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openness => "Openness",
            Self::Conscientiousness => "Conscientiousness",
            Self::Extraversion => "Extraversion",
            Self::Agreeableness => "Agreeableness",
            Self::EmotionalStability => "EmotionalStability",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Openness" => Self::Openness,
            "Conscientiousness" => Self::Conscientiousness,
            "Extraversion" => Self::Extraversion,
            "Agreeableness" => Self::Agreeableness,
            "EmotionalStability" => Self::EmotionalStability,
            _ => return None,
        })
    }
}

mod pg_schema {
    use super::*;
    use ac_pg::COMPETENCIES;
    use ac_pg::Schema;

    impl Schema for Competency {
        fn name() -> &'static str {
            COMPETENCIES
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                COMPETENCIES,
                " (
                    id             UUID PRIMARY KEY,
                    name           VARCHAR(128) NOT NULL,
                    active         BOOLEAN NOT NULL DEFAULT TRUE,
                    big_five_trait VARCHAR(32)
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE INDEX IF NOT EXISTS idx_competencies_active ON ",
                COMPETENCIES,
                " (active);"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_flips_active_flag() {
        let mut competency = Competency::new(ID::default(), "Leadership".into(), None);
        assert!(competency.is_active());
        competency.archive();
        assert!(!competency.is_active());
    }

    #[test]
    fn all_returns_five_distinct_traits() {
        let traits = BigFiveTrait::all();
        assert_eq!(traits.len(), 5);
        let unique: std::collections::HashSet<_> = traits.iter().collect();
        assert_eq!(unique.len(), 5);
    }
}
