use crate::Competency;
use ac_core::Unique;
use ac_core::ID;
use serde::Deserialize;
use serde::Serialize;

/// A behavioral indicator belonging to exactly one competency (spec §3
/// `BehavioralIndicator`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralIndicator {
    id: ID<BehavioralIndicator>,
    competency_id: ID<Competency>,
    name: String,
    context_scope: ContextScope,
}

impl BehavioralIndicator {
    pub fn new(
        id: ID<BehavioralIndicator>,
        competency_id: ID<Competency>,
        name: String,
        context_scope: ContextScope,
    ) -> Self {
        Self {
            id,
            competency_id,
            name,
            context_scope,
        }
    }
    pub fn competency_id(&self) -> ID<Competency> {
        self.competency_id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn context_scope(&self) -> ContextScope {
        self.context_scope
    }
}

impl Unique for BehavioralIndicator {
    fn id(&self) -> ID<Self> {
        self.id
    }
}

/// The situational context an item's wording targets (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextScope {
    Universal,
    Professional,
    Technical,
    Managerial,
}

impl ContextScope {
    /// Item selector context-match rule (spec §4.B #5): prefer an exact
    /// scope match, fall back to `Universal`.
    pub fn matches_or_universal(&self, template_scope: ContextScope) -> bool {
        *self == template_scope || *self == ContextScope::Universal
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Universal => "Universal",
            Self::Professional => "Professional",
            Self::Technical => "Technical",
            Self::Managerial => "Managerial",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Universal" => Self::Universal,
            "Professional" => Self::Professional,
            "Technical" => Self::Technical,
            "Managerial" => Self::Managerial,
            _ => return None,
        })
    }
}

mod pg_schema {
    use super::*;
    use ac_pg::INDICATORS;
    use ac_pg::Schema;

    impl Schema for BehavioralIndicator {
        fn name() -> &'static str {
            INDICATORS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                INDICATORS,
                " (
                    id            UUID PRIMARY KEY,
                    competency_id UUID NOT NULL,
                    name          VARCHAR(128) NOT NULL,
                    context_scope VARCHAR(32) NOT NULL
                );"
            )
        }
        fn indices() -> &'static str {
            const_format::concatcp!(
                "CREATE INDEX IF NOT EXISTS idx_indicators_competency ON ",
                INDICATORS,
                " (competency_id);"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_matches_any_template_scope() {
        assert!(ContextScope::Universal.matches_or_universal(ContextScope::Managerial));
    }

    #[test]
    fn mismatched_non_universal_scope_fails() {
        assert!(!ContextScope::Technical.matches_or_universal(ContextScope::Managerial));
    }

    #[test]
    fn exact_scope_match_succeeds() {
        assert!(ContextScope::Managerial.matches_or_universal(ContextScope::Managerial));
    }
}
