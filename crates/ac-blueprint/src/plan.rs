use ac_items::Competency;
use ac_items::DifficultyBand;
use ac_core::ID;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// One competency's place in an [`AssemblyPlan`], carrying the ordering bias
/// the resolver computed for it (spec §4.C Team-Fit: "biased toward
/// competencies with lowest saturation").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedCompetency {
    pub competency_id: ID<Competency>,
    pub weight: f64,
}

/// The concrete, goal-resolved shape of a session's question order, produced
/// by the [`crate::BlueprintResolver`] from a [`crate::TestTemplate`] plus
/// runtime context (spec §4.C `AssemblyPlan`). `competencies` is already
/// ordered by descending `weight` — the Assembly Engine consumes this order
/// directly rather than re-sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyPlan {
    pub competencies: Vec<PlannedCompetency>,
    pub bands: Vec<DifficultyBand>,
    pub include_big_five: bool,
    /// Competencies the blueprint resolver chose to skip via delta testing,
    /// paired with the passport-stored score the scorer should reuse
    /// instead of live-testing them (spec §4.C JobFit delta-skip).
    pub imported_from_passport: BTreeMap<ID<Competency>, f64>,
}

impl AssemblyPlan {
    pub fn competency_ids(&self) -> impl Iterator<Item = ID<Competency>> + '_ {
        self.competencies.iter().map(|c| c.competency_id)
    }
}
