use ac_items::BigFiveTrait;
use ac_items::Competency;
use ac_core::ID;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// An external collaborator's view of a team's competency coverage (spec §3
/// `TeamProfile`), consumed by the Team-Fit blueprint and scoring strategy.
/// The team CRUD saga that produces this value lives outside the assessment
/// core (spec §1 Non-goals); this crate only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    team_id: String,
    members: Vec<String>,
    saturation: BTreeMap<ID<Competency>, f64>,
    member_scores: BTreeMap<String, BTreeMap<ID<Competency>, f64>>,
    average_personality: Option<BTreeMap<BigFiveTrait, f64>>,
}

impl TeamProfile {
    pub fn new(
        team_id: String,
        members: Vec<String>,
        saturation: BTreeMap<ID<Competency>, f64>,
        member_scores: BTreeMap<String, BTreeMap<ID<Competency>, f64>>,
        average_personality: Option<BTreeMap<BigFiveTrait, f64>>,
    ) -> Self {
        Self {
            team_id,
            members,
            saturation,
            member_scores,
            average_personality,
        }
    }
    pub fn team_id(&self) -> &str {
        &self.team_id
    }
    pub fn members(&self) -> &[String] {
        &self.members
    }
    pub fn saturation(&self) -> &BTreeMap<ID<Competency>, f64> {
        &self.saturation
    }
    pub fn saturation_of(&self, competency_id: ID<Competency>) -> f64 {
        self.saturation.get(&competency_id).copied().unwrap_or(0.0)
    }
    pub fn member_scores(&self) -> &BTreeMap<String, BTreeMap<ID<Competency>, f64>> {
        &self.member_scores
    }
    pub fn average_personality(&self) -> Option<&BTreeMap<BigFiveTrait, f64>> {
        self.average_personality.as_ref()
    }

    /// Competencies the team covers below full saturation, in spec §4.C
    /// Team-Fit's terms — every entry in `saturation` that is `< 1.0`.
    pub fn undersaturated(&self) -> Vec<ID<Competency>> {
        self.saturation
            .iter()
            .filter(|(_, &level)| level < 1.0)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// An external O*NET occupational benchmark lookup (spec §3), treated as a
/// profile provider out of scope per spec §1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ONetProfile {
    occupation_code: String,
    /// Required level per competency, normalised to `[0,1]` against the
    /// benchmark's scale.
    required_levels: BTreeMap<ID<Competency>, f64>,
    /// Importance weight per competency; need not sum to 1 as stored —
    /// `importance_weights` normalises at read time.
    importance: BTreeMap<ID<Competency>, f64>,
}

impl ONetProfile {
    pub fn new(
        occupation_code: String,
        required_levels: BTreeMap<ID<Competency>, f64>,
        importance: BTreeMap<ID<Competency>, f64>,
    ) -> Self {
        Self {
            occupation_code,
            required_levels,
            importance,
        }
    }
    pub fn occupation_code(&self) -> &str {
        &self.occupation_code
    }
    pub fn required_levels(&self) -> &BTreeMap<ID<Competency>, f64> {
        &self.required_levels
    }
    pub fn benchmarked_competencies(&self) -> impl Iterator<Item = &ID<Competency>> {
        self.required_levels.keys()
    }

    /// Importance weights over `required_levels`' competencies, normalised
    /// to sum to 1 (spec §4.G JobFit: "weights = O*NET importance normalised
    /// to sum to 1"). Competencies with no recorded importance default to 0
    /// weight rather than panicking on a sparse benchmark.
    pub fn importance_weights(&self) -> BTreeMap<ID<Competency>, f64> {
        let total: f64 = self
            .required_levels
            .keys()
            .map(|id| self.importance.get(id).copied().unwrap_or(0.0))
            .sum();
        if total <= 0.0 {
            let n = self.required_levels.len().max(1) as f64;
            return self.required_levels.keys().map(|id| (*id, 1.0 / n)).collect();
        }
        self.required_levels
            .keys()
            .map(|id| (*id, self.importance.get(id).copied().unwrap_or(0.0) / total))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undersaturated_excludes_fully_saturated_competencies() {
        let full = ID::default();
        let partial = ID::default();
        let mut saturation = BTreeMap::new();
        saturation.insert(full, 1.0);
        saturation.insert(partial, 0.4);
        let profile = TeamProfile::new("team-1".into(), vec![], saturation, BTreeMap::new(), None);
        let under = profile.undersaturated();
        assert_eq!(under, vec![partial]);
    }

    #[test]
    fn importance_weights_normalise_to_one() {
        let a = ID::default();
        let b = ID::default();
        let mut required = BTreeMap::new();
        required.insert(a, 0.8);
        required.insert(b, 0.6);
        let mut importance = BTreeMap::new();
        importance.insert(a, 3.0);
        importance.insert(b, 1.0);
        let profile = ONetProfile::new("15-1252.00".into(), required, importance);
        let weights = profile.importance_weights();
        let total: f64 = weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(weights[&a] > weights[&b]);
    }

    #[test]
    fn importance_weights_fall_back_to_uniform_when_all_zero() {
        let a = ID::default();
        let b = ID::default();
        let mut required = BTreeMap::new();
        required.insert(a, 0.5);
        required.insert(b, 0.5);
        let profile = ONetProfile::new("15-1252.00".into(), required, BTreeMap::new());
        let weights = profile.importance_weights();
        assert!((weights[&a] - 0.5).abs() < 1e-9);
        assert!((weights[&b] - 0.5).abs() < 1e-9);
    }
}
