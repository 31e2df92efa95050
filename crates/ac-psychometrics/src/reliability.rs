//! Cronbach's α over a set of items' normalised scores, and the
//! `alpha_if_deleted` sensitivity each `CompetencyReliability` row carries
//! (spec §4.H).
use std::collections::BTreeMap;

/// One respondent's normalised score per item id, keyed by item id string so
/// `alpha_if_deleted`'s map (also keyed by string, per `ac-items`) can be
/// built directly from the same keys.
pub type RespondentVector = BTreeMap<String, f64>;

/// Cronbach's α for the given items over the given respondents. Respondents
/// missing a score for one of `item_ids` are skipped for that item's
/// contribution but still counted elsewhere — in practice every respondent
/// in `vectors` has already been filtered to those who answered all of
/// `item_ids`, matching the "per-competency Cronbach-α over its active
/// items" framing (spec §4.H).
///
/// Formula: α = (k / (k-1)) * (1 - Σ var(item_i) / var(total_score)).
/// Returns `0.0` for fewer than two items or fewer than two respondents,
/// the same degenerate-input convention `ac_scoring::stdev` uses.
pub fn cronbach_alpha(item_ids: &[String], vectors: &[RespondentVector]) -> f64 {
    let k = item_ids.len();
    if k < 2 || vectors.len() < 2 {
        return 0.0;
    }
    let item_variance_sum: f64 = item_ids
        .iter()
        .map(|item_id| {
            let scores: Vec<f64> = vectors.iter().filter_map(|v| v.get(item_id).copied()).collect();
            population_variance(&scores)
        })
        .sum();
    let totals: Vec<f64> = vectors.iter().map(|v| item_ids.iter().filter_map(|id| v.get(id)).sum()).collect();
    let total_variance = population_variance(&totals);
    if total_variance == 0.0 {
        return 0.0;
    }
    (k as f64 / (k as f64 - 1.0)) * (1.0 - item_variance_sum / total_variance)
}

/// α recomputed with each item left out in turn, for the repository's
/// `alpha_if_deleted` column (spec §3 `CompetencyReliability`).
pub fn alpha_if_deleted(item_ids: &[String], vectors: &[RespondentVector]) -> BTreeMap<String, f64> {
    item_ids
        .iter()
        .map(|excluded| {
            let remaining: Vec<String> = item_ids.iter().filter(|id| *id != excluded).cloned().collect();
            (excluded.clone(), cronbach_alpha(&remaining, vectors))
        })
        .collect()
}

fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(pairs: &[(&str, f64)]) -> RespondentVector {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn identical_items_across_respondents_give_perfect_alpha() {
        let ids = vec!["q1".to_string(), "q2".to_string()];
        let vectors = vec![
            vector(&[("q1", 0.2), ("q2", 0.2)]),
            vector(&[("q1", 0.5), ("q2", 0.5)]),
            vector(&[("q1", 0.9), ("q2", 0.9)]),
        ];
        let alpha = cronbach_alpha(&ids, &vectors);
        assert!((alpha - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_items_give_a_low_alpha() {
        let ids = vec!["q1".to_string(), "q2".to_string()];
        let vectors = vec![
            vector(&[("q1", 0.0), ("q2", 1.0)]),
            vector(&[("q1", 1.0), ("q2", 0.0)]),
            vector(&[("q1", 0.0), ("q2", 1.0)]),
            vector(&[("q1", 1.0), ("q2", 0.0)]),
        ];
        let alpha = cronbach_alpha(&ids, &vectors);
        assert!(alpha < 0.5);
    }

    #[test]
    fn alpha_if_deleted_has_one_entry_per_item() {
        let ids = vec!["q1".to_string(), "q2".to_string(), "q3".to_string()];
        let vectors = vec![
            vector(&[("q1", 0.2), ("q2", 0.3), ("q3", 0.25)]),
            vector(&[("q1", 0.8), ("q2", 0.7), ("q3", 0.75)]),
        ];
        let result = alpha_if_deleted(&ids, &vectors);
        assert_eq!(result.len(), 3);
    }
}
