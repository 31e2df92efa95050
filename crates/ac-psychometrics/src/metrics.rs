//! Classical item statistics (spec §4.H): p-value and point-biserial
//! discrimination over normalised `[0,1]` scores, reusing the mean/stdev
//! helpers `ac-scoring` already exposes for result aggregation rather than
//! reimplementing them here.
use ac_scoring::mean;
use ac_scoring::stdev;

/// Mean of the normalised item scores across every respondent who answered
/// (spec §4.H: "p-value: mean of normalised scores across all respondents").
pub fn p_value(item_scores: &[f64]) -> f64 {
    mean(item_scores)
}

/// Point-biserial discrimination, computed as the Pearson correlation
/// between the item's normalised score and each respondent's overall
/// normalised score (spec §4.H: "correlation between the normalised item
/// score and the respondent's overall normalised score on the test").
/// `None` when there isn't enough variance to define a correlation (fewer
/// than two pairs, or either series is constant).
pub fn point_biserial(item_scores: &[f64], overall_scores: &[f64]) -> Option<f64> {
    if item_scores.len() != overall_scores.len() || item_scores.len() < 2 {
        return None;
    }
    let item_sd = stdev(item_scores);
    let overall_sd = stdev(overall_scores);
    if item_sd == 0.0 || overall_sd == 0.0 {
        return None;
    }
    let item_mean = mean(item_scores);
    let overall_mean = mean(overall_scores);
    let n = item_scores.len() as f64;
    let covariance = item_scores
        .iter()
        .zip(overall_scores)
        .map(|(x, y)| (x - item_mean) * (y - overall_mean))
        .sum::<f64>()
        / n;
    Some((covariance / (item_sd * overall_sd)).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_value_is_the_mean_of_item_scores() {
        assert_eq!(p_value(&[1.0, 0.5, 0.0]), 0.5);
    }

    #[test]
    fn perfectly_correlated_series_yield_discrimination_of_one() {
        let item = vec![0.0, 0.25, 0.5, 0.75, 1.0];
        let overall = item.clone();
        assert!((point_biserial(&item, &overall).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inverted_series_yield_negative_discrimination() {
        let item = vec![0.0, 0.5, 1.0];
        let overall = vec![1.0, 0.5, 0.0];
        assert!(point_biserial(&item, &overall).unwrap() < 0.0);
    }

    #[test]
    fn a_constant_item_score_has_no_well_defined_discrimination() {
        let item = vec![0.5, 0.5, 0.5];
        let overall = vec![0.1, 0.5, 0.9];
        assert!(point_biserial(&item, &overall).is_none());
    }
}
