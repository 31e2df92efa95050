//! Per-question and per-competency scoring math shared by every goal
//! strategy (spec §4.G).
use crate::result::CompetencyScoreBreakdown;
use ac_items::AssessmentQuestion;
use ac_items::Competency;
use ac_core::ID;
use ac_session::AnswerPayload;
use ac_session::TestAnswer;
use ac_items::ScoringRubric;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Normalises one answered question to `[0,1]`. A skipped or free-text
/// question contributes nothing and is excluded from aggregation (spec
/// §4.G: "free text is unscored and excluded").
pub fn normalized_question_score(question: &AssessmentQuestion, answer: Option<&TestAnswer>) -> Option<f64> {
    let answer = answer?;
    if answer.is_skipped() {
        return None;
    }
    let payload = answer.payload()?;
    match (question.rubric(), payload) {
        (ScoringRubric::Likert, AnswerPayload::Likert(value)) => Some((*value as f64 - 1.0) / 6.0),
        (ScoringRubric::OptionScores(scores), AnswerPayload::SelectedOptions(selected)) => {
            let matched: Vec<f64> = selected.iter().filter_map(|option_id| scores.get(option_id).copied()).collect();
            if matched.is_empty() {
                None
            } else {
                Some(matched.iter().sum::<f64>() / matched.len() as f64)
            }
        }
        (ScoringRubric::RankingKey(ideal), AnswerPayload::Ranking(submitted)) => Some(rank_correlation_score(ideal, submitted)),
        _ => None,
    }
}

/// Spearman rank correlation between the ideal ordering and the submitted
/// one, remapped from `[-1,1]` to `[0,1]` so it composes with the other
/// rubrics' normalised scores.
fn rank_correlation_score(ideal: &[String], submitted: &[String]) -> f64 {
    let ideal_rank: HashMap<&str, usize> = ideal.iter().enumerate().map(|(rank, id)| (id.as_str(), rank)).collect();
    let mut sum_squared_diff = 0.0;
    let mut matched = 0usize;
    for (submitted_rank, option_id) in submitted.iter().enumerate() {
        if let Some(&ideal_rank) = ideal_rank.get(option_id.as_str()) {
            let diff = submitted_rank as f64 - ideal_rank as f64;
            sum_squared_diff += diff * diff;
            matched += 1;
        }
    }
    if matched < 2 {
        return 0.5;
    }
    let n = matched as f64;
    let rho = 1.0 - (6.0 * sum_squared_diff) / (n * (n * n - 1.0));
    ((rho + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Groups every answered question under its competency and averages the
/// normalised scores within each (spec §4.G: "per-competency score by
/// averaging per-question scores within the competency").
pub fn competency_breakdown(
    questions: &[AssessmentQuestion],
    answers: &[TestAnswer],
    indicator_to_competency: &BTreeMap<ID<ac_items::BehavioralIndicator>, ID<Competency>>,
) -> BTreeMap<ID<Competency>, CompetencyScoreBreakdown> {
    let answers_by_question: HashMap<ID<AssessmentQuestion>, &TestAnswer> =
        answers.iter().map(|a| (a.question_id(), a)).collect();

    let mut sums: BTreeMap<ID<Competency>, (f64, u32)> = BTreeMap::new();
    for question in questions {
        let Some(&competency_id) = indicator_to_competency.get(&question.indicator_id()) else {
            continue;
        };
        let Some(score) = normalized_question_score(question, answers_by_question.get(&question.id()).copied()) else {
            continue;
        };
        let entry = sums.entry(competency_id).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(competency_id, (sum, count))| {
            let score = if count == 0 { 0.0 } else { sum / count as f64 };
            (
                competency_id,
                CompetencyScoreBreakdown {
                    score,
                    percentage: score * 100.0,
                    questions_answered: count,
                    questions_correct_equivalent: sum,
                },
            )
        })
        .collect()
}

/// All per-question normalised scores, regardless of competency — used by
/// Team-Fit's `consistencyScore` (spec §4.G: "1 − stdev(per-question
/// normalised scores)").
pub fn all_question_scores(questions: &[AssessmentQuestion], answers: &[TestAnswer]) -> Vec<f64> {
    let answers_by_question: HashMap<ID<AssessmentQuestion>, &TestAnswer> =
        answers.iter().map(|a| (a.question_id(), a)).collect();
    questions
        .iter()
        .filter_map(|q| normalized_question_score(q, answers_by_question.get(&q.id()).copied()))
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Spec §4.G Overview: "the ordered count of results strictly below the
/// candidate's value", as a `[0,100]` percentile.
pub fn percentile_rank(prior_values: &[f64], candidate: f64) -> f64 {
    if prior_values.is_empty() {
        return 50.0;
    }
    let below = prior_values.iter().filter(|&&v| v < candidate).count();
    (below as f64 / prior_values.len() as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_items::AnswerOption;
    use ac_items::DifficultyBand;
    use ac_items::QuestionType;
    use chrono::DateTime;

    fn likert_question(id: ID<AssessmentQuestion>) -> AssessmentQuestion {
        AssessmentQuestion::new(
            id,
            ID::default(),
            "text".into(),
            QuestionType::Likert,
            vec![],
            ScoringRubric::Likert,
            DifficultyBand::Foundational,
            60,
        )
        .unwrap()
    }

    #[test]
    fn likert_six_of_seven_normalises_to_five_sixths() {
        let q = likert_question(ID::default());
        let answer = TestAnswer::new(ID::default(), q.id(), AnswerPayload::Likert(6), DateTime::UNIX_EPOCH, 10);
        let score = normalized_question_score(&q, Some(&answer)).unwrap();
        assert!((score - (5.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn skipped_question_contributes_nothing() {
        let q = likert_question(ID::default());
        let answer = TestAnswer::skipped(ID::default(), q.id(), DateTime::UNIX_EPOCH, 0);
        assert!(normalized_question_score(&q, Some(&answer)).is_none());
    }

    #[test]
    fn perfect_ranking_scores_one() {
        let ideal = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!((rank_correlation_score(&ideal, &ideal) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reversed_ranking_scores_zero() {
        let ideal = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let reversed: Vec<String> = ideal.iter().rev().cloned().collect();
        assert!(rank_correlation_score(&ideal, &reversed) < 0.1);
    }

    #[test]
    fn option_scores_average_multiple_selections() {
        let mut scores = BTreeMap::new();
        scores.insert("opt_a".to_string(), 1.0);
        scores.insert("opt_b".to_string(), 0.0);
        let q = AssessmentQuestion::new(
            ID::default(),
            ID::default(),
            "text".into(),
            QuestionType::MultipleChoice,
            vec![
                AnswerOption {
                    id: "opt_a".into(),
                    text: "A".into(),
                },
                AnswerOption {
                    id: "opt_b".into(),
                    text: "B".into(),
                },
            ],
            ScoringRubric::OptionScores(scores),
            DifficultyBand::Foundational,
            60,
        )
        .unwrap();
        let answer = TestAnswer::new(
            ID::default(),
            q.id(),
            AnswerPayload::SelectedOptions(vec!["opt_a".into(), "opt_b".into()]),
            DateTime::UNIX_EPOCH,
            10,
        );
        let score = normalized_question_score(&q, Some(&answer)).unwrap();
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn percentile_counts_strictly_lower_priors() {
        assert_eq!(percentile_rank(&[50.0, 60.0, 90.0, 20.0], 70.0), 75.0);
    }

    #[test]
    fn consistency_score_is_perfect_for_uniform_answers() {
        let scores = vec![0.8333, 0.8333, 0.8333];
        assert!((1.0 - stdev(&scores) - 1.0).abs() < 1e-6);
    }
}
