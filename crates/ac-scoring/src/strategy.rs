//! Goal-specific scoring (spec §4.G). Dispatch is a plain enum match rather
//! than a trait-object hierarchy, per the design note that this domain has
//! three fixed, closed variants with no plugin requirement.
use crate::result::CompetencyScoreBreakdown;
use crate::scoring;
use ac_blueprint::Blueprint;
use ac_blueprint::ONetProfile;
use ac_blueprint::TeamProfile;
use ac_blueprint::TestTemplate;
use ac_items::AssessmentQuestion;
use ac_items::BehavioralIndicator;
use ac_items::BigFiveReliability;
use ac_items::BigFiveTrait;
use ac_items::Competency;
use ac_items::ReliabilityStatus;
use ac_core::ID;
use ac_session::TestAnswer;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Everything a strategy needs that is already in hand by the time scoring
/// runs — no I/O happens inside a strategy function.
pub struct ScoringContext<'a> {
    pub template: &'a TestTemplate,
    pub questions: &'a [AssessmentQuestion],
    pub answers: &'a [TestAnswer],
    pub indicators: &'a BTreeMap<ID<BehavioralIndicator>, BehavioralIndicator>,
    pub competencies: &'a BTreeMap<ID<Competency>, Competency>,
    pub big_five_reliabilities: &'a [BigFiveReliability],
    pub existing_passport_scores: &'a BTreeMap<ID<Competency>, f64>,
}

impl<'a> ScoringContext<'a> {
    fn indicator_to_competency(&self) -> BTreeMap<ID<BehavioralIndicator>, ID<Competency>> {
        self.indicators.values().map(|i| (i.id(), i.competency_id())).collect()
    }

    fn breakdown(&self) -> BTreeMap<ID<Competency>, CompetencyScoreBreakdown> {
        scoring::competency_breakdown(self.questions, self.answers, &self.indicator_to_competency())
    }
}

/// What a strategy hands back to the orchestrator; everything the
/// orchestrator needs to build a `TestResult` row except the percentile,
/// which requires a repository read the strategy itself has no access to.
pub struct StrategyOutcome {
    pub strategy_tag: &'static str,
    pub overall_score: f64,
    pub overall_percentage: f64,
    pub passed: bool,
    pub competency_breakdown: BTreeMap<ID<Competency>, CompetencyScoreBreakdown>,
    pub big_five_profile: Option<BTreeMap<BigFiveTrait, f64>>,
    pub extended_metrics: serde_json::Value,
    pub weights_snapshot: serde_json::Value,
}

/// External inputs a Job-Fit or Team-Fit run needs; `None` means the
/// dependency was unavailable after the orchestrator's bounded retries, and
/// the caller must fall back to a `Degraded` result (spec §4.F).
pub enum GoalStrategy<'p> {
    Overview,
    JobFit { onet: &'p ONetProfile },
    TeamFit { team: &'p TeamProfile },
}

impl<'p> GoalStrategy<'p> {
    pub fn score(&self, ctx: &ScoringContext) -> StrategyOutcome {
        match self {
            GoalStrategy::Overview => score_overview(ctx),
            GoalStrategy::JobFit { onet } => score_job_fit(ctx, onet),
            GoalStrategy::TeamFit { team } => score_team_fit(ctx, team),
        }
    }
}

fn big_five_trait_for(ctx: &ScoringContext, competency_id: ID<Competency>) -> Option<BigFiveTrait> {
    ctx.competencies.get(&competency_id).and_then(|c| c.big_five_trait())
}

fn contributing_traits_reliable(contributing: &BTreeSet<BigFiveTrait>, reliabilities: &[BigFiveReliability]) -> bool {
    contributing.iter().all(|t| {
        reliabilities
            .iter()
            .find(|r| r.trait_() == *t)
            .is_some_and(|r| r.status() == ReliabilityStatus::Reliable)
    })
}

/// Spec §4.G Overview: unweighted mean of competency scores, Big-Five
/// projection gated on every contributing trait being `Reliable`.
fn score_overview(ctx: &ScoringContext) -> StrategyOutcome {
    let breakdown = ctx.breakdown();
    let overall_score = scoring::mean(&breakdown.values().map(|b| b.score).collect::<Vec<_>>());
    let overall_percentage = overall_score * 100.0;
    let passed = overall_percentage >= ctx.template.passing_score();

    let include_big_five = matches!(
        ctx.template.blueprint(),
        ac_blueprint::Blueprint::Overview { include_big_five: true }
    );
    let big_five_profile = include_big_five.then(|| big_five_profile(ctx)).flatten();

    StrategyOutcome {
        strategy_tag: "overview",
        overall_score,
        overall_percentage,
        passed,
        competency_breakdown: breakdown,
        big_five_profile,
        extended_metrics: serde_json::json!({}),
        weights_snapshot: serde_json::json!({ "mode": "unweighted_mean" }),
    }
}

fn big_five_profile(ctx: &ScoringContext) -> Option<BTreeMap<BigFiveTrait, f64>> {
    let indicator_to_competency = ctx.indicator_to_competency();
    let mut buckets: BTreeMap<BigFiveTrait, Vec<f64>> = BTreeMap::new();
    let answers_by_question: std::collections::HashMap<_, _> = ctx.answers.iter().map(|a| (a.question_id(), a)).collect();
    for question in ctx.questions {
        let Some(&competency_id) = indicator_to_competency.get(&question.indicator_id()) else {
            continue;
        };
        let Some(trait_) = big_five_trait_for(ctx, competency_id) else {
            continue;
        };
        if let Some(score) = scoring::normalized_question_score(question, answers_by_question.get(&question.id()).copied()) {
            buckets.entry(trait_).or_default().push(score);
        }
    }
    let contributing: BTreeSet<BigFiveTrait> = buckets.keys().copied().collect();
    if contributing.is_empty() || !contributing_traits_reliable(&contributing, ctx.big_five_reliabilities) {
        return None;
    }
    Some(buckets.into_iter().map(|(t, scores)| (t, scoring::mean(&scores) * 100.0)).collect())
}

/// Spec §4.G Job-Fit strictness factor: a piecewise-linear knob around the
/// neutral point `strictnessLevel=50` (lenient boosts, strict penalises).
fn strictness_factor(strictness_level: u8) -> f64 {
    1.0 + (50.0 - strictness_level as f64) / 100.0
}

/// Spec §4.G Job-Fit: weighted cosine similarity over the O*NET
/// intersection, then `overall_percentage = 100 × similarity × strictnessFactor`.
fn score_job_fit(ctx: &ScoringContext, onet: &ONetProfile) -> StrategyOutcome {
    let breakdown = ctx.breakdown();
    let weights = onet.importance_weights();

    let Blueprint::JobFit { strictness_level, .. } = ctx.template.blueprint() else {
        unreachable!("score_job_fit is only dispatched for JobFit templates")
    };

    let mut dot = 0.0;
    let mut norm_candidate = 0.0;
    let mut norm_benchmark = 0.0;
    let mut gap_report = serde_json::Map::new();
    let mut imported = Vec::new();

    for (&competency_id, &required_level) in onet.required_levels() {
        let weight = weights.get(&competency_id).copied().unwrap_or(0.0);
        let candidate_score = match breakdown.get(&competency_id) {
            Some(b) => b.score,
            None => {
                if let Some(&passport_score) = ctx.existing_passport_scores.get(&competency_id) {
                    imported.push(competency_id.inner().to_string());
                    passport_score / 100.0
                } else {
                    0.0
                }
            }
        };
        let benchmark_normalised = required_level / 5.0;

        dot += weight * candidate_score * benchmark_normalised;
        norm_candidate += weight * candidate_score * candidate_score;
        norm_benchmark += weight * benchmark_normalised * benchmark_normalised;

        let candidate_on_scale = candidate_score * 5.0;
        gap_report.insert(
            competency_id.inner().to_string(),
            serde_json::json!(required_level - candidate_on_scale),
        );
    }

    let similarity = if norm_candidate <= 0.0 || norm_benchmark <= 0.0 {
        0.0
    } else {
        (dot / (norm_candidate.sqrt() * norm_benchmark.sqrt())).clamp(0.0, 1.0)
    };
    let overall_percentage = (100.0 * similarity * strictness_factor(*strictness_level)).clamp(0.0, 100.0);
    let passed = overall_percentage >= ctx.template.passing_score();

    StrategyOutcome {
        strategy_tag: "job_fit",
        overall_score: overall_percentage / 100.0,
        overall_percentage,
        passed,
        competency_breakdown: breakdown,
        big_five_profile: None,
        extended_metrics: serde_json::json!({
            "similarity": similarity,
            "strictnessLevel": strictness_level,
            "gapReport": gap_report,
            "importedFromPassport": imported,
        }),
        weights_snapshot: serde_json::to_value(&weights).unwrap_or_default(),
    }
}

/// Spec §4.G Team-Fit: `fit[comp] = candidate_score × (1 − saturation[comp])`.
fn score_team_fit(ctx: &ScoringContext, team: &TeamProfile) -> StrategyOutcome {
    let breakdown = ctx.breakdown();

    let mut fit = BTreeMap::new();
    for (&competency_id, b) in &breakdown {
        let saturation = team.saturation_of(competency_id);
        fit.insert(competency_id, b.score * (1.0 - saturation));
    }

    let fit_values: Vec<f64> = fit.values().copied().collect();
    let overall_score = scoring::mean(&fit_values);

    let saturation_ratio = scoring::mean(
        &breakdown
            .keys()
            .map(|id| 1.0 - team.saturation_of(*id))
            .collect::<Vec<_>>(),
    );
    let diversity_ratio = diversity_ratio(ctx, team);
    let team_fit_multiplier = 1.0 + 0.5 * diversity_ratio + 0.5 * saturation_ratio;

    let overall_percentage = (overall_score * 100.0 * team_fit_multiplier).clamp(0.0, 100.0);
    let passed = overall_percentage >= ctx.template.passing_score();

    let consistency_score = (1.0 - scoring::stdev(&scoring::all_question_scores(ctx.questions, ctx.answers))).clamp(0.0, 1.0);

    StrategyOutcome {
        strategy_tag: "team_fit",
        overall_score,
        overall_percentage,
        passed,
        competency_breakdown: breakdown,
        big_five_profile: None,
        extended_metrics: serde_json::json!({
            "fit": fit.iter().map(|(id, v)| (id.inner().to_string(), *v)).collect::<BTreeMap<_, _>>(),
            "diversityRatio": diversity_ratio,
            "saturationRatio": saturation_ratio,
            "teamFitMultiplier": team_fit_multiplier,
            "consistencyScore": consistency_score,
        }),
        weights_snapshot: serde_json::json!({ "teamId": team.team_id() }),
    }
}

/// Candidate's Big-Five distance from the team average, folded into `[0,1]`
/// where `1.0` means maximally diverse (spec §4.G: "a function of Big-Five
/// diversity"). Undefined inputs (no reliable candidate profile, or no team
/// average on record) contribute neutral diversity rather than failing the
/// whole Team-Fit computation.
fn diversity_ratio(ctx: &ScoringContext, team: &TeamProfile) -> f64 {
    let Some(team_average) = team.average_personality() else {
        return 0.5;
    };
    let Some(candidate) = big_five_profile(ctx) else {
        return 0.5;
    };
    let distances: Vec<f64> = BigFiveTrait::all()
        .iter()
        .filter_map(|t| {
            let c = candidate.get(t)?;
            let a = team_average.get(t)?;
            Some((c - a).abs() / 100.0)
        })
        .collect();
    if distances.is_empty() {
        0.5
    } else {
        scoring::mean(&distances).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_blueprint::Visibility;
    use ac_items::AssessmentQuestion;
    use ac_items::DifficultyBand;
    use ac_items::QuestionType;
    use ac_items::ScoringRubric;
    use ac_session::AnswerPayload;
    use ac_session::TestAnswer;
    use chrono::DateTime;
    use std::collections::BTreeSet;

    fn likert_question(indicator_id: ID<BehavioralIndicator>) -> AssessmentQuestion {
        AssessmentQuestion::new(
            ID::default(),
            indicator_id,
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
    fn overview_happy_path_matches_the_worked_example() {
        let competency_id = ID::default();
        let indicator = BehavioralIndicator::new(ID::default(), competency_id, "ind".into(), ac_items::ContextScope::Universal);
        let mut indicators = BTreeMap::new();
        indicators.insert(indicator.id(), indicator.clone());
        let mut competencies = BTreeMap::new();
        competencies.insert(competency_id, Competency::new(competency_id, "Teamwork".into(), None));

        let questions: Vec<_> = (0..12).map(|_| likert_question(indicator.id())).collect();
        let answers: Vec<_> = questions
            .iter()
            .map(|q| TestAnswer::new(ID::default(), q.id(), AnswerPayload::Likert(6), DateTime::UNIX_EPOCH, 10))
            .collect();

        let template = TestTemplate::new(
            ID::default(),
            "Engineering Overview".into(),
            "clerk_owner".into(),
            Visibility::Private,
            Blueprint::Overview { include_big_five: false },
            BTreeSet::new(),
            3,
            1800,
            70.0,
        );

        let ctx = ScoringContext {
            template: &template,
            questions: &questions,
            answers: &answers,
            indicators: &indicators,
            competencies: &competencies,
            big_five_reliabilities: &[],
            existing_passport_scores: &BTreeMap::new(),
        };

        let outcome = GoalStrategy::Overview.score(&ctx);
        assert!((outcome.overall_percentage - 83.333333).abs() < 1e-3);
        assert!(outcome.passed);
    }

    #[test]
    fn job_fit_perfect_match_has_unit_similarity() {
        let comp_a = ID::default();
        let comp_b = ID::default();
        let comp_c = ID::default();
        let indicator_a = BehavioralIndicator::new(ID::default(), comp_a, "a".into(), ac_items::ContextScope::Universal);
        let indicator_b = BehavioralIndicator::new(ID::default(), comp_b, "b".into(), ac_items::ContextScope::Universal);
        let indicator_c = BehavioralIndicator::new(ID::default(), comp_c, "c".into(), ac_items::ContextScope::Universal);
        let mut indicators = BTreeMap::new();
        for i in [&indicator_a, &indicator_b, &indicator_c] {
            indicators.insert(i.id(), i.clone());
        }
        let mut competencies = BTreeMap::new();
        for (id, name) in [(comp_a, "A"), (comp_b, "B"), (comp_c, "C")] {
            competencies.insert(id, Competency::new(id, name.into(), None));
        }

        // Likert 5/7 normalises to 2/3; pick the benchmark's required level
        // so its normalised form matches exactly, giving v_c == v_b.
        let candidate_score = (5.0 - 1.0) / 6.0;
        let required_level = candidate_score * 5.0;

        let mut questions = Vec::new();
        let mut answers = Vec::new();
        for indicator in [&indicator_a, &indicator_b, &indicator_c] {
            let q = likert_question(indicator.id());
            answers.push(TestAnswer::new(ID::default(), q.id(), AnswerPayload::Likert(5), DateTime::UNIX_EPOCH, 10));
            questions.push(q);
        }

        let mut required_levels = BTreeMap::new();
        let mut importance = BTreeMap::new();
        for id in [comp_a, comp_b, comp_c] {
            required_levels.insert(id, required_level);
            importance.insert(id, 1.0);
        }
        let onet = ONetProfile::new("15-1252.00".into(), required_levels, importance);

        let template = TestTemplate::new(
            ID::default(),
            "Backend Engineer".into(),
            "clerk_owner".into(),
            Visibility::Private,
            Blueprint::JobFit {
                onet_occupation_code: "15-1252.00".into(),
                delta_testing_enabled: false,
                delta_skip_threshold: 0.0,
                strictness_level: 50,
                passport_max_age_days: 180,
            },
            BTreeSet::new(),
            3,
            1800,
            70.0,
        );

        let ctx = ScoringContext {
            template: &template,
            questions: &questions,
            answers: &answers,
            indicators: &indicators,
            competencies: &competencies,
            big_five_reliabilities: &[],
            existing_passport_scores: &BTreeMap::new(),
        };

        let outcome = GoalStrategy::JobFit { onet: &onet }.score(&ctx);
        assert!((outcome.overall_percentage - 100.0).abs() < 1e-6);
    }

    #[test]
    fn team_fit_rewards_undersaturated_competencies() {
        let comp_1 = ID::default();
        let comp_2 = ID::default();
        let indicator_1 = BehavioralIndicator::new(ID::default(), comp_1, "1".into(), ac_items::ContextScope::Universal);
        let indicator_2 = BehavioralIndicator::new(ID::default(), comp_2, "2".into(), ac_items::ContextScope::Universal);
        let mut indicators = BTreeMap::new();
        indicators.insert(indicator_1.id(), indicator_1.clone());
        indicators.insert(indicator_2.id(), indicator_2.clone());
        let mut competencies = BTreeMap::new();
        competencies.insert(comp_1, Competency::new(comp_1, "1".into(), None));
        competencies.insert(comp_2, Competency::new(comp_2, "2".into(), None));

        // candidate score 0.8 on both (an exact value an averaged Likert
        // item can't hit; option-scored items pin it precisely instead).
        fn yes_scored_at(value: f64) -> BTreeMap<String, f64> {
            let mut m = BTreeMap::new();
            m.insert("yes".to_string(), value);
            m
        }
        let option = || vec![ac_items::AnswerOption { id: "yes".into(), text: "Yes".into() }];
        let q1 = AssessmentQuestion::new(
            ID::default(),
            indicator_1.id(),
            "q1".into(),
            QuestionType::MultipleChoice,
            option(),
            ScoringRubric::OptionScores(yes_scored_at(0.8)),
            DifficultyBand::Foundational,
            60,
        )
        .unwrap();
        let q2 = AssessmentQuestion::new(
            ID::default(),
            indicator_2.id(),
            "q2".into(),
            QuestionType::MultipleChoice,
            option(),
            ScoringRubric::OptionScores(yes_scored_at(0.8)),
            DifficultyBand::Foundational,
            60,
        )
        .unwrap();

        let questions = vec![q1.clone(), q2.clone()];
        let answers = vec![
            TestAnswer::new(ID::default(), q1.id(), AnswerPayload::SelectedOptions(vec!["yes".into()]), DateTime::UNIX_EPOCH, 10),
            TestAnswer::new(ID::default(), q2.id(), AnswerPayload::SelectedOptions(vec!["yes".into()]), DateTime::UNIX_EPOCH, 10),
        ];

        let mut saturation = BTreeMap::new();
        saturation.insert(comp_1, 0.2);
        saturation.insert(comp_2, 0.9);
        let team = TeamProfile::new("team-1".into(), vec![], saturation, BTreeMap::new(), None);

        let template = TestTemplate::new(
            ID::default(),
            "Team Fit".into(),
            "clerk_owner".into(),
            Visibility::Private,
            Blueprint::TeamFit { team_id: "team-1".into() },
            BTreeSet::new(),
            3,
            1800,
            0.0,
        );

        let ctx = ScoringContext {
            template: &template,
            questions: &questions,
            answers: &answers,
            indicators: &indicators,
            competencies: &competencies,
            big_five_reliabilities: &[],
            existing_passport_scores: &BTreeMap::new(),
        };

        let outcome = GoalStrategy::TeamFit { team: &team }.score(&ctx);
        let fit = outcome.extended_metrics.get("fit").unwrap();
        let fit_1 = fit.get(comp_1.inner().to_string()).unwrap().as_f64().unwrap();
        let fit_2 = fit.get(comp_2.inner().to_string()).unwrap().as_f64().unwrap();
        assert!((fit_1 - 0.64).abs() < 1e-6);
        assert!((fit_2 - 0.08).abs() < 1e-6);
    }
}
