//! Batch psychometric job (spec §4.H): for every item with enough responses,
//! recompute its statistics, transition its validity status under
//! hysteresis, and roll the result up into per-competency and per-Big-Five
//! reliability. Runs under [`crate::lock::run_under_lock`] so only one
//! process instance executes it at a time.
use crate::metrics::p_value;
use crate::metrics::point_biserial;
use crate::reliability::RespondentVector;
use crate::reliability::alpha_if_deleted;
use crate::reliability::cronbach_alpha;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use ac_items::AssessmentQuestion;
use ac_items::BigFiveReliability;
use ac_items::BigFiveTrait;
use ac_items::Competency;
use ac_items::CompetencyReliability;
use ac_items::DifficultyBand;
use ac_items::DiscriminationFlag;
use ac_items::ItemRepository;
use ac_items::ItemStatistics;
use ac_items::ValidityStatus;
use ac_scoring::ResultRepository;
use ac_scoring::normalized_question_score;
use ac_session::AnswerRepository;
use chrono::DateTime;
use chrono::Utc;
use std::collections::BTreeMap;

const ALL_BANDS: [DifficultyBand; 5] = [
    DifficultyBand::Foundational,
    DifficultyBand::Intermediate,
    DifficultyBand::Advanced,
    DifficultyBand::Expert,
    DifficultyBand::Specialized,
];

/// The α banding's minimum-sample floor is a separate concern from the
/// per-item `min_responses` gate; a small fixed floor is enough to
/// distinguish "no data yet" from "insufficient data" (spec §4.H status
/// bands: "insufficient sample Unreliable/InsufficientData").
const RELIABILITY_MIN_SAMPLE: u32 = 10;

/// Tunables the job needs beyond `ac_core::Config`'s raw fields, bundled so
/// call sites don't thread five scalar arguments through `analyse_all`.
#[derive(Debug, Clone, Copy)]
pub struct AnalyserSettings {
    pub min_responses: u32,
    pub review_dwell: chrono::Duration,
}

/// Per-run tally, returned so the caller (`ac-server`'s scheduler) can log a
/// one-line summary the way the teacher's `Pool::checkpoint` does.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub items_considered: usize,
    pub items_updated: usize,
    pub items_below_threshold: usize,
    pub items_failed: usize,
    pub competencies_updated: usize,
    pub big_five_traits_updated: usize,
}

pub struct PsychometricAnalyser<'r> {
    items: &'r dyn ItemRepository,
    answers: &'r dyn AnswerRepository,
    results: &'r dyn ResultRepository,
}

impl<'r> PsychometricAnalyser<'r> {
    pub fn new(items: &'r dyn ItemRepository, answers: &'r dyn AnswerRepository, results: &'r dyn ResultRepository) -> Self {
        Self { items, answers, results }
    }

    /// Runs the full batch. A single item's failure is logged (with a fresh
    /// correlation id via `AssessmentError::internal`'s side effect) and
    /// skipped rather than aborting the remaining items (spec §4.H
    /// "Failures: a failed item doesn't abort the batch").
    ///
    /// Active items are discovered by walking the catalog (every indicator
    /// of every active competency, across all bands) rather than trusting
    /// `ItemRepository::items_due_for_analysis`'s stored `response_count`:
    /// that column is itself only ever written by this job, so gating
    /// discovery on it would mean a never-before-analysed item can never
    /// become due. The catalog walk is the same one `ac-assembly` uses to
    /// build a plan, just without the per-session seed.
    pub async fn analyse_all(&self, settings: AnalyserSettings, now: DateTime<Utc>) -> Result<AnalysisReport, AssessmentError> {
        let catalog = self.catalog_by_competency().await?;
        let mut report = AnalysisReport::default();

        for items in catalog.values() {
            for item in items {
                report.items_considered += 1;
                match self.analyse_item(item.id(), settings, now).await {
                    Ok(true) => report.items_updated += 1,
                    Ok(false) => report.items_below_threshold += 1,
                    Err(err) => {
                        report.items_failed += 1;
                        log::error!("psychometric analysis failed for item {}: {err}", item.id());
                    }
                }
            }
        }

        report.competencies_updated = self.refresh_competency_reliability(&catalog).await?;
        report.big_five_traits_updated = self.refresh_big_five_reliability(&catalog).await?;
        Ok(report)
    }

    /// Returns `Ok(true)` if the item had enough responses and its
    /// statistics were recomputed, `Ok(false)` if it simply isn't due yet.
    async fn analyse_item(&self, item_id: ID<AssessmentQuestion>, settings: AnalyserSettings, now: DateTime<Utc>) -> Result<bool, AssessmentError> {
        let question = self
            .items
            .get_item(item_id)
            .await?
            .ok_or_else(|| AssessmentError::not_found("AssessmentQuestion", item_id.inner()))?;
        let answers = self.answers.list_for_question(item_id).await?;

        let mut item_scores = Vec::new();
        let mut overall_scores = Vec::new();
        let mut scored_answers = Vec::new();
        for answer in &answers {
            let Some(item_score) = normalized_question_score(&question, Some(answer)) else {
                continue;
            };
            let Some(result) = self.results.get_by_session(answer.session_id()).await? else {
                continue;
            };
            item_scores.push(item_score);
            overall_scores.push(result.overall_score());
            let mut scored = answer.clone();
            scored.set_score(item_score, 1.0);
            scored_answers.push(scored);
        }

        if item_scores.len() < settings.min_responses as usize {
            return Ok(false);
        }

        for scored in &scored_answers {
            if let Err(err) = self.answers.upsert(scored).await {
                log::warn!("failed to persist item score for answer ({},{}): {err}", scored.session_id(), scored.question_id());
            }
        }

        let mut stats = self.items.get_statistics(item_id).await?.unwrap_or_else(|| ItemStatistics::new(item_id));
        let previous_flag = stats.discrimination_flag();
        let p = p_value(&item_scores);
        let discrimination = point_biserial(&item_scores, &overall_scores).unwrap_or(0.0);
        // 2PL/3PL estimation needs an iterative fit this job does not attempt
        // (spec §4.H: "optional ... if the fit fails to converge, leave
        // nulls"); `irt` stays `None` until that estimator exists.
        stats.record_metrics(p, discrimination, None, item_scores.len() as u32)?;

        self.apply_status_transition(&mut stats, previous_flag, settings, now);
        self.items.upsert_statistics(&stats).await?;
        Ok(true)
    }

    fn apply_status_transition(&self, stats: &mut ItemStatistics, previous_flag: DiscriminationFlag, settings: AnalyserSettings, now: DateTime<Utc>) {
        match stats.validity_status() {
            ValidityStatus::Probation => {
                if stats.response_count() >= settings.min_responses && stats.discrimination() >= 0.10 {
                    let _ = stats.transition(
                        ValidityStatus::Active,
                        format!("response_count={} discrimination={:.3} cleared probation", stats.response_count(), stats.discrimination()),
                        now,
                    );
                }
            }
            ValidityStatus::Active => {
                if previous_flag.is_persistently_bad() && stats.discrimination_flag().is_persistently_bad() {
                    let _ = stats.transition(
                        ValidityStatus::FlaggedForReview,
                        format!("discrimination_flag={:?} persisted across two runs", stats.discrimination_flag()),
                        now,
                    );
                }
            }
            ValidityStatus::FlaggedForReview => {
                let flagged_at = stats
                    .history()
                    .iter()
                    .rev()
                    .find(|change| change.to == ValidityStatus::FlaggedForReview)
                    .map(|change| change.at);
                let dwell_expired = flagged_at.is_some_and(|at| now - at >= settings.review_dwell);
                if dwell_expired && stats.discrimination_flag().is_persistently_bad() {
                    let _ = stats.transition(
                        ValidityStatus::Retired,
                        format!("no improvement after {} day review dwell", settings.review_dwell.num_days()),
                        now,
                    );
                }
            }
            ValidityStatus::Retired => {}
        }
    }

    /// Every active competency's active items, across all bands, keyed by
    /// competency id — the shared catalog walk `analyse_all` and both
    /// reliability refreshes need.
    async fn catalog_by_competency(&self) -> Result<BTreeMap<ID<Competency>, Vec<AssessmentQuestion>>, AssessmentError> {
        let mut catalog = BTreeMap::new();
        for competency in self.items.list_active_competencies().await? {
            let indicators = self.items.list_indicators(competency.id()).await?;
            let mut items = Vec::new();
            for indicator in &indicators {
                for band in ALL_BANDS {
                    items.extend(self.items.candidates(indicator.id(), band).await?);
                }
            }
            catalog.insert(competency.id(), items);
        }
        Ok(catalog)
    }

    /// Recomputes α for every active competency over its active items
    /// (spec §4.H "per-competency Cronbach-α over its active items").
    async fn refresh_competency_reliability(&self, catalog: &BTreeMap<ID<Competency>, Vec<AssessmentQuestion>>) -> Result<usize, AssessmentError> {
        let mut updated = 0;
        for (&competency_id, items) in catalog {
            if items.is_empty() {
                continue;
            }
            let item_ids: Vec<ID<AssessmentQuestion>> = items.iter().map(|i| i.id()).collect();
            let (key_ids, vectors) = self.respondent_vectors(&item_ids).await?;
            let alpha = cronbach_alpha(&key_ids, &vectors);
            let deleted = alpha_if_deleted(&key_ids, &vectors);
            let reliability = CompetencyReliability::new(competency_id, alpha, vectors.len() as u32, key_ids.len() as u32, RELIABILITY_MIN_SAMPLE, deleted);
            self.items.upsert_competency_reliability(&reliability).await?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Aggregates α per Big Five trait over the items of every competency
    /// that maps to it (spec §4.H "per-Big-Five trait α aggregated over its
    /// contributing competencies' items").
    async fn refresh_big_five_reliability(&self, catalog: &BTreeMap<ID<Competency>, Vec<AssessmentQuestion>>) -> Result<usize, AssessmentError> {
        let mut by_trait: BTreeMap<BigFiveTrait, Vec<ID<AssessmentQuestion>>> = BTreeMap::new();
        for (&competency_id, items) in catalog {
            let Some(competency) = self.items.get_competency(competency_id).await? else {
                continue;
            };
            let Some(trait_) = competency.big_five_trait() else {
                continue;
            };
            by_trait.entry(trait_).or_default().extend(items.iter().map(|i| i.id()));
        }

        let mut updated = 0;
        for trait_ in BigFiveTrait::all() {
            let Some(item_ids) = by_trait.get(&trait_) else {
                continue;
            };
            if item_ids.is_empty() {
                continue;
            }
            let (key_ids, vectors) = self.respondent_vectors(item_ids).await?;
            let alpha = cronbach_alpha(&key_ids, &vectors);
            let reliability = BigFiveReliability::new(trait_, alpha, vectors.len() as u32, key_ids.len() as u32, RELIABILITY_MIN_SAMPLE);
            self.items.upsert_big_five_reliability(&reliability).await?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Builds one respondent vector per session that answered every item in
    /// `item_ids`, keyed by item id string (matching
    /// `CompetencyReliability::alpha_if_deleted`'s string keys).
    async fn respondent_vectors(&self, item_ids: &[ID<AssessmentQuestion>]) -> Result<(Vec<String>, Vec<RespondentVector>), AssessmentError> {
        let key_ids: Vec<String> = item_ids.iter().map(|id| id.inner().to_string()).collect();
        let mut by_session: BTreeMap<uuid::Uuid, RespondentVector> = BTreeMap::new();

        for &item_id in item_ids {
            let Some(question) = self.items.get_item(item_id).await? else {
                continue;
            };
            let key = item_id.inner().to_string();
            for answer in self.answers.list_for_question(item_id).await? {
                if let Some(score) = normalized_question_score(&question, Some(&answer)) {
                    by_session.entry(answer.session_id().inner()).or_default().insert(key.clone(), score);
                }
            }
        }

        let vectors: Vec<RespondentVector> = by_session.into_values().filter(|v| v.len() == key_ids.len()).collect();
        Ok((key_ids, vectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_blueprint::Goal;
    use ac_items::AnswerOption;
    use ac_items::BehavioralIndicator;
    use ac_items::Competency;
    use ac_items::ContextScope;
    use ac_items::InMemoryItemRepository;
    use ac_items::QuestionType;
    use ac_items::ScoringRubric;
    use ac_scoring::InMemoryResultRepository;
    use ac_scoring::TestResult;
    use ac_scoring::TestResultStatus;
    use ac_session::AnswerPayload;
    use ac_session::InMemoryAnswerRepository;
    use ac_session::TestAnswer;
    use std::collections::BTreeMap as StdBTreeMap;

    fn likert_item(indicator: ID<BehavioralIndicator>) -> AssessmentQuestion {
        AssessmentQuestion::new(
            ID::default(),
            indicator,
            "How often do you take initiative?".into(),
            QuestionType::Likert,
            Vec::<AnswerOption>::new(),
            ScoringRubric::Likert,
            DifficultyBand::Foundational,
            60,
        )
        .unwrap()
    }

    #[allow(clippy::too_many_arguments)]
    async fn seed_respondent(
        answers: &InMemoryAnswerRepository,
        results: &InMemoryResultRepository,
        item_id: ID<AssessmentQuestion>,
        template_id: ID<ac_blueprint::TestTemplate>,
        likert_value: u8,
        overall: f64,
    ) {
        let session_id: ID<ac_session::TestSession> = ID::default();
        let answer = TestAnswer::new(session_id, item_id, AnswerPayload::Likert(likert_value), DateTime::UNIX_EPOCH, 30);
        answers.upsert(&answer).await.unwrap();
        let result = TestResult::new(
            session_id,
            template_id,
            Goal::Overview,
            None,
            TestResultStatus::Completed,
            overall,
            overall * 100.0,
            true,
            StdBTreeMap::new(),
            None,
            serde_json::json!({}),
            1,
            0,
            30,
            DateTime::UNIX_EPOCH,
        );
        results.insert_if_absent(result).await.unwrap();
    }

    #[tokio::test]
    async fn an_item_with_high_discrimination_graduates_from_probation() {
        let items = InMemoryItemRepository::new();
        let answers = InMemoryAnswerRepository::new();
        let results = InMemoryResultRepository::new();

        let competency_id = ID::default();
        items.insert_competency(Competency::new(competency_id, "Leadership".into(), None));
        let indicator_id = ID::default();
        items.insert_indicator(BehavioralIndicator::new(indicator_id, competency_id, "Initiative".into(), ContextScope::Universal));
        let question = likert_item(indicator_id);
        let item_id = question.id();
        items.insert_item(question);

        let template_id = ID::default();
        for i in 0..60u8 {
            let likert = 1 + (i % 7);
            let overall = (likert as f64 - 1.0) / 6.0;
            seed_respondent(&answers, &results, item_id, template_id, likert, overall).await;
        }

        let analyser = PsychometricAnalyser::new(&items, &answers, &results);
        let settings = AnalyserSettings {
            min_responses: 50,
            review_dwell: chrono::Duration::days(30),
        };
        let report = analyser.analyse_all(settings, DateTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(report.items_failed, 0);
        assert_eq!(report.items_updated, 1);

        let stats = items.get_statistics(item_id).await.unwrap().unwrap();
        assert_eq!(stats.validity_status(), ValidityStatus::Active);
        assert!(stats.discrimination() > 0.9);
    }

    #[tokio::test]
    async fn an_item_below_the_response_floor_is_left_on_probation() {
        let items = InMemoryItemRepository::new();
        let answers = InMemoryAnswerRepository::new();
        let results = InMemoryResultRepository::new();

        let competency_id = ID::default();
        items.insert_competency(Competency::new(competency_id, "Leadership".into(), None));
        let indicator_id = ID::default();
        items.insert_indicator(BehavioralIndicator::new(indicator_id, competency_id, "Initiative".into(), ContextScope::Universal));
        let question = likert_item(indicator_id);
        let item_id = question.id();
        items.insert_item(question);

        let template_id = ID::default();
        for i in 0..10u8 {
            let likert = 1 + (i % 7);
            seed_respondent(&answers, &results, item_id, template_id, likert, 0.5).await;
        }

        let analyser = PsychometricAnalyser::new(&items, &answers, &results);
        let settings = AnalyserSettings {
            min_responses: 50,
            review_dwell: chrono::Duration::days(30),
        };
        let report = analyser.analyse_all(settings, DateTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(report.items_below_threshold, 1);
        assert_eq!(report.items_updated, 0);
        assert!(items.get_statistics(item_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn an_empty_catalog_produces_an_empty_report() {
        let items = InMemoryItemRepository::new();
        let answers = InMemoryAnswerRepository::new();
        let results = InMemoryResultRepository::new();
        let analyser = PsychometricAnalyser::new(&items, &answers, &results);
        let settings = AnalyserSettings {
            min_responses: 50,
            review_dwell: chrono::Duration::days(30),
        };
        let report = analyser.analyse_all(settings, DateTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(report.items_considered, 0);
        assert_eq!(report.items_updated, 0);
    }
}
