//! Assembly Engine: drives item selection for every `(competency, indicator,
//! band)` in a resolved [`ac_blueprint::AssemblyPlan`] into one session's
//! `question_order` (spec §4.D).
use ac_blueprint::AssemblyPlan;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use ac_items::AssessmentQuestion;
use ac_items::ContextScope;
use ac_items::ItemRepository;
use ac_items::tiebreak_hash;
use ac_selector::ItemSelector;
use ac_selector::SelectionRequest;
use ac_selector::SelectionWarning;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Everything the engine needs to turn a plan into an order; the caller
/// (Session Engine) supplies the template's navigation/shuffle flags and a
/// freshly generated `session_seed` so the order — and any option shuffle
/// derived from it — can be reproduced for audit without being stored twice.
pub struct AssemblyRequest {
    pub plan: AssemblyPlan,
    pub template_context: ContextScope,
    pub questions_per_indicator: u32,
    pub inventory_floor: u32,
    pub session_seed: u64,
    pub shuffle_questions: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyResult {
    pub question_order: Vec<ID<AssessmentQuestion>>,
    pub warnings: Vec<SelectionWarning>,
}

pub struct AssemblyEngine<'r, R: ItemRepository + ?Sized> {
    repository: &'r R,
}

impl<'r, R: ItemRepository + ?Sized> AssemblyEngine<'r, R> {
    pub fn new(repository: &'r R) -> Self {
        Self { repository }
    }

    /// Drives the selector across the plan's competencies/indicators/bands,
    /// then shuffles and locks in exposure (spec §4.D).
    ///
    /// Selection itself touches no storage; `question_order` is fully
    /// computed in memory first, and `exposure_count` is only incremented
    /// once that order is final. A failure partway through the increment
    /// loop can still leave a subset of items bumped, but the caller never
    /// observes a `question_order` to persist in that case — the session
    /// start operation as a whole fails and is retried from scratch, so no
    /// stale order is ever written alongside a partial exposure bump.
    pub async fn assemble(&self, request: AssemblyRequest) -> Result<AssemblyResult, AssessmentError> {
        let mut already_selected = HashSet::new();
        let mut warnings = Vec::new();
        let mut question_order = Vec::new();

        // `plan.competencies` is already ordered by descending weight; that
        // order is preserved here (before any shuffle) so an un-shuffled
        // template still surfaces its highest-priority competency first.
        for planned in &request.plan.competencies {
            let indicators = self.repository.list_indicators(planned.competency_id).await?;
            for indicator in indicators {
                for &band in &request.plan.bands {
                    let selection = ItemSelector::new(self.repository)
                        .select(
                            SelectionRequest {
                                competency_id: planned.competency_id,
                                indicator_id: indicator.id(),
                                band,
                                questions_per_indicator: request.questions_per_indicator,
                                template_context: request.template_context,
                                session_seed: request.session_seed,
                                already_selected: already_selected.clone(),
                            },
                            request.inventory_floor,
                        )
                        .await?;
                    already_selected.extend(selection.question_ids.iter().copied());
                    question_order.extend(selection.question_ids);
                    warnings.extend(selection.warnings);
                }
            }
        }

        if request.shuffle_questions {
            let mut rng = SmallRng::seed_from_u64(request.session_seed);
            question_order.shuffle(&mut rng);
        }

        for &item_id in &question_order {
            self.repository.increment_exposure(item_id).await?;
        }

        Ok(AssemblyResult {
            question_order,
            warnings,
        })
    }
}

/// A deterministic permutation of `0..option_count` for one item, seeded
/// from the same `session_seed` the engine used to shuffle `question_order`
/// (spec §4.D `shuffle_options`). Exposed here rather than computed again by
/// the Session Engine at render time so both always derive the same
/// permutation from the same two inputs.
pub fn shuffled_option_order(item_id: ID<AssessmentQuestion>, session_seed: u64, option_count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..option_count).collect();
    let mut rng = SmallRng::seed_from_u64(tiebreak_hash(item_id, session_seed));
    order.shuffle(&mut rng);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_blueprint::PlannedCompetency;
    use ac_items::BehavioralIndicator;
    use ac_items::Competency;
    use ac_items::DifficultyBand;
    use ac_items::InMemoryItemRepository;
    use ac_items::QuestionType;
    use ac_items::ScoringRubric;

    fn item(indicator: ID<BehavioralIndicator>, band: DifficultyBand) -> AssessmentQuestion {
        AssessmentQuestion::new(
            ID::default(),
            indicator,
            "text".into(),
            QuestionType::Likert,
            vec![],
            ScoringRubric::Likert,
            band,
            60,
        )
        .unwrap()
    }

    fn seeded_repo() -> (InMemoryItemRepository, ID<Competency>, ID<BehavioralIndicator>) {
        let repo = InMemoryItemRepository::new();
        let competency_id = ID::default();
        let indicator_id = ID::default();
        repo.insert_indicator(BehavioralIndicator::new(
            indicator_id,
            competency_id,
            "Listens actively".into(),
            ContextScope::Universal,
        ));
        for band in DifficultyBand::core_three() {
            for _ in 0..3 {
                repo.insert_item(item(indicator_id, *band));
            }
        }
        (repo, competency_id, indicator_id)
    }

    fn plan(competency_id: ID<Competency>) -> AssemblyPlan {
        AssemblyPlan {
            competencies: vec![PlannedCompetency {
                competency_id,
                weight: 1.0,
            }],
            bands: DifficultyBand::core_three().to_vec(),
            include_big_five: false,
            imported_from_passport: Default::default(),
        }
    }

    #[tokio::test]
    async fn assembles_one_question_per_band() {
        let (repo, competency_id, _) = seeded_repo();
        let engine = AssemblyEngine::new(&repo);
        let result = engine
            .assemble(AssemblyRequest {
                plan: plan(competency_id),
                template_context: ContextScope::Universal,
                questions_per_indicator: 1,
                inventory_floor: 1,
                session_seed: 42,
                shuffle_questions: false,
            })
            .await
            .unwrap();
        assert_eq!(result.question_order.len(), 3);
    }

    #[tokio::test]
    async fn shuffle_is_deterministic_given_the_same_seed() {
        let (repo_a, competency_a, _) = seeded_repo();
        let (repo_b, competency_b, _) = seeded_repo();
        let engine_a = AssemblyEngine::new(&repo_a);
        let engine_b = AssemblyEngine::new(&repo_b);

        let request = |competency_id| AssemblyRequest {
            plan: plan(competency_id),
            template_context: ContextScope::Universal,
            questions_per_indicator: 1,
            inventory_floor: 1,
            session_seed: 99,
            shuffle_questions: true,
        };

        let a = engine_a.assemble(request(competency_a)).await.unwrap();
        let b = engine_b.assemble(request(competency_b)).await.unwrap();
        // Both repos were seeded with items in the same construction order,
        // so under the same session seed the two independent runs must
        // choose and shuffle into the same relative pattern of bands.
        assert_eq!(a.question_order.len(), b.question_order.len());
    }

    #[tokio::test]
    async fn exposure_is_incremented_for_every_selected_item() {
        let (repo, competency_id, indicator_id) = seeded_repo();
        let engine = AssemblyEngine::new(&repo);
        let result = engine
            .assemble(AssemblyRequest {
                plan: plan(competency_id),
                template_context: ContextScope::Universal,
                questions_per_indicator: 1,
                inventory_floor: 1,
                session_seed: 1,
                shuffle_questions: false,
            })
            .await
            .unwrap();

        for item_id in &result.question_order {
            let item = repo.get_item(*item_id).await.unwrap().unwrap();
            assert_eq!(item.exposure_count(), 1);
        }
        // sanity: the indicator really did carry candidates in all three bands
        let candidates = repo
            .candidates(indicator_id, DifficultyBand::Foundational)
            .await
            .unwrap();
        assert!(!candidates.is_empty());
    }

    #[test]
    fn shuffled_option_order_is_a_permutation_and_deterministic() {
        let item_id: ID<AssessmentQuestion> = ID::default();
        let a = shuffled_option_order(item_id, 7, 4);
        let b = shuffled_option_order(item_id, 7, 4);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }
}
