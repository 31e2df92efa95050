//! Item selection policy for one `(competency, indicator, difficulty band)`
//! request (spec §4.B). Pure over the [`ItemRepository`] trait, so it is
//! unit-testable against [`ac_items::InMemoryItemRepository`] without a
//! database.
use ac_core::AssessmentError;
use ac_core::ID;
use ac_core::Unique;
use ac_items::AssessmentQuestion;
use ac_items::BehavioralIndicator;
use ac_items::Competency;
use ac_items::ContextScope;
use ac_items::DifficultyBand;
use ac_items::ItemRepository;
use ac_items::tiebreak_hash;
use std::collections::HashSet;

/// Non-fatal conditions surfaced alongside a selection (spec §4.B).
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionWarning {
    /// An indicator's band was empty; items were borrowed from a sibling
    /// indicator in the same competency.
    BorrowingOccurred {
        indicator_id: ID<BehavioralIndicator>,
        borrowed_from: ID<BehavioralIndicator>,
        band: DifficultyBand,
    },
    /// Candidate exposure is low enough that the pool risks running dry.
    InventoryLow {
        indicator_id: ID<BehavioralIndicator>,
        band: DifficultyBand,
    },
}

/// One `(competency, indicator, band)` selection request (spec §4.B).
pub struct SelectionRequest {
    pub competency_id: ID<Competency>,
    pub indicator_id: ID<BehavioralIndicator>,
    pub band: DifficultyBand,
    pub questions_per_indicator: u32,
    pub template_context: ContextScope,
    pub session_seed: u64,
    /// Items already locked into this session's order, across all prior
    /// `(indicator, band)` requests (spec §4.B rule 4: no repeats in session).
    pub already_selected: HashSet<ID<AssessmentQuestion>>,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub question_ids: Vec<ID<AssessmentQuestion>>,
    pub warnings: Vec<SelectionWarning>,
}

pub struct ItemSelector<'r, R: ItemRepository + ?Sized> {
    repository: &'r R,
}

impl<'r, R: ItemRepository + ?Sized> ItemSelector<'r, R> {
    pub fn new(repository: &'r R) -> Self {
        Self { repository }
    }

    /// Runs the full selection policy (spec §4.B, priority order 1-6).
    pub async fn select(
        &self,
        request: SelectionRequest,
        inventory_floor: u32,
    ) -> Result<SelectionResult, AssessmentError> {
        let mut warnings = Vec::new();

        // 1. Coverage first: fetch this indicator's candidates, borrowing
        // from the best-matching sibling in the same competency if empty
        // (rule 5's context-match applies here: context_scope lives on the
        // indicator, so it governs which sibling we borrow from).
        let mut candidates = self
            .repository
            .candidates(request.indicator_id, request.band)
            .await?;
        if candidates.is_empty() {
            if let Some((sibling, borrowed)) =
                self.best_sibling_donor(&request).await?
            {
                warnings.push(SelectionWarning::BorrowingOccurred {
                    indicator_id: request.indicator_id,
                    borrowed_from: sibling,
                    band: request.band,
                });
                candidates = borrowed;
            }
        }

        // 3. Freshness: exclude items whose statistics are not eligible for
        // a new assembly (FlaggedForReview/Retired).
        let mut eligible = Vec::with_capacity(candidates.len());
        for item in candidates {
            let stats = self.repository.get_statistics(item.id()).await?;
            let ok = stats.as_ref().is_none_or(|s| s.is_eligible_for_new_assembly());
            if ok {
                eligible.push(item);
            }
        }

        // 4. Diversity: drop items already locked into this session.
        eligible.retain(|item| !request.already_selected.contains(&item.id()));

        // 6. Overexposure cap: warn (never block) if the pool looks thin.
        let total_exposure: u64 = eligible.iter().map(|i| i.exposure_count()).sum();
        if total_exposure < inventory_floor as u64 {
            warnings.push(SelectionWarning::InventoryLow {
                indicator_id: request.indicator_id,
                band: request.band,
            });
        }

        // 2. Exposure balancing: ascending exposure_count, deterministic
        // tiebreak by stable hash of (item id, session seed).
        eligible.sort_by(|a, b| {
            a.exposure_count().cmp(&b.exposure_count()).then(
                tiebreak_hash(a.id(), request.session_seed)
                    .cmp(&tiebreak_hash(b.id(), request.session_seed)),
            )
        });

        let question_ids = eligible
            .into_iter()
            .take(request.questions_per_indicator as usize)
            .map(|item| item.id())
            .collect();

        Ok(SelectionResult {
            question_ids,
            warnings,
        })
    }

    /// Finds the sibling indicator (in the same competency) with a non-empty
    /// band whose own `context_scope` best matches the template's context,
    /// falling back to `Universal` (spec §4.B rule 5).
    async fn best_sibling_donor(
        &self,
        request: &SelectionRequest,
    ) -> Result<Option<(ID<BehavioralIndicator>, Vec<AssessmentQuestion>)>, AssessmentError> {
        let siblings = self
            .repository
            .sibling_indicators(request.competency_id, request.indicator_id)
            .await?;

        let mut donors = Vec::new();
        for sibling in siblings {
            let items = self.repository.candidates(sibling.id(), request.band).await?;
            if !items.is_empty() {
                donors.push((sibling, items));
            }
        }

        donors.sort_by_key(|(sibling, _)| {
            if sibling.context_scope() == request.template_context {
                0
            } else if sibling.context_scope() == ContextScope::Universal {
                1
            } else {
                2
            }
        });

        Ok(donors.into_iter().next().map(|(sibling, items)| (sibling.id(), items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_items::BigFiveTrait;
    use ac_items::InMemoryItemRepository;
    use ac_items::ItemStatistics;
    use ac_items::QuestionType;
    use ac_items::ScoringRubric;
    use ac_items::ValidityStatus;
    use chrono::Utc;

    fn item(
        indicator: ID<BehavioralIndicator>,
        band: DifficultyBand,
        exposure: u64,
    ) -> AssessmentQuestion {
        let mut q = AssessmentQuestion::new(
            ID::default(),
            indicator,
            "text".into(),
            QuestionType::Likert,
            vec![],
            ScoringRubric::Likert,
            band,
            60,
        )
        .unwrap();
        for _ in 0..exposure {
            q.bump_exposure();
        }
        q
    }

    #[tokio::test]
    async fn prefers_low_exposure_items() {
        let repo = InMemoryItemRepository::new();
        let competency_id = ID::default();
        let indicator_id = ID::default();
        repo.insert_indicator(BehavioralIndicator::new(
            indicator_id,
            competency_id,
            "Listens actively".into(),
            ContextScope::Universal,
        ));
        let low = item(indicator_id, DifficultyBand::Foundational, 1);
        let high = item(indicator_id, DifficultyBand::Foundational, 50);
        let low_id = low.id();
        repo.insert_item(low);
        repo.insert_item(high);

        let selector = ItemSelector::new(&repo);
        let result = selector
            .select(
                SelectionRequest {
                    competency_id,
                    indicator_id,
                    band: DifficultyBand::Foundational,
                    questions_per_indicator: 1,
                    template_context: ContextScope::Universal,
                    session_seed: 7,
                    already_selected: HashSet::new(),
                },
                5,
            )
            .await
            .unwrap();
        assert_eq!(result.question_ids, vec![low_id]);
    }

    #[tokio::test]
    async fn borrows_from_sibling_when_band_empty() {
        let repo = InMemoryItemRepository::new();
        let competency_id = ID::default();
        let empty_indicator = ID::default();
        let sibling_indicator = ID::default();
        repo.insert_indicator(BehavioralIndicator::new(
            empty_indicator,
            competency_id,
            "Empty".into(),
            ContextScope::Universal,
        ));
        repo.insert_indicator(BehavioralIndicator::new(
            sibling_indicator,
            competency_id,
            "Sibling".into(),
            ContextScope::Universal,
        ));
        repo.insert_item(item(sibling_indicator, DifficultyBand::Foundational, 0));

        let selector = ItemSelector::new(&repo);
        let result = selector
            .select(
                SelectionRequest {
                    competency_id,
                    indicator_id: empty_indicator,
                    band: DifficultyBand::Foundational,
                    questions_per_indicator: 1,
                    template_context: ContextScope::Universal,
                    session_seed: 1,
                    already_selected: HashSet::new(),
                },
                5,
            )
            .await
            .unwrap();
        assert_eq!(result.question_ids.len(), 1);
        assert!(matches!(
            result.warnings.as_slice(),
            [SelectionWarning::BorrowingOccurred { .. }]
        ));
    }

    #[tokio::test]
    async fn borrowing_prefers_sibling_matching_template_context() {
        let repo = InMemoryItemRepository::new();
        let competency_id = ID::default();
        let empty_indicator = ID::default();
        let universal_sibling = ID::default();
        let technical_sibling = ID::default();
        repo.insert_indicator(BehavioralIndicator::new(
            empty_indicator,
            competency_id,
            "Empty".into(),
            ContextScope::Universal,
        ));
        repo.insert_indicator(BehavioralIndicator::new(
            universal_sibling,
            competency_id,
            "Universal sibling".into(),
            ContextScope::Universal,
        ));
        repo.insert_indicator(BehavioralIndicator::new(
            technical_sibling,
            competency_id,
            "Technical sibling".into(),
            ContextScope::Technical,
        ));
        let technical_item = item(technical_sibling, DifficultyBand::Foundational, 0);
        let technical_item_id = technical_item.id();
        repo.insert_item(item(universal_sibling, DifficultyBand::Foundational, 0));
        repo.insert_item(technical_item);

        let selector = ItemSelector::new(&repo);
        let result = selector
            .select(
                SelectionRequest {
                    competency_id,
                    indicator_id: empty_indicator,
                    band: DifficultyBand::Foundational,
                    questions_per_indicator: 1,
                    template_context: ContextScope::Technical,
                    session_seed: 1,
                    already_selected: HashSet::new(),
                },
                5,
            )
            .await
            .unwrap();
        assert_eq!(result.question_ids, vec![technical_item_id]);
    }

    #[tokio::test]
    async fn flagged_for_review_is_excluded_from_new_assembly() {
        let repo = InMemoryItemRepository::new();
        let competency_id = ID::default();
        let indicator_id = ID::default();
        repo.insert_indicator(BehavioralIndicator::new(
            indicator_id,
            competency_id,
            "Indicator".into(),
            ContextScope::Universal,
        ));
        let flagged = item(indicator_id, DifficultyBand::Foundational, 0);
        let flagged_id = flagged.id();
        repo.insert_item(flagged);
        let mut stats = ItemStatistics::new(flagged_id);
        stats
            .transition(ValidityStatus::FlaggedForReview, "critical discrimination", Utc::now())
            .unwrap();
        repo.insert_statistics(stats);

        let selector = ItemSelector::new(&repo);
        let result = selector
            .select(
                SelectionRequest {
                    competency_id,
                    indicator_id,
                    band: DifficultyBand::Foundational,
                    questions_per_indicator: 1,
                    template_context: ContextScope::Universal,
                    session_seed: 1,
                    already_selected: HashSet::new(),
                },
                5,
            )
            .await
            .unwrap();
        assert!(result.question_ids.is_empty());
    }

    #[tokio::test]
    async fn already_selected_items_are_excluded() {
        let repo = InMemoryItemRepository::new();
        let competency_id = ID::default();
        let indicator_id = ID::default();
        repo.insert_indicator(BehavioralIndicator::new(
            indicator_id,
            competency_id,
            "Indicator".into(),
            ContextScope::Universal,
        ));
        let seen = item(indicator_id, DifficultyBand::Foundational, 0);
        let seen_id = seen.id();
        repo.insert_item(seen);

        let selector = ItemSelector::new(&repo);
        let mut already_selected = HashSet::new();
        already_selected.insert(seen_id);
        let result = selector
            .select(
                SelectionRequest {
                    competency_id,
                    indicator_id,
                    band: DifficultyBand::Foundational,
                    questions_per_indicator: 1,
                    template_context: ContextScope::Universal,
                    session_seed: 1,
                    already_selected,
                },
                5,
            )
            .await
            .unwrap();
        assert!(result.question_ids.is_empty());
    }

    #[tokio::test]
    async fn low_total_exposure_raises_inventory_low_warning() {
        let repo = InMemoryItemRepository::new();
        let competency_id = ID::default();
        let indicator_id = ID::default();
        repo.insert_indicator(BehavioralIndicator::new(
            indicator_id,
            competency_id,
            "Indicator".into(),
            ContextScope::Universal,
        ));
        repo.insert_item(item(indicator_id, DifficultyBand::Foundational, 0));

        let selector = ItemSelector::new(&repo);
        let result = selector
            .select(
                SelectionRequest {
                    competency_id,
                    indicator_id,
                    band: DifficultyBand::Foundational,
                    questions_per_indicator: 1,
                    template_context: ContextScope::Universal,
                    session_seed: 1,
                    already_selected: HashSet::new(),
                },
                5,
            )
            .await
            .unwrap();
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, SelectionWarning::InventoryLow { .. })));
    }

    #[test]
    fn big_five_trait_is_reachable_from_items_reexport() {
        assert_eq!(BigFiveTrait::all().len(), 5);
    }
}
