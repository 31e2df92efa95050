use super::ItemRepository;
use crate::BehavioralIndicator;
use crate::BigFiveReliability;
use crate::BigFiveTrait;
use crate::Competency;
use crate::CompetencyReliability;
use crate::DifficultyBand;
use crate::ItemStatistics;
use crate::AssessmentQuestion;
use ac_core::AssessmentError;
use ac_core::Unique;
use ac_core::ID;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory fake repository for unit tests, avoiding a live database for
/// `ac-selector`/`ac-blueprint`/`ac-assembly`/`ac-scoring` tests.
#[derive(Default)]
pub struct InMemoryItemRepository {
    competencies: RwLock<HashMap<ID<Competency>, Competency>>,
    indicators: RwLock<HashMap<ID<BehavioralIndicator>, BehavioralIndicator>>,
    items: RwLock<HashMap<ID<AssessmentQuestion>, AssessmentQuestion>>,
    statistics: RwLock<HashMap<ID<AssessmentQuestion>, ItemStatistics>>,
    competency_reliability: RwLock<HashMap<ID<Competency>, CompetencyReliability>>,
    big_five_reliability: RwLock<HashMap<BigFiveTrait, BigFiveReliability>>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert_competency(&self, competency: Competency) {
        self.competencies.write().unwrap().insert(competency.id(), competency);
    }
    pub fn insert_indicator(&self, indicator: BehavioralIndicator) {
        self.indicators.write().unwrap().insert(indicator.id(), indicator);
    }
    pub fn insert_item(&self, item: AssessmentQuestion) {
        self.items.write().unwrap().insert(item.id(), item);
    }
    pub fn insert_statistics(&self, stats: ItemStatistics) {
        self.statistics.write().unwrap().insert(stats.id(), stats);
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn get_competency(&self, id: ID<Competency>) -> Result<Option<Competency>, AssessmentError> {
        Ok(self.competencies.read().unwrap().get(&id).cloned())
    }
    async fn list_active_competencies(&self) -> Result<Vec<Competency>, AssessmentError> {
        Ok(self
            .competencies
            .read()
            .unwrap()
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect())
    }
    async fn get_indicator(
        &self,
        id: ID<BehavioralIndicator>,
    ) -> Result<Option<BehavioralIndicator>, AssessmentError> {
        Ok(self.indicators.read().unwrap().get(&id).cloned())
    }
    async fn list_indicators(
        &self,
        competency_id: ID<Competency>,
    ) -> Result<Vec<BehavioralIndicator>, AssessmentError> {
        Ok(self
            .indicators
            .read()
            .unwrap()
            .values()
            .filter(|i| i.competency_id() == competency_id)
            .cloned()
            .collect())
    }
    async fn sibling_indicators(
        &self,
        competency_id: ID<Competency>,
        excluding: ID<BehavioralIndicator>,
    ) -> Result<Vec<BehavioralIndicator>, AssessmentError> {
        Ok(self
            .indicators
            .read()
            .unwrap()
            .values()
            .filter(|i| i.competency_id() == competency_id && i.id() != excluding)
            .cloned()
            .collect())
    }
    async fn candidates(
        &self,
        indicator_id: ID<BehavioralIndicator>,
        band: DifficultyBand,
    ) -> Result<Vec<AssessmentQuestion>, AssessmentError> {
        Ok(self
            .items
            .read()
            .unwrap()
            .values()
            .filter(|i| i.indicator_id() == indicator_id && i.difficulty_band() == band && i.is_active())
            .cloned()
            .collect())
    }
    async fn get_items(
        &self,
        ids: &[ID<AssessmentQuestion>],
    ) -> Result<Vec<AssessmentQuestion>, AssessmentError> {
        let items = self.items.read().unwrap();
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }
    async fn get_item(
        &self,
        id: ID<AssessmentQuestion>,
    ) -> Result<Option<AssessmentQuestion>, AssessmentError> {
        Ok(self.items.read().unwrap().get(&id).cloned())
    }
    async fn increment_exposure(&self, id: ID<AssessmentQuestion>) -> Result<(), AssessmentError> {
        let mut items = self.items.write().unwrap();
        match items.get_mut(&id) {
            Some(item) => {
                item.bump_exposure();
                Ok(())
            }
            None => Err(AssessmentError::not_found("AssessmentQuestion", id)),
        }
    }
    async fn get_statistics(
        &self,
        item_id: ID<AssessmentQuestion>,
    ) -> Result<Option<ItemStatistics>, AssessmentError> {
        Ok(self.statistics.read().unwrap().get(&item_id).cloned())
    }
    async fn upsert_statistics(&self, stats: &ItemStatistics) -> Result<(), AssessmentError> {
        self.statistics.write().unwrap().insert(stats.id(), stats.clone());
        Ok(())
    }
    async fn items_due_for_analysis(
        &self,
        min_responses: u32,
    ) -> Result<Vec<ID<AssessmentQuestion>>, AssessmentError> {
        Ok(self
            .statistics
            .read()
            .unwrap()
            .values()
            .filter(|s| s.response_count() >= min_responses)
            .map(|s| s.item_id())
            .collect())
    }
    async fn get_competency_reliability(
        &self,
        competency_id: ID<Competency>,
    ) -> Result<Option<CompetencyReliability>, AssessmentError> {
        Ok(self
            .competency_reliability
            .read()
            .unwrap()
            .get(&competency_id)
            .cloned())
    }
    async fn upsert_competency_reliability(
        &self,
        reliability: &CompetencyReliability,
    ) -> Result<(), AssessmentError> {
        self.competency_reliability
            .write()
            .unwrap()
            .insert(reliability.competency_id(), reliability.clone());
        Ok(())
    }
    async fn get_big_five_reliability(
        &self,
        trait_: BigFiveTrait,
    ) -> Result<Option<BigFiveReliability>, AssessmentError> {
        Ok(self.big_five_reliability.read().unwrap().get(&trait_).cloned())
    }
    async fn upsert_big_five_reliability(
        &self,
        reliability: &BigFiveReliability,
    ) -> Result<(), AssessmentError> {
        self.big_five_reliability
            .write()
            .unwrap()
            .insert(reliability.trait_(), reliability.clone());
        Ok(())
    }
    async fn all_big_five_reliability(&self) -> Result<Vec<BigFiveReliability>, AssessmentError> {
        Ok(self.big_five_reliability.read().unwrap().values().cloned().collect())
    }
}
