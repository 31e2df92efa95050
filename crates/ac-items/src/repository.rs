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

/// Repository abstraction over item storage (spec §4.A). Exposed as a trait
/// so `ac-selector`/`ac-blueprint`/`ac-assembly` are unit-testable without a
/// live database, matching the teacher's `impl Trait for Arc<Client>` idiom
/// (`rbp-auth::repository`, `rbp-gameroom::repository`).
///
/// Lookups return `Ok(None)`/`Ok(vec![])` on a missing row rather than an
/// error (spec §4.A failure semantics: "on missing lookup, return not found
/// to callers, never raise").
#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn get_competency(&self, id: ID<Competency>) -> Result<Option<Competency>, AssessmentError>;
    async fn list_active_competencies(&self) -> Result<Vec<Competency>, AssessmentError>;
    async fn get_indicator(
        &self,
        id: ID<BehavioralIndicator>,
    ) -> Result<Option<BehavioralIndicator>, AssessmentError>;
    async fn list_indicators(
        &self,
        competency_id: ID<Competency>,
    ) -> Result<Vec<BehavioralIndicator>, AssessmentError>;
    async fn sibling_indicators(
        &self,
        competency_id: ID<Competency>,
        excluding: ID<BehavioralIndicator>,
    ) -> Result<Vec<BehavioralIndicator>, AssessmentError>;

    /// Candidates for one `(indicator, band)` request, pre-filtered to
    /// `active=true`; ordering (exposure ascending, deterministic tiebreak)
    /// is the caller's (`ac-selector`) responsibility since it depends on a
    /// per-session seed.
    async fn candidates(
        &self,
        indicator_id: ID<BehavioralIndicator>,
        band: DifficultyBand,
    ) -> Result<Vec<AssessmentQuestion>, AssessmentError>;

    async fn get_items(
        &self,
        ids: &[ID<AssessmentQuestion>],
    ) -> Result<Vec<AssessmentQuestion>, AssessmentError>;

    async fn get_item(
        &self,
        id: ID<AssessmentQuestion>,
    ) -> Result<Option<AssessmentQuestion>, AssessmentError>;

    /// Atomic, monotone increment, retried on write contention (spec §4.A).
    async fn increment_exposure(&self, id: ID<AssessmentQuestion>) -> Result<(), AssessmentError>;

    async fn get_statistics(
        &self,
        item_id: ID<AssessmentQuestion>,
    ) -> Result<Option<ItemStatistics>, AssessmentError>;

    async fn upsert_statistics(&self, stats: &ItemStatistics) -> Result<(), AssessmentError>;

    /// All items with at least `min_responses` responses, for the
    /// psychometric job's batch (spec §4.H).
    async fn items_due_for_analysis(
        &self,
        min_responses: u32,
    ) -> Result<Vec<ID<AssessmentQuestion>>, AssessmentError>;

    async fn get_competency_reliability(
        &self,
        competency_id: ID<Competency>,
    ) -> Result<Option<CompetencyReliability>, AssessmentError>;
    async fn upsert_competency_reliability(
        &self,
        reliability: &CompetencyReliability,
    ) -> Result<(), AssessmentError>;
    async fn get_big_five_reliability(
        &self,
        trait_: BigFiveTrait,
    ) -> Result<Option<BigFiveReliability>, AssessmentError>;
    async fn upsert_big_five_reliability(
        &self,
        reliability: &BigFiveReliability,
    ) -> Result<(), AssessmentError>;
    async fn all_big_five_reliability(&self) -> Result<Vec<BigFiveReliability>, AssessmentError>;
}

/// Deterministic tiebreak hash used by `ac-selector` when two candidates
/// have equal `exposure_count` (spec §4.A/§4.B: "stable hash of id + a
/// session seed").
pub fn tiebreak_hash(item_id: ID<AssessmentQuestion>, session_seed: u64) -> u64 {
    use std::hash::Hash;
    use std::hash::Hasher;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    item_id.inner().hash(&mut hasher);
    session_seed.hash(&mut hasher);
    hasher.finish()
}

pub mod memory;
pub mod postgres;

pub use memory::InMemoryItemRepository;
