//! Competency Passport persistence, merge, and expiry (spec §4.I).
mod repository;

use ac_core::ID;
use ac_items::BigFiveTrait;
use ac_items::Competency;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use std::collections::BTreeMap;

pub use repository::InMemoryPassportRepository;
pub use repository::PassportRepository;

/// A per-user, goal-agnostic snapshot of competency scores (spec §3
/// `CompetencyPassport`). `source_result_id` is stored as a raw `Uuid`
/// rather than a typed `ID<TestResult>` — `ac-scoring` (which owns
/// `TestResult`) already depends on this crate to perform the upsert, so a
/// typed back-reference would form a dependency cycle. This pointer is never
/// dereferenced here; it is audit-trail metadata only.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CompetencyPassport {
    user_id: String,
    scores: BTreeMap<ID<Competency>, f64>,
    big_five_profile: Option<BTreeMap<BigFiveTrait, f64>>,
    last_assessed: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    source_result_id: Option<uuid::Uuid>,
}

impl CompetencyPassport {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
    pub fn scores(&self) -> &BTreeMap<ID<Competency>, f64> {
        &self.scores
    }
    pub fn score_for(&self, competency_id: ID<Competency>) -> Option<f64> {
        self.scores.get(&competency_id).copied()
    }
    pub fn big_five_profile(&self) -> Option<&BTreeMap<BigFiveTrait, f64>> {
        self.big_five_profile.as_ref()
    }
    pub fn last_assessed(&self) -> DateTime<Utc> {
        self.last_assessed
    }
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
    pub fn source_result_id(&self) -> Option<uuid::Uuid> {
        self.source_result_id
    }
    /// Spec §3 invariant / §8 property 9: an expired passport is reported as
    /// absent by lookups, but remains stored for audit.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Merges freshly scored competencies into an existing (or absent)
    /// passport (spec §4.I: "merge per-competency scores"). Per-competency
    /// scores not present in `new_scores` are carried over unchanged; the
    /// Big-Five profile, if supplied, fully replaces the stored one (a
    /// partial Big-Five result is never merged field-by-field, since it is
    /// only ever produced whole by the Overview strategy under the
    /// all-traits-reliable gate).
    pub fn upsert(
        existing: Option<CompetencyPassport>,
        user_id: impl Into<String>,
        new_scores: BTreeMap<ID<Competency>, f64>,
        big_five_profile: Option<BTreeMap<BigFiveTrait, f64>>,
        source_result_id: uuid::Uuid,
        max_age_days: i64,
        now: DateTime<Utc>,
    ) -> CompetencyPassport {
        let mut scores = existing.map(|p| p.scores).unwrap_or_default();
        scores.extend(new_scores);
        CompetencyPassport {
            user_id: user_id.into(),
            scores,
            big_five_profile,
            last_assessed: now,
            expires_at: now + Duration::days(max_age_days),
            source_result_id: Some(source_result_id),
        }
    }
}

/// Returns the passport only if it has not expired (spec §8 property 9).
pub fn effective(passport: &CompetencyPassport, now: DateTime<Utc>) -> Option<&CompetencyPassport> {
    if passport.is_expired(now) {
        None
    } else {
        Some(passport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(days: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::days(days)
    }

    #[test]
    fn expired_passport_is_absent_but_constructible() {
        let passport = CompetencyPassport::upsert(
            None,
            "clerk_123",
            BTreeMap::new(),
            None,
            uuid::Uuid::now_v7(),
            180,
            dt(0),
        );
        assert!(effective(&passport, dt(0)).is_some());
        assert!(effective(&passport, dt(181)).is_none());
        assert!(passport.is_expired(dt(181)));
    }

    #[test]
    fn upsert_merges_scores_keeping_untouched_competencies() {
        let comp_a = ID::default();
        let comp_b = ID::default();
        let mut first_scores = BTreeMap::new();
        first_scores.insert(comp_a, 70.0);
        let first = CompetencyPassport::upsert(
            None,
            "clerk_123",
            first_scores,
            None,
            uuid::Uuid::now_v7(),
            180,
            dt(0),
        );

        let mut second_scores = BTreeMap::new();
        second_scores.insert(comp_b, 90.0);
        let second = CompetencyPassport::upsert(
            Some(first),
            "clerk_123",
            second_scores,
            None,
            uuid::Uuid::now_v7(),
            180,
            dt(10),
        );

        assert_eq!(second.score_for(comp_a), Some(70.0));
        assert_eq!(second.score_for(comp_b), Some(90.0));
        assert_eq!(second.last_assessed(), dt(10));
    }

    #[test]
    fn upsert_overwrites_rescored_competency() {
        let comp_a = ID::default();
        let mut scores = BTreeMap::new();
        scores.insert(comp_a, 50.0);
        let first =
            CompetencyPassport::upsert(None, "clerk_123", scores, None, uuid::Uuid::now_v7(), 180, dt(0));

        let mut rescored = BTreeMap::new();
        rescored.insert(comp_a, 65.0);
        let second = CompetencyPassport::upsert(
            Some(first),
            "clerk_123",
            rescored,
            None,
            uuid::Uuid::now_v7(),
            180,
            dt(1),
        );
        assert_eq!(second.score_for(comp_a), Some(65.0));
    }
}
