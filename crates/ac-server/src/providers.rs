//! O*NET and team-profile lookups (spec §4.F: "if an external dependency
//! (O*NET, team profile) is temporarily unavailable, the orchestrator
//! enqueues a retry ... before marking the result as Degraded").
//!
//! Neither upstream is in scope here (spec.md Non-goals). `ac-scoring`'s own
//! test suite models "integration not wired yet" with `UnreachableOnet`/
//! `UnreachableTeam` doubles that always return an error so the retry-then-
//! degrade path is exercised; these are the same shape, promoted out of
//! `#[cfg(test)]` into the production binary so `complete()` degrades
//! gracefully instead of panicking on a missing dependency.
use ac_blueprint::ONetProfile;
use ac_blueprint::TeamProfile;
use ac_core::AssessmentError;
use ac_scoring::OnetProfileProvider;
use ac_scoring::TeamProfileProvider;
use async_trait::async_trait;

pub struct UnavailableOnetProvider;

#[async_trait]
impl OnetProfileProvider for UnavailableOnetProvider {
    async fn fetch(&self, occupation_code: &str) -> Result<ONetProfile, AssessmentError> {
        Err(AssessmentError::precondition_failed(format!(
            "O*NET profile lookup is not integrated; cannot resolve occupation {occupation_code}"
        )))
    }
}

pub struct UnavailableTeamProvider;

#[async_trait]
impl TeamProfileProvider for UnavailableTeamProvider {
    async fn fetch(&self, team_id: &str) -> Result<TeamProfile, AssessmentError> {
        Err(AssessmentError::precondition_failed(format!(
            "team profile lookup is not integrated; cannot resolve team {team_id}"
        )))
    }
}
