//! Scoring orchestrator and per-goal strategies (spec §4.F/§4.G).
//!
//! ## Catalog
//!
//! - [`ScoringOrchestrator`] — the only entry point that turns a completed
//!   session into a [`TestResult`]; owns the audit/activity/passport
//!   side-effects around the strategy dispatch.
//! - [`GoalStrategy`] / [`ScoringContext`] / [`StrategyOutcome`] — the pure
//!   per-goal math, free of any I/O.
//! - [`OnetProfileProvider`] / [`TeamProfileProvider`] — the external lookups
//!   a Job-Fit or Team-Fit run needs, supplied by the caller.
//! - [`ResultRepository`] / [`InMemoryResultRepository`] — storage for the
//!   canonical scoring outcome.
mod orchestrator;
mod result;
mod scoring;
mod strategy;

pub use orchestrator::OnetProfileProvider;
pub use orchestrator::ScoringOrchestrator;
pub use orchestrator::TeamProfileProvider;
pub use result::CompetencyScoreBreakdown;
pub use result::InMemoryResultRepository;
pub use result::ResultRepository;
pub use result::TestResult;
pub use result::TestResultStatus;
pub use scoring::all_question_scores;
pub use scoring::competency_breakdown;
pub use scoring::mean;
pub use scoring::normalized_question_score;
pub use scoring::percentile_rank;
pub use scoring::stdev;
pub use strategy::GoalStrategy;
pub use strategy::ScoringContext;
pub use strategy::StrategyOutcome;
