//! Item repository and psychometric statistics (spec §4.A).
//!
//! ## Catalog
//!
//! - [`Competency`] / [`BigFiveTrait`] — top-level skill categories
//! - [`BehavioralIndicator`] / [`ContextScope`] — indicators beneath a competency
//! - [`AssessmentQuestion`] / [`QuestionType`] / [`DifficultyBand`] / [`ScoringRubric`] — items
//!
//! ## Statistics
//!
//! - [`ItemStatistics`] / [`ValidityStatus`] / [`DifficultyFlag`] / [`DiscriminationFlag`]
//! - [`CompetencyReliability`] / [`BigFiveReliability`] / [`ReliabilityStatus`]
//!
//! ## Storage
//!
//! - [`ItemRepository`] — storage abstraction; [`InMemoryItemRepository`] for
//!   tests, `Arc<tokio_postgres::Client>` for production.
mod competency;
mod indicator;
mod question;
mod reliability;
mod repository;
mod statistics;

pub use competency::BigFiveTrait;
pub use competency::Competency;
pub use indicator::BehavioralIndicator;
pub use indicator::ContextScope;
pub use question::AnswerOption;
pub use question::AssessmentQuestion;
pub use question::DifficultyBand;
pub use question::QuestionType;
pub use question::ScoringRubric;
pub use reliability::BigFiveReliability;
pub use reliability::CompetencyReliability;
pub use reliability::ReliabilityStatus;
pub use reliability::all_traits_reliable;
pub use repository::InMemoryItemRepository;
pub use repository::ItemRepository;
pub use repository::tiebreak_hash;
pub use statistics::DifficultyFlag;
pub use statistics::DiscriminationFlag;
pub use statistics::IrtFit;
pub use statistics::ItemStatistics;
pub use statistics::StatusChange;
pub use statistics::ValidityStatus;
