//! Identifiers, error taxonomy, and runtime scaffolding shared across the
//! assessment core crates.
//!
//! ## Identity
//!
//! - [`ID`] — type-safe UUID wrapper, parameterized by marker type
//! - [`Unique`] — trait for entities exposing a typed identifier
//!
//! ## Errors & context
//!
//! - [`AssessmentError`] — the transport-agnostic error taxonomy (spec §7)
//! - [`Context`] / [`Actor`] — explicit per-call context (deadline, actor,
//!   correlation id) replacing mutable global singletons (spec §9)
//! - [`retry::with_backoff`] — bounded exponential backoff for contention
//!
//! ## Configuration & logging
//!
//! - [`Config`] — environment-driven process configuration
//! - [`init_logging`] — dual terminal/file logger initialization (server feature)
mod config;
mod context;
mod error;
mod id;
pub mod retry;

#[cfg(feature = "server")]
mod logging;

pub use config::Config;
pub use context::Actor;
pub use context::Context;
pub use error::AssessmentError;
pub use id::Unique;
pub use id::ID;

#[cfg(feature = "server")]
pub use logging::init_logging;

/// Generates a fresh correlation id for error reporting and audit trails.
pub fn correlation_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
