//! Append-only activity and scoring-audit sinks (spec §3, §4.J). Neither
//! sink sits on a session's critical path: writers call the `_best_effort`
//! helpers, which retry with backoff and then log-and-drop rather than
//! propagate a failure to the caller.

mod audit;
mod event;

pub use audit::AuditSink;
pub use audit::InMemoryAuditSink;
pub use audit::ScoringAuditLog;
pub use audit::append_best_effort;
pub use event::ActivityEvent;
pub use event::ActivityEventKind;
pub use event::ActivitySink;
pub use event::InMemoryActivitySink;
pub use event::record_best_effort;
