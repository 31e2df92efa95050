//! Psychometric analyser (spec §4.H): computes p-value, point-biserial
//! discrimination, and Cronbach's α from stored responses, transitions item
//! validity status under hysteresis, and exposes the distributed scheduler
//! lock shared with the session-sweep task.
mod analyser;
mod lock;
mod metrics;
mod reliability;

pub use analyser::AnalyserSettings;
pub use analyser::AnalysisReport;
pub use analyser::PsychometricAnalyser;
pub use lock::InMemorySchedulerLockRepository;
pub use lock::SchedulerLock;
pub use lock::SchedulerLockRepository;
pub use lock::SchedulerLockTable;
pub use lock::run_under_lock;
pub use metrics::p_value;
pub use metrics::point_biserial;
pub use reliability::RespondentVector;
pub use reliability::alpha_if_deleted;
pub use reliability::cronbach_alpha;
