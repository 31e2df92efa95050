//! Test session lifecycle: assembling a session into a living state
//! machine, answer intake, anonymous access, and timeout handling.

mod anonymous;
mod answer;
mod engine;
mod repository;
mod session;

pub use anonymous::IssuedToken;
pub use anonymous::RateLimitRecord;
pub use anonymous::hash_token;
pub use anonymous::issue_token;
pub use answer::AnswerPayload;
pub use answer::TestAnswer;
pub use engine::CurrentQuestion;
pub use engine::STALE_AFTER;
pub use engine::SessionEngine;
pub use engine::SessionPolicy;
pub use engine::is_anonymous;
pub use repository::AnswerRepository;
pub use repository::InMemoryAnswerRepository;
pub use repository::InMemoryRateLimitRepository;
pub use repository::InMemorySessionRepository;
pub use repository::RateLimitRepository;
pub use repository::SessionRepository;
pub use session::SessionOwner;
pub use session::SessionStatus;
pub use session::TestSession;
