use std::time::Duration;
use std::time::Instant;

/// Explicitly passed request context, replacing mutable global singletons
/// (spec §9 design notes: "Mutable global singletons ... become explicitly
/// passed context objects carrying dependencies + deadline + correlation id").
///
/// Every core operation that can fail with [`crate::AssessmentError::DeadlineExceeded`]
/// takes a `&Context` and checks [`Context::expired`] before/after I/O.
#[derive(Debug, Clone)]
pub struct Context {
    correlation_id: String,
    deadline: Option<Instant>,
    actor: Actor,
}

/// Who is driving this operation — used for audit trails and permission checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Member(String),
    Anonymous,
    System,
}

impl Context {
    pub fn new(actor: Actor) -> Self {
        Self {
            correlation_id: crate::correlation_id(),
            deadline: None,
            actor,
        }
    }

    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn system() -> Self {
        Self::new(Actor::System)
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// True once the caller-supplied deadline (spec §5) has passed.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_has_no_deadline_expiry() {
        let ctx = Context::system();
        assert!(!ctx.expired());
    }

    #[test]
    fn zero_duration_deadline_expires_immediately() {
        let ctx = Context::new(Actor::Anonymous).with_deadline(Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(1));
        assert!(ctx.expired());
    }
}
