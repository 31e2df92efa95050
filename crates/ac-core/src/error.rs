use std::fmt::Display;
use std::fmt::Formatter;

/// Transport-agnostic error taxonomy for the assessment core (spec §7).
///
/// Every public operation in `ac-items`, `ac-selector`, `ac-blueprint`,
/// `ac-assembly`, `ac-session`, `ac-scoring`, `ac-psychometrics`, and
/// `ac-passport` returns `Result<_, AssessmentError>`. The HTTP layer
/// (`ac-server`) maps each variant onto a status code via [`status_hint`].
#[derive(Debug, Clone)]
pub enum AssessmentError {
    ResourceNotFound { entity: &'static str, id: String },
    InvalidState { message: String },
    InvalidArgument { message: String },
    Conflict { message: String },
    PreconditionFailed { message: String },
    Unauthenticated,
    PermissionDenied { message: String },
    RateLimited { retry_after_secs: u64 },
    DeadlineExceeded { operation: &'static str },
    Internal { message: String, correlation_id: String },
}

impl AssessmentError {
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::ResourceNotFound {
            entity,
            id: id.to_string(),
        }
    }
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }
    pub fn internal(message: impl Into<String>) -> Self {
        let correlation_id = crate::correlation_id();
        let message = message.into();
        log::error!("[internal] {} (correlation_id={})", message, correlation_id);
        Self::Internal {
            message,
            correlation_id,
        }
    }

    /// HTTP status code this error should be reported under (spec §6/§7).
    pub fn status_hint(&self) -> u16 {
        match self {
            Self::ResourceNotFound { .. } => 404,
            Self::InvalidState { .. } => 400,
            Self::InvalidArgument { .. } => 400,
            Self::Conflict { .. } => 409,
            Self::PreconditionFailed { .. } => 412,
            Self::Unauthenticated => 401,
            Self::PermissionDenied { .. } => 403,
            Self::RateLimited { .. } => 429,
            Self::DeadlineExceeded { .. } => 504,
            Self::Internal { .. } => 500,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Internal { correlation_id, .. } => Some(correlation_id),
            _ => None,
        }
    }
}

impl Display for AssessmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceNotFound { entity, id } => write!(f, "{} not found: {}", entity, id),
            Self::InvalidState { message } => write!(f, "invalid state: {}", message),
            Self::InvalidArgument { message } => write!(f, "invalid argument: {}", message),
            Self::Conflict { message } => write!(f, "conflict: {}", message),
            Self::PreconditionFailed { message } => write!(f, "precondition failed: {}", message),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::PermissionDenied { message } => write!(f, "permission denied: {}", message),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "rate limited, retry after {}s", retry_after_secs)
            }
            Self::DeadlineExceeded { operation } => {
                write!(f, "deadline exceeded during {}", operation)
            }
            Self::Internal {
                message,
                correlation_id,
            } => write!(f, "internal error ({}): {}", correlation_id, message),
        }
    }
}

impl std::error::Error for AssessmentError {}

impl From<tokio_postgres::Error> for AssessmentError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_hints_match_spec_table() {
        assert_eq!(AssessmentError::not_found("Item", "x").status_hint(), 404);
        assert_eq!(AssessmentError::invalid_state("x").status_hint(), 400);
        assert_eq!(AssessmentError::conflict("x").status_hint(), 409);
        assert_eq!(AssessmentError::precondition_failed("x").status_hint(), 412);
        assert_eq!(AssessmentError::Unauthenticated.status_hint(), 401);
        assert_eq!(AssessmentError::permission_denied("x").status_hint(), 403);
        assert_eq!(
            AssessmentError::RateLimited {
                retry_after_secs: 10
            }
            .status_hint(),
            429
        );
        assert_eq!(
            AssessmentError::DeadlineExceeded { operation: "x" }.status_hint(),
            504
        );
        assert_eq!(AssessmentError::internal("x").status_hint(), 500);
    }

    #[test]
    fn internal_error_carries_correlation_id() {
        let err = AssessmentError::internal("boom");
        assert!(err.correlation_id().is_some());
    }
}
