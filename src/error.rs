use thiserror::Error;

/// Errors produced while driving a submission through the queue.
///
/// The propagation policy differs per variant:
/// - `LookupFailed` aborts the current submission silently (logged only);
///   it indicates a transient upstream problem, not bad requester input.
/// - `PlatformOperationFailed` is logged and remaining lifecycle steps are
///   still attempted, except when the failing step is the requester-thread
///   creation that everything downstream hangs off.
/// - `ValidationFailed` and `ContextRejected` are surfaced once to the
///   invoking user as an ephemeral response and change no state.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("reputation lookup failed: {reason}")]
    LookupFailed { reason: String },

    #[error("platform operation '{operation}' failed: {reason}")]
    PlatformOperationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("invalid input: {0}")]
    ValidationFailed(String),

    #[error("command used outside its valid channel or thread")]
    ContextRejected,
}

impl QueueError {
    pub fn platform(operation: &'static str, reason: impl Into<String>) -> Self {
        QueueError::PlatformOperationFailed {
            operation,
            reason: reason.into(),
        }
    }

    pub fn lookup(reason: impl Into<String>) -> Self {
        QueueError::LookupFailed {
            reason: reason.into(),
        }
    }
}
