//! Error kinds surfaced by the tool execution core.
//!
//! Validation, policy and approval failures never retry; transient and
//! breaker-open failures do; application errors (a tool ran and reported a
//! negative outcome) never affect the circuit breaker.

use thiserror::Error;

/// Infrastructure-level failure: the tool (or a layer wrapping it) could not
/// run at all. Distinct from an application-level failure, which is carried
/// inside `ToolResult::error` instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid arguments: {0}")]
    ArgValidation(String),

    #[error("tool denied by policy: {0}")]
    PolicyDenied(String),

    #[error("operation rejected")]
    ApprovalRejected,

    #[error("temporarily unavailable")]
    BreakerOpen,

    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    #[error("cancelled")]
    Cancelled,

    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("denied by policy: {0}")]
    DeniedByPolicy(String),
}

/// The two retry-relevant buckets every `CoreError` falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Single classifier function: one place decides retryability, rather than
/// stringly-typed checks scattered at call sites.
pub fn classify(err: &CoreError) -> ErrorClass {
    match err {
        CoreError::Transient(_) | CoreError::BreakerOpen | CoreError::Cancelled => {
            ErrorClass::Transient
        }
        CoreError::ArgValidation(_)
        | CoreError::PolicyDenied(_)
        | CoreError::ApprovalRejected
        | CoreError::Permanent(_)
        | CoreError::NotFound(_)
        | CoreError::DeniedByPolicy(_) => ErrorClass::Permanent,
    }
}

/// Recognize errors that wrap a lower-level transient condition (timeouts,
/// connection resets, HTTP 429/503) even when they didn't originate as a
/// `CoreError::Transient`. Base tools return `anyhow::Error`; this inspects
/// the message to decide whether a shell exit or network failure is worth
/// retrying.
pub fn anyhow_is_transient(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    const MARKERS: &[&str] = &[
        "timed out",
        "timeout",
        "connection reset",
        "connection refused",
        "temporarily unavailable",
        "429",
        "503",
        "deadline exceeded",
    ];
    MARKERS.iter().any(|m| msg.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_variants_classify_transient() {
        assert_eq!(
            classify(&CoreError::Transient("x".into())),
            ErrorClass::Transient
        );
        assert_eq!(classify(&CoreError::BreakerOpen), ErrorClass::Transient);
    }

    #[test]
    fn application_level_variants_classify_permanent() {
        assert_eq!(
            classify(&CoreError::ArgValidation("x".into())),
            ErrorClass::Permanent
        );
        assert_eq!(classify(&CoreError::ApprovalRejected), ErrorClass::Permanent);
    }

    #[test]
    fn anyhow_timeout_message_is_transient() {
        let err = anyhow::anyhow!("request timed out after 30s");
        assert!(anyhow_is_transient(&err));
    }

    #[test]
    fn anyhow_generic_message_is_not_transient() {
        let err = anyhow::anyhow!("exit status 1");
        assert!(!anyhow_is_transient(&err));
    }
}
