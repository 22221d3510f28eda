//! Non-fatal diagnostics.
//!
//! No cache or payload operation fails under normal key/value types, so
//! these are never returned as errors. They exist to give the conditions a
//! stable type and message when they are logged.

use thiserror::Error;

use crate::payload::SubscriptionId;

/// Conditions that are reported, not raised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheDiagnostic {
    /// A value was requested with no enclosing scope. The request degrades
    /// to permanent loading; nothing crashes.
    #[error("cache scope not found; requests degrade to permanent loading")]
    ScopeMissing,

    /// Unsubscribe was called with an id that has no registration, which
    /// signals a double-unsubscribe or an unsubscribe after the
    /// registration was already dropped.
    #[error("failed to unsubscribe {id:?}: no such registration")]
    UnsubscribeNotFound {
        /// The id that had no registration.
        id: SubscriptionId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_messages() {
        assert_eq!(
            CacheDiagnostic::ScopeMissing.to_string(),
            "cache scope not found; requests degrade to permanent loading"
        );
        let message = CacheDiagnostic::UnsubscribeNotFound {
            id: SubscriptionId(7),
        }
        .to_string();
        assert!(message.starts_with("failed to unsubscribe"));
    }
}
