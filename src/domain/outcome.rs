//! Per-item dispatch results.

use crate::domain::submission::SubmissionRecord;
use thiserror::Error;

/// Failure reported by a sender.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response (connect, timeout, I/O)
    #[error("transport error: {0}")]
    Transport(String),
    /// The payload could not be encoded
    #[error("failed to serialize payload: {0}")]
    Serialization(String),
    /// The remote side answered with a non-success status
    #[error("rejected with status {status}: {body}")]
    Rejected {
        /// HTTP (or transport-specific) status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },
    /// The sender panicked while handling this item
    #[error("sender panicked: {0}")]
    Panicked(String),
}

/// Why a dequeued item was not delivered.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No destination is configured for the payload's variant
    #[error("unsupported payload variant: {variant}")]
    UnsupportedVariant {
        /// Debug rendering of the variant tag
        variant: String,
    },
    /// The sender attempted delivery and failed
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    /// Shutdown came before the item was sent (waiting for a slot or still queued)
    #[error("dispatch cancelled by shutdown before sending")]
    Cancelled,
}

impl DispatchError {
    /// Whether a send slot was consumed for this failure.
    pub fn consumed_slot(&self) -> bool {
        matches!(self, DispatchError::Delivery(_))
    }
}

/// Outcome of processing one dequeued record.
#[derive(Debug)]
pub struct DispatchOutcome<P> {
    /// The record the outcome belongs to
    pub record: SubmissionRecord<P>,
    /// `Ok` when the sender reported success
    pub result: Result<(), DispatchError>,
}

impl<P> DispatchOutcome<P> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&DispatchError> {
        self.result.as_ref().err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::Rejected {
            status: 429,
            body: "too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "rejected with status 429: too many requests");

        let wrapped = DispatchError::from(err);
        assert_eq!(
            wrapped.to_string(),
            "rejected with status 429: too many requests"
        );
    }

    #[test]
    fn test_only_delivery_failures_consume_slots() {
        assert!(DispatchError::Delivery(DeliveryError::Transport("reset".into())).consumed_slot());
        assert!(!DispatchError::UnsupportedVariant {
            variant: "Unknown".into()
        }
        .consumed_slot());
        assert!(!DispatchError::Cancelled.consumed_slot());
    }

    #[test]
    fn test_outcome_accessors() {
        let record = SubmissionRecord::new((), "sig".to_string(), Instant::now(), 3);
        let outcome = DispatchOutcome {
            record,
            result: Err(DispatchError::Cancelled),
        };

        assert!(!outcome.is_success());
        assert!(matches!(outcome.error(), Some(DispatchError::Cancelled)));
        assert_eq!(outcome.record.sequence(), 3);
    }
}
