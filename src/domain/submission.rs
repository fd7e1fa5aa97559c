//! Queued submissions.

use std::fmt;
use std::time::Instant;

/// One submission waiting for (or undergoing) delivery.
///
/// Records are immutable once enqueued. The sequence number is assigned when
/// the record is pushed and is unique per queue; pushes from one producer get
/// increasing numbers.
#[derive(Clone)]
pub struct SubmissionRecord<P> {
    payload: P,
    credential: String,
    enqueued_at: Instant,
    sequence: u64,
}

impl<P> SubmissionRecord<P> {
    pub(crate) fn new(payload: P, credential: String, enqueued_at: Instant, sequence: u64) -> Self {
        Self {
            payload,
            credential,
            enqueued_at,
            sequence,
        }
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Credential sent alongside the payload (a detached signature for documents).
    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Split the record back into its payload and credential.
    pub fn into_parts(self) -> (P, String) {
        (self.payload, self.credential)
    }
}

// Credentials stay out of debug output.
impl<P: fmt::Debug> fmt::Debug for SubmissionRecord<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionRecord")
            .field("sequence", &self.sequence)
            .field("payload", &self.payload)
            .field("credential", &"<redacted>")
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}
