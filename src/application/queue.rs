//! Unbounded submission queue.
//!
//! Any number of [`SubmissionProducer`] clones push records; exactly one
//! [`SubmissionConsumer`] pops them in arrival order. Pushing never waits.

use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::domain::submission::SubmissionRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Error returned when a submission is not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The consumer is gone; nothing will dispatch this item
    #[error("submission queue is closed")]
    Closed,
}

/// Create a connected producer/consumer pair.
pub fn submission_queue<P>(
    clock: Arc<dyn Clock>,
    metrics: Metrics,
) -> (SubmissionProducer<P>, SubmissionConsumer<P>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let producer = SubmissionProducer {
        tx,
        clock,
        metrics,
        next_sequence: Arc::new(AtomicU64::new(0)),
    };
    (producer, SubmissionConsumer { rx })
}

/// Producer side of the queue.
///
/// Cheap to clone; every clone feeds the same consumer.
#[derive(Debug)]
pub struct SubmissionProducer<P> {
    tx: UnboundedSender<SubmissionRecord<P>>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    next_sequence: Arc<AtomicU64>,
}

impl<P> Clone for SubmissionProducer<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            clock: Arc::clone(&self.clock),
            metrics: self.metrics.clone(),
            next_sequence: Arc::clone(&self.next_sequence),
        }
    }
}

impl<P> SubmissionProducer<P> {
    /// Enqueue a payload with its credential.
    ///
    /// Returns the sequence number assigned to the record.
    ///
    /// # Errors
    /// Returns `SubmitError::Closed` if the consumer has been dropped.
    pub fn push(&self, payload: P, credential: impl Into<String>) -> Result<u64, SubmitError> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let record = SubmissionRecord::new(payload, credential.into(), self.clock.now(), sequence);

        self.tx.send(record).map_err(|_| SubmitError::Closed)?;
        self.metrics.record_submitted();
        Ok(sequence)
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct SubmissionConsumer<P> {
    rx: UnboundedReceiver<SubmissionRecord<P>>,
}

impl<P> SubmissionConsumer<P> {
    /// Wait for the next record.
    ///
    /// Returns `None` once `cancel` fires, or when every producer has been
    /// dropped and the queue is empty.
    pub async fn pop(&mut self, cancel: &CancellationToken) -> Option<SubmissionRecord<P>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            record = self.rx.recv() => record,
        }
    }

    /// Take the next record if one is already queued.
    pub fn try_pop(&mut self) -> Option<SubmissionRecord<P>> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new records; already queued ones can still be popped.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
