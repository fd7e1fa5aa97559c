//! The dispatch loop.
//!
//! A single worker task pulls records from the queue in arrival order,
//! resolves their destination, waits for a send slot and hands them to the
//! sender. Every per-item failure is reported and the loop moves on; only
//! cancellation (or the loss of every producer) stops it.

use crate::application::{
    limiter::RateLimiter,
    metrics::Metrics,
    ports::Sender,
    queue::SubmissionConsumer,
};
use crate::domain::{
    outcome::{DeliveryError, DispatchError, DispatchOutcome},
    route::{DestinationResolver, Routable},
    submission::SubmissionRecord,
};
use futures::FutureExt;
use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callback receiving every dispatch outcome.
///
/// Runs on the dispatcher task, so it should return quickly. A panicking
/// reporter is caught and logged.
pub type OutcomeReporter<P> = Arc<dyn Fn(&DispatchOutcome<P>) + Send + Sync + 'static>;

/// Default reporter: logs each outcome through `tracing`.
///
/// Successes are logged at `DEBUG`, delivery failures at `WARN`, unsupported
/// variants at `ERROR` (a configuration problem), abandoned items at `INFO`.
pub fn log_outcome<P: Routable>(outcome: &DispatchOutcome<P>) {
    let sequence = outcome.record.sequence();
    let variant = outcome.record.payload().variant();

    match &outcome.result {
        Ok(()) => debug!(sequence, ?variant, "submission delivered"),
        Err(DispatchError::Delivery(err)) => {
            warn!(sequence, ?variant, error = %err, "submission delivery failed")
        }
        Err(err @ DispatchError::UnsupportedVariant { .. }) => {
            error!(sequence, ?variant, error = %err, "submission dropped")
        }
        Err(DispatchError::Cancelled) => {
            info!(sequence, ?variant, "submission abandoned by shutdown")
        }
    }
}

/// Error returned when the dispatcher task does not stop cleanly.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The dispatcher task panicked outside per-item isolation
    #[error("dispatcher task panicked")]
    Panicked,
    /// The dispatcher task was aborted before it finished
    #[error("dispatcher task was aborted")]
    Aborted,
    /// The in-flight send did not finish within the grace period; the task
    /// was aborted
    #[error("dispatcher did not stop within {0:?}")]
    Timeout(Duration),
}

impl From<JoinError> for ShutdownError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            ShutdownError::Panicked
        } else {
            ShutdownError::Aborted
        }
    }
}

/// Single-consumer worker forwarding queued records to a [`Sender`].
pub struct Dispatcher<P, S>
where
    P: Routable,
{
    consumer: SubmissionConsumer<P>,
    limiter: RateLimiter,
    resolver: Arc<DestinationResolver<P::Variant>>,
    sender: S,
    reporter: OutcomeReporter<P>,
    metrics: Metrics,
}

impl<P, S> Dispatcher<P, S>
where
    P: Routable + Send + Sync + 'static,
    S: Sender<P>,
{
    /// Create a dispatcher; nothing runs until [`start`](Self::start) or
    /// [`run`](Self::run).
    pub fn new(
        consumer: SubmissionConsumer<P>,
        limiter: RateLimiter,
        resolver: Arc<DestinationResolver<P::Variant>>,
        sender: S,
        reporter: OutcomeReporter<P>,
        metrics: Metrics,
    ) -> Self {
        Self {
            consumer,
            limiter,
            resolver,
            sender,
            reporter,
            metrics,
        }
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime, like `tokio::spawn`.
    pub fn start(self) -> DispatcherHandle {
        self.spawn_on(&Handle::current(), CancellationToken::new())
    }

    /// Spawn the loop on `runtime`, stopping when `cancel` fires.
    pub fn spawn_on(self, runtime: &Handle, cancel: CancellationToken) -> DispatcherHandle {
        let finished = CancellationToken::new();
        // Fires when the task ends for any reason, abort and panic included
        let guard = finished.clone().drop_guard();
        let run = self.run(cancel.clone());
        let task = runtime.spawn(async move {
            let _guard = guard;
            run.await;
        });
        DispatcherHandle {
            cancel,
            finished,
            task,
        }
    }

    /// Run the loop on the calling task until cancelled or until every
    /// producer is gone and the queue is empty.
    pub async fn run(mut self, cancel: CancellationToken) {
        let config = self.limiter.config();
        info!(
            limit = config.limit(),
            window_ms = config.duration().as_millis() as u64,
            "dispatcher started"
        );

        while let Some(record) = self.consumer.pop(&cancel).await {
            if self.dispatch(record, &cancel).await.is_break() {
                break;
            }
        }

        self.consumer.close();
        let abandoned = self.abandon_queued();
        info!(
            cancelled = cancel.is_cancelled(),
            abandoned,
            "dispatcher stopped"
        );
    }

    /// Process one record. Breaks only when cancellation interrupted the
    /// slot wait.
    async fn dispatch(
        &self,
        record: SubmissionRecord<P>,
        cancel: &CancellationToken,
    ) -> ControlFlow<()> {
        let sequence = record.sequence();

        let destination = match self.resolver.resolve(record.payload().variant()) {
            Ok(destination) => destination,
            Err(err) => {
                self.metrics.record_unsupported();
                self.report(DispatchOutcome {
                    record,
                    result: Err(err),
                });
                return ControlFlow::Continue(());
            }
        };

        match self.limiter.acquire(cancel).await {
            Ok(waited) if waited.is_zero() => {}
            Ok(waited) => {
                self.metrics.record_throttled();
                debug!(sequence, waited_ms = waited.as_millis() as u64, "send slot granted after wait");
            }
            Err(_) => {
                self.metrics.record_cancelled();
                self.report(DispatchOutcome {
                    record,
                    result: Err(DispatchError::Cancelled),
                });
                return ControlFlow::Break(());
            }
        }

        // The slot is spent from here on, whatever the sender reports.
        self.metrics.record_attempt();
        debug!(sequence, %destination, "sending submission");

        let send = self
            .sender
            .send(destination, record.payload(), record.credential());
        let result = match AssertUnwindSafe(send).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(DeliveryError::Panicked(panic_message(panic.as_ref()))),
        };

        match &result {
            Ok(()) => self.metrics.record_delivered(),
            Err(_) => self.metrics.record_failed(),
        }

        self.report(DispatchOutcome {
            record,
            result: result.map_err(DispatchError::from),
        });
        ControlFlow::Continue(())
    }

    /// Report everything still queued after the loop ended as abandoned.
    fn abandon_queued(&mut self) -> usize {
        let mut abandoned = 0;
        while let Some(record) = self.consumer.try_pop() {
            abandoned += 1;
            self.metrics.record_cancelled();
            self.report(DispatchOutcome {
                record,
                result: Err(DispatchError::Cancelled),
            });
        }
        abandoned
    }

    fn report(&self, outcome: DispatchOutcome<P>) {
        let reporter = &self.reporter;
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| reporter(&outcome))) {
            error!(
                sequence = outcome.record.sequence(),
                panic = %panic_message(panic.as_ref()),
                "outcome reporter panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to a running dispatcher task.
///
/// Dropping the handle does not stop the task; call
/// [`shutdown`](Self::shutdown) for that.
#[derive(Debug)]
pub struct DispatcherHandle {
    cancel: CancellationToken,
    finished: CancellationToken,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop the dispatcher and wait for the task to exit.
    ///
    /// An in-flight send is allowed to finish; a pending slot wait or queue
    /// pop returns immediately. Records still queued are reported as
    /// abandoned, not delivered.
    ///
    /// # Errors
    /// Returns an error if the task panicked or was aborted.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        self.cancel.cancel();
        self.task.await?;
        Ok(())
    }

    /// Like [`shutdown`](Self::shutdown), but aborts the task if it has not
    /// exited within `grace` (a sender call that never returns).
    ///
    /// # Errors
    /// Returns `ShutdownError::Timeout` when the grace period elapsed.
    pub async fn shutdown_timeout(mut self, grace: Duration) -> Result<(), ShutdownError> {
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(joined) => joined.map_err(ShutdownError::from),
            Err(_) => {
                self.task.abort();
                // Completes as soon as the aborted future has been dropped
                let _ = (&mut self.task).await;
                Err(ShutdownError::Timeout(grace))
            }
        }
    }

    /// Token that stops the dispatcher when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Token cancelled once the task has exited, however it ended.
    ///
    /// Lets callers that do not own the handle wait for the dispatcher to
    /// stop.
    pub fn finished_token(&self) -> CancellationToken {
        self.finished.clone()
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue::{submission_queue, SubmissionProducer};
    use crate::domain::window::WindowConfig;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::mocks::{RecordingSender, TestPayload};
    use std::sync::Mutex;
    use std::time::Instant;

    type Outcomes = Arc<Mutex<Vec<(u64, Result<(), String>)>>>;

    fn collecting_reporter() -> (OutcomeReporter<TestPayload>, Outcomes) {
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let reporter: OutcomeReporter<TestPayload> = Arc::new(move |outcome: &DispatchOutcome<TestPayload>| {
            let result = outcome.result.as_ref().map_err(|e| e.to_string()).copied();
            sink.lock().unwrap().push((outcome.record.sequence(), result));
        });
        (reporter, outcomes)
    }

    fn spawn_dispatcher(
        limit: u32,
        window: Duration,
        sender: RecordingSender,
        reporter: OutcomeReporter<TestPayload>,
    ) -> (SubmissionProducer<TestPayload>, DispatcherHandle, Metrics) {
        let clock = Arc::new(SystemClock::new());
        let metrics = Metrics::new();
        let (producer, consumer) = submission_queue(clock.clone(), metrics.clone());
        let limiter = RateLimiter::new(WindowConfig::fixed(limit, window).unwrap(), clock);
        let resolver = Arc::new(TestPayload::routes());
        let dispatcher = Dispatcher::new(consumer, limiter, resolver, sender, reporter, metrics.clone());
        (producer, dispatcher.start(), metrics)
    }

    async fn wait_for(outcomes: &Outcomes, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while outcomes.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("outcomes not reported in time");
    }

    #[tokio::test]
    async fn test_delivers_in_submission_order() {
        let sender = RecordingSender::new();
        let (reporter, outcomes) = collecting_reporter();
        let (producer, handle, metrics) =
            spawn_dispatcher(100, Duration::from_secs(1), sender.clone(), reporter);

        for i in 0..5 {
            producer.push(TestPayload::routed(i), format!("sig-{}", i)).unwrap();
        }
        wait_for(&outcomes, 5).await;

        let ids: Vec<u32> = sender.deliveries().iter().map(|d| d.payload.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(sender.deliveries()[2].credential, "sig-2");
        assert_eq!(metrics.delivered(), 5);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_delivery_error_does_not_stop_loop() {
        let sender = RecordingSender::new().fail_ids([1]);
        let (reporter, outcomes) = collecting_reporter();
        let (producer, handle, metrics) =
            spawn_dispatcher(100, Duration::from_secs(1), sender.clone(), reporter);

        for i in 0..3 {
            producer.push(TestPayload::routed(i), "sig").unwrap();
        }
        wait_for(&outcomes, 3).await;

        let outcomes = outcomes.lock().unwrap().clone();
        assert!(outcomes[0].1.is_ok());
        assert!(outcomes[1].1.is_err());
        assert!(outcomes[2].1.is_ok());

        // The failed attempt still consumed a slot
        assert_eq!(metrics.attempted(), 3);
        assert_eq!(metrics.failed(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_variant_is_reported_and_skipped() {
        let sender = RecordingSender::new();
        let (reporter, outcomes) = collecting_reporter();
        let (producer, handle, metrics) =
            spawn_dispatcher(1, Duration::from_secs(3600), sender.clone(), reporter);

        producer.push(TestPayload::unrouted(0), "sig").unwrap();
        producer.push(TestPayload::routed(1), "sig").unwrap();
        wait_for(&outcomes, 2).await;

        let outcomes = outcomes.lock().unwrap().clone();
        assert_eq!(
            outcomes[0].1,
            Err("unsupported payload variant: Unrouted".to_string())
        );
        assert!(outcomes[1].1.is_ok());

        // With limit 1, the routed item could only go out if the unsupported
        // one did not take the slot.
        assert_eq!(metrics.unsupported(), 1);
        assert_eq!(metrics.attempted(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sender_panic_is_isolated() {
        let sender = RecordingSender::new().panic_ids([0]);
        let (reporter, outcomes) = collecting_reporter();
        let (producer, handle, _metrics) =
            spawn_dispatcher(10, Duration::from_secs(1), sender.clone(), reporter);

        producer.push(TestPayload::routed(0), "sig").unwrap();
        producer.push(TestPayload::routed(1), "sig").unwrap();
        wait_for(&outcomes, 2).await;

        let outcomes = outcomes.lock().unwrap().clone();
        assert!(outcomes[0].1.as_ref().unwrap_err().contains("sender panicked"));
        assert!(outcomes[1].1.is_ok());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reporter_panic_is_isolated() {
        let sender = RecordingSender::new();
        let reporter: OutcomeReporter<TestPayload> = Arc::new(|_: &DispatchOutcome<TestPayload>| panic!("reporter bug"));
        let (producer, handle, metrics) =
            spawn_dispatcher(10, Duration::from_secs(1), sender.clone(), reporter);

        for i in 0..3 {
            producer.push(TestPayload::routed(i), "sig").unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.delivered() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_slot_wait() {
        let sender = RecordingSender::new();
        let (reporter, outcomes) = collecting_reporter();
        let (producer, handle, metrics) =
            spawn_dispatcher(1, Duration::from_secs(3600), sender.clone(), reporter);

        producer.push(TestPayload::routed(0), "sig").unwrap();
        producer.push(TestPayload::routed(1), "sig").unwrap();
        producer.push(TestPayload::routed(2), "sig").unwrap();
        wait_for(&outcomes, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let start = Instant::now();
        handle.shutdown().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        // Item 1 was parked in acquire, item 2 still queued
        assert_eq!(sender.len(), 1);
        assert_eq!(metrics.cancelled(), 2);
        let outcomes = outcomes.lock().unwrap().clone();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[1..].iter().all(|(_, r)| r.is_err()));

        assert!(producer.push(TestPayload::routed(3), "sig").is_err());
    }

    #[tokio::test]
    async fn test_stops_when_producers_dropped() {
        let sender = RecordingSender::new();
        let (reporter, outcomes) = collecting_reporter();
        let (producer, handle, _metrics) =
            spawn_dispatcher(10, Duration::from_secs(1), sender.clone(), reporter);

        producer.push(TestPayload::routed(0), "sig").unwrap();
        drop(producer);
        wait_for(&outcomes, 1).await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dispatcher should exit once producers are gone");
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_timeout_aborts_stuck_send() {
        let sender = RecordingSender::new().with_delay(Duration::from_secs(3600));
        let (reporter, _outcomes) = collecting_reporter();
        let (producer, handle, metrics) =
            spawn_dispatcher(10, Duration::from_secs(1), sender.clone(), reporter);

        producer.push(TestPayload::routed(0), "sig").unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while metrics.attempted() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let result = handle.shutdown_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ShutdownError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_finished_token_fires_on_abort() {
        let sender = RecordingSender::new().with_delay(Duration::from_secs(3600));
        let (reporter, _outcomes) = collecting_reporter();
        let (producer, handle, metrics) =
            spawn_dispatcher(10, Duration::from_secs(1), sender, reporter);
        let finished = handle.finished_token();

        producer.push(TestPayload::routed(0), "sig").unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while metrics.attempted() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!finished.is_cancelled());

        let _ = handle.shutdown_timeout(Duration::from_millis(20)).await;
        tokio::time::timeout(Duration::from_secs(1), finished.cancelled())
            .await
            .expect("aborted task should still signal completion");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
