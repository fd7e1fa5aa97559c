//! Submission throttle facade.
//!
//! Wires a queue, limiter and dispatcher together behind one handle that
//! producers submit to.

use crate::application::{
    dispatcher::{log_outcome, Dispatcher, DispatcherHandle, OutcomeReporter, ShutdownError},
    limiter::RateLimiter,
    metrics::Metrics,
    ports::{Clock, Sender},
    queue::{submission_queue, SubmissionProducer, SubmitError},
};
use crate::domain::{
    document::{default_routes, Document},
    outcome::DispatchOutcome,
    route::{DestinationResolver, Routable},
    window::{ConfigError, TimeUnit, WindowConfig, WindowMode},
};
use crate::infrastructure::clock::SystemClock;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Error returned when building a throttle fails.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Window or route configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No runtime was given and none is current
    #[error("no tokio runtime available to run the dispatcher")]
    NoRuntime,
}

/// Builder for configuring a [`SubmissionThrottle`].
pub struct SubmissionThrottleBuilder<P: Routable> {
    limit: u32,
    duration: Duration,
    mode: WindowMode,
    clock: Option<Arc<dyn Clock>>,
    routes: Result<DestinationResolver<P::Variant>, ConfigError>,
    reporter: Option<OutcomeReporter<P>>,
    metrics: Option<Metrics>,
    runtime: Option<Handle>,
    cancel: Option<CancellationToken>,
}

impl<P> SubmissionThrottleBuilder<P>
where
    P: Routable + Send + Sync + 'static,
{
    fn new(duration: Duration, limit: u32) -> Self {
        Self {
            limit,
            duration,
            mode: WindowMode::default(),
            clock: None,
            routes: Ok(DestinationResolver::default()),
            reporter: None,
            metrics: None,
            runtime: None,
            cancel: None,
        }
    }

    /// Use a sliding window instead of the default fixed one.
    pub fn with_mode(mut self, mode: WindowMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set a custom clock (for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the variant-to-destination table.
    ///
    /// Payloads whose variant is missing are reported as unsupported and
    /// never sent. Without this call every payload is unsupported.
    pub fn with_routes(mut self, routes: DestinationResolver<P::Variant>) -> Self {
        self.routes = Ok(routes);
        self
    }

    /// Set the callback receiving every dispatch outcome.
    ///
    /// Defaults to [`log_outcome`].
    ///
    /// # Example
    /// ```no_run
    /// # use submission_throttle::{DispatchOutcome, SubmissionThrottle, Document};
    /// # use std::time::Duration;
    /// let builder = SubmissionThrottle::<Document>::builder(Duration::from_secs(1), 10)
    ///     .with_reporter(|outcome: &DispatchOutcome<Document>| {
    ///         if let Err(err) = &outcome.result {
    ///             eprintln!("#{} failed: {}", outcome.record.sequence(), err);
    ///         }
    ///     });
    /// ```
    pub fn with_reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&DispatchOutcome<P>) + Send + Sync + 'static,
    {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Share an existing metrics tracker.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the dispatcher on `runtime` instead of the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Stop the dispatcher when `parent` is cancelled, in addition to
    /// [`SubmissionThrottle::shutdown`].
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = Some(parent.child_token());
        self
    }

    /// Validate the configuration and start the dispatcher.
    ///
    /// # Errors
    /// Returns `BuildError::Config` for a zero limit or duration or an
    /// invalid route, and `BuildError::NoRuntime` when called outside a
    /// tokio runtime without [`with_runtime`](Self::with_runtime).
    pub fn build<S>(self, sender: S) -> Result<SubmissionThrottle<P>, BuildError>
    where
        S: Sender<P>,
    {
        let config = match self.mode {
            WindowMode::Fixed => WindowConfig::fixed(self.limit, self.duration)?,
            WindowMode::Sliding => WindowConfig::sliding(self.limit, self.duration)?,
        };
        let routes = self.routes?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);
        let metrics = self.metrics.unwrap_or_default();
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(log_outcome::<P>) as OutcomeReporter<P>);

        let (producer, consumer) = submission_queue(Arc::clone(&clock), metrics.clone());
        let limiter = RateLimiter::new(config, clock);
        let dispatcher = Dispatcher::new(
            consumer,
            limiter.clone(),
            Arc::new(routes),
            sender,
            reporter,
            metrics.clone(),
        );
        let handle = dispatcher.spawn_on(&runtime, self.cancel.unwrap_or_default());

        Ok(SubmissionThrottle {
            producer,
            limiter,
            metrics,
            cancel: handle.cancellation_token(),
            finished: handle.finished_token(),
            handle: Mutex::new(Some(handle)),
        })
    }
}

impl SubmissionThrottleBuilder<Document> {
    /// Route documents to their default endpoints.
    pub fn with_document_routes(mut self) -> Self {
        self.routes = default_routes();
        self
    }
}

impl<P: Routable> fmt::Debug for SubmissionThrottleBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionThrottleBuilder")
            .field("limit", &self.limit)
            .field("duration", &self.duration)
            .field("mode", &self.mode)
            .field("routes", &self.routes)
            .field("has_reporter", &self.reporter.is_some())
            .finish_non_exhaustive()
    }
}

/// Rate-limited submission front end.
///
/// Producers call [`submit`](Self::submit), which never blocks; a background
/// dispatcher delivers items in submission order, starting at most `limit`
/// sends per window.
///
/// Dropping the throttle (and every [`producer`](Self::producer) clone)
/// lets the dispatcher finish what is queued and exit. Call
/// [`shutdown`](Self::shutdown) to stop it without draining.
///
/// # Example
/// ```no_run
/// use submission_throttle::{DestinationResolver, HttpSender, SubmissionThrottle, Document};
/// use std::time::Duration;
///
/// # async fn run(document: Document, signature: String) -> Result<(), Box<dyn std::error::Error>> {
/// let throttle = SubmissionThrottle::<Document>::builder(Duration::from_secs(1), 5)
///     .with_document_routes()
///     .build(HttpSender::new(Duration::from_secs(30))?)?;
///
/// throttle.submit(document, signature)?;
/// throttle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct SubmissionThrottle<P> {
    producer: SubmissionProducer<P>,
    limiter: RateLimiter,
    metrics: Metrics,
    cancel: CancellationToken,
    finished: CancellationToken,
    handle: Mutex<Option<DispatcherHandle>>,
}

impl<P> SubmissionThrottle<P>
where
    P: Routable + Send + Sync + 'static,
{
    /// Builder allowing `limit` sends per `window`.
    ///
    /// The default fixed window counts sends per window, so up to
    /// `2 * limit` can start close together around a window boundary. Use
    /// [`WindowMode::Sliding`] when no span of `window` may ever contain more
    /// than `limit` starts.
    pub fn builder(window: Duration, limit: u32) -> SubmissionThrottleBuilder<P> {
        SubmissionThrottleBuilder::new(window, limit)
    }

    /// Builder allowing `limit` sends per one `unit` of time.
    pub fn builder_per(unit: TimeUnit, limit: u32) -> SubmissionThrottleBuilder<P> {
        SubmissionThrottleBuilder::new(unit.duration(), limit)
    }

    /// Builder from an already validated window.
    pub fn from_config(config: WindowConfig) -> SubmissionThrottleBuilder<P> {
        SubmissionThrottleBuilder::new(config.duration(), config.limit()).with_mode(config.mode())
    }
}

impl<P> SubmissionThrottle<P> {
    /// Enqueue a payload; returns its sequence number without waiting.
    ///
    /// # Errors
    /// Returns `SubmitError::Closed` after shutdown.
    pub fn submit(&self, payload: P, credential: impl Into<String>) -> Result<u64, SubmitError> {
        self.producer.push(payload, credential)
    }

    /// Another handle feeding the same queue.
    pub fn producer(&self) -> SubmissionProducer<P> {
        self.producer.clone()
    }

    /// Counters shared with the dispatcher.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The limiter granting send slots.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Whether the dispatcher is still running.
    pub fn is_running(&self) -> bool {
        !self.finished.is_cancelled()
    }

    /// Stop the dispatcher and wait for it to exit.
    ///
    /// A send already in flight completes; a pending slot wait is abandoned
    /// and queued items are reported as cancelled. Concurrent and later
    /// calls also wait until the dispatcher has exited; only the first one
    /// sees its exit status.
    ///
    /// # Errors
    /// Returns an error if the dispatcher task panicked or was aborted.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        self.cancel.cancel();
        let handle = self.lock_handle().take();
        match handle {
            Some(handle) => handle.shutdown().await,
            None => {
                self.finished.cancelled().await;
                Ok(())
            }
        }
    }

    /// Like [`shutdown`](Self::shutdown), aborting the dispatcher if the
    /// in-flight send outlasts `grace`.
    ///
    /// # Errors
    /// Returns `ShutdownError::Timeout` when the grace period elapsed.
    pub async fn shutdown_timeout(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.cancel.cancel();
        let handle = self.lock_handle().take();
        match handle {
            Some(handle) => handle.shutdown_timeout(grace).await,
            None => tokio::time::timeout(grace, self.finished.cancelled())
                .await
                .map_err(|_| ShutdownError::Timeout(grace)),
        }
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<DispatcherHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> fmt::Debug for SubmissionThrottle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionThrottle")
            .field("config", &self.limiter.config())
            .field("metrics", &self.metrics.snapshot())
            .field("running", &!self.finished.is_cancelled())
            .finish()
    }
}
