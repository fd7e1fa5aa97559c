//! # submission-throttle
//!
//! Rate-limited, strictly ordered submission of payloads to a remote endpoint.
//!
//! Producers hand payloads to a [`SubmissionThrottle`] and return immediately.
//! A single background dispatcher takes them out in arrival order, waits for
//! a send slot, resolves the destination for the payload's variant and hands
//! the payload to a [`Sender`]. No more than `limit` sends start per window.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use submission_throttle::{Document, HttpSender, SubmissionThrottle, TimeUnit};
//! use std::time::Duration;
//!
//! # async fn run(document: Document, signature: String) -> Result<(), Box<dyn std::error::Error>> {
//! // At most 5 documents per second, posted to their default endpoints
//! let throttle = SubmissionThrottle::<Document>::builder_per(TimeUnit::Second, 5)
//!     .with_document_routes()
//!     .build(HttpSender::new(Duration::from_secs(30))?)?;
//!
//! // Never blocks; the sequence number identifies the item in outcomes
//! let sequence = throttle.submit(document, signature)?;
//!
//! // Stop the dispatcher; queued items are reported as cancelled
//! throttle.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Rate Windows
//!
//! - **Fixed window** (default): a counter that resets lazily once the window
//!   has elapsed since it opened. At most `limit` sends per window, though two
//!   adjacent windows may together start up to `2 * limit` in a short span.
//! - **Sliding window**: remembers the last `limit` start times, so no interval
//!   of one window length ever contains more than `limit` starts.
//!
//! ```rust
//! use submission_throttle::{WindowConfig, TimeUnit};
//! use std::time::Duration;
//!
//! let fixed = WindowConfig::per(TimeUnit::Minute, 100).unwrap();
//! let sliding = WindowConfig::sliding(10, Duration::from_secs(1)).unwrap();
//! assert!(WindowConfig::fixed(0, Duration::from_secs(1)).is_err());
//! ```
//!
//! A send slot is consumed by every attempt, failed ones included. Payloads
//! whose variant has no destination never take a slot.
//!
//! ## Outcomes
//!
//! Every item ends in exactly one [`DispatchOutcome`]: delivered, failed with
//! a [`DeliveryError`], dropped as an unsupported variant, or cancelled by
//! shutdown. Outcomes go to the reporter, which logs them through `tracing`
//! unless replaced with `with_reporter`:
//!
//! ```rust,no_run
//! # use submission_throttle::{DispatchOutcome, Document, HttpSender, SubmissionThrottle};
//! # use std::time::Duration;
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let throttle = SubmissionThrottle::<Document>::builder(Duration::from_secs(1), 5)
//!     .with_document_routes()
//!     .with_reporter(|outcome: &DispatchOutcome<Document>| {
//!         if let Err(err) = &outcome.result {
//!             eprintln!("submission #{} failed: {}", outcome.record.sequence(), err);
//!         }
//!     })
//!     .build(HttpSender::new(Duration::from_secs(30))?)?;
//! # Ok(())
//! # }
//! ```
//!
//! A failing or panicking sender only affects its own item; the dispatcher
//! moves on to the next one. Nothing is retried.
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use submission_throttle::{Document, SubmissionThrottle, HttpSender};
//! # use std::time::Duration;
//! # fn run(throttle: SubmissionThrottle<Document>) {
//! let snapshot = throttle.metrics().snapshot();
//! println!("delivered: {}", snapshot.delivered);
//! println!("waiting or in flight: {}", snapshot.pending());
//! println!("failure rate: {:.2}%", snapshot.failure_rate() * 100.0);
//! # }
//! ```
//!
//! ## Custom Payloads and Senders
//!
//! Anything implementing [`Routable`] can be throttled; the variant selects
//! the destination through a [`DestinationResolver`]. Implement [`Sender`]
//! for transports other than HTTP.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    document::{
        default_routes, Description, Document, DocumentKind, GoodsIntroduction, Product,
        CREATE_DOCUMENT_URL,
    },
    outcome::{DeliveryError, DispatchError, DispatchOutcome},
    route::{Destination, DestinationResolver, Routable},
    submission::SubmissionRecord,
    window::{ConfigError, RateWindow, Reservation, TimeUnit, WindowConfig, WindowMode},
};

pub use application::{
    dispatcher::{log_outcome, Dispatcher, DispatcherHandle, OutcomeReporter, ShutdownError},
    limiter::{Cancelled, RateLimiter},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, Sender},
    queue::{submission_queue, SubmissionConsumer, SubmissionProducer, SubmitError},
};

pub use infrastructure::{
    clock::SystemClock,
    throttle::{BuildError, SubmissionThrottle, SubmissionThrottleBuilder},
};

#[cfg(feature = "http")]
pub use infrastructure::http::{HttpSender, SIGNATURE_HEADER};

pub use tokio_util::sync::CancellationToken;
