//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::{outcome::DeliveryError, route::Destination};
use std::fmt::Debug;
use std::future::Future;
use std::time::Instant;

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for delivering one payload to its destination.
///
/// The dispatcher awaits each call before pulling the next item, so at most
/// one send is in flight per dispatcher. Implementations own transport,
/// serialization and timeout policy; a call that never completes stalls the
/// dispatcher.
///
/// # Example
/// ```
/// use submission_throttle::{DeliveryError, Destination, Sender};
///
/// struct Stdout;
///
/// impl Sender<String> for Stdout {
///     async fn send(
///         &self,
///         destination: &Destination,
///         payload: &String,
///         _credential: &str,
///     ) -> Result<(), DeliveryError> {
///         println!("{destination} <- {payload}");
///         Ok(())
///     }
/// }
/// ```
pub trait Sender<P>: Send + Sync + 'static {
    /// Deliver `payload` to `destination`, authenticated with `credential`.
    fn send(
        &self,
        destination: &Destination,
        payload: &P,
        credential: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
