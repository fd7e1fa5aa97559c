//! Recording sender and a minimal routable payload for tests.

use crate::application::ports::Sender;
use crate::domain::outcome::DeliveryError;
use crate::domain::route::{Destination, DestinationResolver, Routable};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Variants of [`TestPayload`]. Only `Routed` has a destination in
/// [`TestPayload::routes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    Routed,
    Unrouted,
}

/// Payload carrying nothing but an id and a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPayload {
    pub id: u32,
    pub kind: TestKind,
}

impl TestPayload {
    pub fn routed(id: u32) -> Self {
        Self {
            id,
            kind: TestKind::Routed,
        }
    }

    pub fn unrouted(id: u32) -> Self {
        Self {
            id,
            kind: TestKind::Unrouted,
        }
    }

    /// Resolver mapping `Routed` to `mock://sink` and nothing else.
    pub fn routes() -> DestinationResolver<TestKind> {
        DestinationResolver::new([(TestKind::Routed, "mock://sink")])
            .expect("static test route is valid")
    }
}

impl Routable for TestPayload {
    type Variant = TestKind;

    fn variant(&self) -> TestKind {
        self.kind
    }
}

/// One call observed by [`RecordingSender`].
#[derive(Debug, Clone)]
pub struct Delivery<P> {
    pub destination: Destination,
    pub payload: P,
    pub credential: String,
    pub at: Instant,
}

type Predicate<P> = Arc<dyn Fn(&P) -> bool + Send + Sync>;

/// Sender that records every call instead of delivering it.
///
/// Clones share the same log, so a test can keep one clone while the
/// dispatcher owns another.
///
/// # Examples
///
/// ```
/// use submission_throttle::infrastructure::mocks::{RecordingSender, TestKind, TestPayload};
/// use submission_throttle::Sender;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sender = RecordingSender::new().fail_ids([2]);
/// let routes = TestPayload::routes();
/// let destination = routes.resolve(TestKind::Routed).unwrap();
///
/// assert!(sender.send(destination, &TestPayload::routed(1), "sig").await.is_ok());
/// assert!(sender.send(destination, &TestPayload::routed(2), "sig").await.is_err());
/// assert_eq!(sender.len(), 2);
/// # }
/// ```
pub struct RecordingSender<P = TestPayload> {
    deliveries: Arc<Mutex<Vec<Delivery<P>>>>,
    fail_when: Option<Predicate<P>>,
    panic_when: Option<Predicate<P>>,
    delay: Duration,
}

impl<P> Clone for RecordingSender<P> {
    fn clone(&self) -> Self {
        Self {
            deliveries: Arc::clone(&self.deliveries),
            fail_when: self.fail_when.clone(),
            panic_when: self.panic_when.clone(),
            delay: self.delay,
        }
    }
}

impl<P> Default for RecordingSender<P> {
    fn default() -> Self {
        Self {
            deliveries: Arc::new(Mutex::new(Vec::new())),
            fail_when: None,
            panic_when: None,
            delay: Duration::ZERO,
        }
    }
}

impl<P> fmt::Debug for RecordingSender<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSender")
            .field("recorded", &self.lock().len())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl RecordingSender<TestPayload> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail (after recording) every payload whose id is listed.
    pub fn fail_ids(self, ids: impl IntoIterator<Item = u32>) -> Self {
        let ids: HashSet<u32> = ids.into_iter().collect();
        self.fail_when(move |payload| ids.contains(&payload.id))
    }

    /// Panic (before recording) on every payload whose id is listed.
    pub fn panic_ids(self, ids: impl IntoIterator<Item = u32>) -> Self {
        let ids: HashSet<u32> = ids.into_iter().collect();
        self.panic_when(move |payload| ids.contains(&payload.id))
    }
}

impl<P> RecordingSender<P> {
    pub fn fail_when(mut self, predicate: impl Fn(&P) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    pub fn panic_when(mut self, predicate: impl Fn(&P) -> bool + Send + Sync + 'static) -> Self {
        self.panic_when = Some(Arc::new(predicate));
        self
    }

    /// Sleep this long at the start of every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn deliveries(&self) -> Vec<Delivery<P>>
    where
        P: Clone,
    {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Delivery<P>>> {
        self.deliveries
            .lock()
            .expect("RecordingSender mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl<P> Sender<P> for RecordingSender<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn send(
        &self,
        destination: &Destination,
        payload: &P,
        credential: &str,
    ) -> Result<(), DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.panic_when.as_ref().is_some_and(|p| p(payload)) {
            panic!("recording sender told to panic");
        }

        self.lock().push(Delivery {
            destination: destination.clone(),
            payload: payload.clone(),
            credential: credential.to_string(),
            at: Instant::now(),
        });

        if self.fail_when.as_ref().is_some_and(|p| p(payload)) {
            return Err(DeliveryError::Transport("recording sender told to fail".to_string()));
        }
        Ok(())
    }
}
