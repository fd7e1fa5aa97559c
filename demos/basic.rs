//! Basic example: a burst of submissions spread over rate windows.
//!
//! Ten items are submitted at once against a limit of 3 per second, so the
//! sender sees them in groups of three, one group per second.

use std::time::{Duration, Instant};
use submission_throttle::{
    DeliveryError, Destination, DestinationResolver, Routable, Sender, SubmissionThrottle,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Channel {
    Email,
}

#[derive(Debug)]
struct Message {
    id: u32,
}

impl Routable for Message {
    type Variant = Channel;

    fn variant(&self) -> Channel {
        Channel::Email
    }
}

struct PrintSender {
    started: Instant,
}

impl Sender<Message> for PrintSender {
    async fn send(
        &self,
        destination: &Destination,
        payload: &Message,
        credential: &str,
    ) -> Result<(), DeliveryError> {
        println!(
            "[{:>5} ms] message {} -> {} ({})",
            self.started.elapsed().as_millis(),
            payload.id,
            destination,
            credential
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("=== Basic Throttling Example ===\n");
    println!("Limit: 3 sends per second, 10 messages submitted at once\n");

    let routes = DestinationResolver::new([(Channel::Email, "smtp://relay.example")])?;
    let throttle = SubmissionThrottle::builder(Duration::from_secs(1), 3)
        .with_routes(routes)
        .build(PrintSender {
            started: Instant::now(),
        })?;

    for id in 1..=10 {
        throttle.submit(Message { id }, format!("token-{}", id))?;
    }
    println!("All 10 submitted without waiting\n");

    while throttle.metrics().snapshot().pending() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    throttle.shutdown().await?;

    let snapshot = throttle.metrics().snapshot();
    println!("\n=== Metrics ===");
    println!("Delivered: {}", snapshot.delivered);
    println!("Waited for a slot: {}", snapshot.throttled);

    Ok(())
}
