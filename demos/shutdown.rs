//! Shutdown example: stopping while items are still waiting for slots.
//!
//! One item per hour is allowed, so everything after the first submission
//! waits. Shutdown returns at once and the waiting items are reported as
//! cancelled through a custom reporter.

use std::time::Duration;
use submission_throttle::{
    DeliveryError, Destination, DestinationResolver, DispatchError, DispatchOutcome, Routable,
    Sender, SubmissionThrottle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Job;

#[derive(Debug)]
struct Report(&'static str);

impl Routable for Report {
    type Variant = Job;

    fn variant(&self) -> Job {
        Job
    }
}

struct SlowSender;

impl Sender<Report> for SlowSender {
    async fn send(
        &self,
        _destination: &Destination,
        payload: &Report,
        _credential: &str,
    ) -> Result<(), DeliveryError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        println!("sent {}", payload.0);
        Ok(())
    }
}

fn report(outcome: &DispatchOutcome<Report>) {
    let name = outcome.record.payload().0;
    match &outcome.result {
        Ok(()) => println!("  #{} {}: delivered", outcome.record.sequence(), name),
        Err(DispatchError::Cancelled) => {
            println!("  #{} {}: cancelled by shutdown", outcome.record.sequence(), name)
        }
        Err(err) => println!("  #{} {}: {}", outcome.record.sequence(), name, err),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Shutdown Example ===\n");

    let throttle = SubmissionThrottle::builder(Duration::from_secs(3600), 1)
        .with_routes(DestinationResolver::new([(Job, "queue://reports")])?)
        .with_reporter(report)
        .build(SlowSender)?;

    for name in ["daily", "weekly", "monthly", "yearly"] {
        throttle.submit(Report(name), "sig")?;
    }

    // Let the first send start, then stop while the rest wait for the next hour
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("Shutting down (first send still in flight)...");
    throttle.shutdown().await?;

    let snapshot = throttle.metrics().snapshot();
    println!("\nDelivered: {}, cancelled: {}", snapshot.delivered, snapshot.cancelled);
    assert!(throttle.submit(Report("late"), "sig").is_err());
    println!("Submissions after shutdown are rejected");

    Ok(())
}
