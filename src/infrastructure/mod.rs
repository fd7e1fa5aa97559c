//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - HTTP delivery of JSON payloads (`http` feature)
//! - The `SubmissionThrottle` facade wiring queue, limiter and dispatcher

pub mod clock;
#[cfg(feature = "http")]
pub mod http;
pub mod throttle;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides a controllable clock, a recording
/// sender and a capturing tracing layer.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// submission-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
