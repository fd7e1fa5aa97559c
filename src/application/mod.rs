//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Submission queue (many producers, one consumer)
//! - Rate limiter (slot reservation and waiting)
//! - Dispatcher (the single worker loop)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod dispatcher;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod queue;
