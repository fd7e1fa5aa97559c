//! Domain layer - pure business logic with no runtime dependencies.
//!
//! This layer contains the core concepts and invariants of the dispatcher:
//! - Rate window accounting
//! - Submission records and dispatch outcomes
//! - Variant-to-destination routing
//! - The document schema submitted by default
//!
//! All types in this layer are pure and easily testable.

pub mod document;
pub mod outcome;
pub mod route;
pub mod submission;
pub mod window;
