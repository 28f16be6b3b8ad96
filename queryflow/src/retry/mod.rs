//! Bounded retry helpers used inside components.
//!
//! The executor never retries. Components that regenerate output until it
//! validates use [`generate_validated`] with a [`RetryConfig`] schedule.

mod backoff;
mod validated;

pub use backoff::{BackoffStrategy, JitterStrategy, RetryConfig};
pub use validated::{generate_validated, ValidatedOutcome};
