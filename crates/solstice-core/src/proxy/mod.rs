//! Request dispatch: validation, cache, selection, breaker-gated forwarding,
//! and cross-provider retry.

pub mod engine;
pub mod errors;

pub use engine::{DispatchEngine, DispatchOutcome, RetrySettings};
pub use errors::{DispatchError, ValidationError};
