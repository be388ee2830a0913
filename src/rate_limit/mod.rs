//! Anonymous Demo Rate Limiting Module
//!
//! Sliding-window rate limiting keyed by hashed client address, gating
//! unauthenticated demo requests. The window is a true sliding window: a
//! burst at the boundary of a fixed bucket cannot double the effective
//! rate, because every request instant in the trailing window counts.

pub mod limiter;
pub mod store;

// Property-based tests module
#[cfg(test)]
mod proptests;

pub use limiter::{DemoRateLimiter, RateLimitDecision};
pub use store::{InMemoryRateLimitStore, RateLimitStore, WindowDecision};
