//! Demo Rate Limiter
//!
//! Gate for unauthenticated demo requests, keyed by hashed client
//! address. Wraps the window store with the configured limit and window
//! length and shapes the result for callers.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::store::{RateLimitStore, WindowDecision};
use crate::config::DemoConfig;
use crate::error::GateError;
use crate::identity::AddrHash;

/// Decision from the demo rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request recorded and allowed
    Allowed {
        /// Demo requests left in the rolling window
        remaining: u32,
    },
    /// Window full for this address
    Denied {
        /// Time until the oldest request leaves the window
        retry_after: Duration,
    },
}

/// Sliding-window rate limiter for the anonymous demo path
pub struct DemoRateLimiter {
    store: Arc<dyn RateLimitStore>,
    limit: u32,
    window: chrono::Duration,
}

impl DemoRateLimiter {
    /// Create a limiter over the given store with the demo configuration
    pub fn new(store: Arc<dyn RateLimitStore>, config: &DemoConfig) -> Self {
        Self {
            store,
            limit: config.limit,
            window: chrono::Duration::hours(config.window_hours as i64),
        }
    }

    /// Atomically check the window for this address and record the
    /// request when allowed.
    pub async fn check_and_record(&self, addr: &AddrHash) -> Result<RateLimitDecision, GateError> {
        let decision = self
            .store
            .check_and_record(addr.as_str(), Utc::now(), self.window, self.limit)
            .await?;

        match decision {
            WindowDecision::Allowed { remaining } => {
                debug!(%addr, remaining, "demo request allowed");
                Ok(RateLimitDecision::Allowed { remaining })
            }
            WindowDecision::Denied { retry_after } => {
                debug!(%addr, ?retry_after, "demo request rate limited");
                Ok(RateLimitDecision::Denied { retry_after })
            }
        }
    }

    /// Demo requests used by this address within the current window
    pub async fn current_count(&self, addr: &AddrHash) -> Result<u32, GateError> {
        self.store
            .window_len(addr.as_str(), Utc::now(), self.window)
            .await
    }
}
