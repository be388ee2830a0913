//! Rate-Limit Window Store
//!
//! Per-address storage of request instants within the trailing window.
//! The check-purge-append sequence is one atomic unit under a per-address
//! lock; different addresses never contend. At most `limit` instants are
//! retained per address, since an instant is only appended when the
//! purged window still has room.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::GateError;

/// Outcome of an atomic window check-and-record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// The instant was recorded
    Allowed {
        /// Requests left in the window after this one
        remaining: u32,
    },
    /// The window is full; nothing was recorded
    Denied {
        /// Time until the oldest instant leaves the window
        retry_after: std::time::Duration,
    },
}

/// Keyed storage of sliding-window request instants
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically purge expired instants for the key, then either record
    /// `now` (if the window has room) or deny with a retry-after.
    async fn check_and_record(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
        limit: u32,
    ) -> Result<WindowDecision, GateError>;

    /// Instants currently inside the window for a key
    async fn window_len(&self, key: &str, now: DateTime<Utc>, window: Duration) -> Result<u32, GateError>;
}

/// In-memory sliding-window store with per-address locking
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimitStore {
    windows: Arc<RwLock<HashMap<String, Arc<Mutex<VecDeque<DateTime<Utc>>>>>>>,
}

impl InMemoryRateLimitStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn window_cell(&self, key: &str) -> Arc<Mutex<VecDeque<DateTime<Utc>>>> {
        {
            let windows = self.windows.read().await;
            if let Some(cell) = windows.get(key) {
                return cell.clone();
            }
        }
        let mut windows = self.windows.write().await;
        windows
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }
}

/// Drop instants that have aged out of the trailing window
fn purge(instants: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    while let Some(oldest) = instants.front() {
        if *oldest + window <= now {
            instants.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_record(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
        limit: u32,
    ) -> Result<WindowDecision, GateError> {
        let cell = self.window_cell(key).await;
        let mut instants = cell.lock().await;
        purge(&mut instants, now, window);

        if (instants.len() as u32) < limit {
            instants.push_back(now);
            Ok(WindowDecision::Allowed {
                remaining: limit - instants.len() as u32,
            })
        } else {
            let oldest = *instants.front().expect("full window is non-empty");
            let retry_after = (oldest + window - now)
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            Ok(WindowDecision::Denied { retry_after })
        }
    }

    async fn window_len(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<u32, GateError> {
        let cell = self.window_cell(key).await;
        let mut instants = cell.lock().await;
        purge(&mut instants, now, window);
        Ok(instants.len() as u32)
    }
}
