//! Entitlement Store
//!
//! Keyed storage for entitlements and per-period usage counters. The
//! trait exposes only atomic conditional operations: check-then-increment
//! is a single call, so concurrent consumers of the same licence can
//! never both take the last remaining slot. Locking is per licence key;
//! unrelated licences never contend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::Entitlement;
use crate::error::GateError;
use crate::tiers::Limit;

/// Outcome of an atomic consume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// A slot was consumed; `consumed` is the count after the increment
    Consumed {
        /// Consumed count in the period, including this slot
        consumed: u32,
    },
    /// The period limit is already reached; nothing was mutated
    LimitReached {
        /// Consumed count in the period
        consumed: u32,
    },
}

/// Durable, keyed storage for entitlements and usage counters
///
/// Implementations must make each method a single atomic unit per licence
/// key. An embedded in-memory store ships with the crate; a transactional
/// server-backed store can be swapped in without touching manager logic.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Look up an entitlement by licence key
    async fn get(&self, licence_key: &str) -> Result<Option<Entitlement>, GateError>;

    /// Insert or supersede an entitlement
    async fn upsert(&self, entitlement: Entitlement) -> Result<(), GateError>;

    /// Atomically consume one quota slot if the period count is under the
    /// limit. A stale counter from an earlier period is reset first.
    async fn try_consume(
        &self,
        licence_key: &str,
        period: u32,
        limit: Limit,
    ) -> Result<ConsumeOutcome, GateError>;

    /// Atomically return one slot consumed in the given period.
    ///
    /// A no-op if the counter is empty or belongs to a different period,
    /// so a late refund after a period rollover never corrupts the new
    /// period's count.
    async fn refund(&self, licence_key: &str, period: u32) -> Result<(), GateError>;

    /// Consumed count for a licence in the given period
    async fn consumed(&self, licence_key: &str, period: u32) -> Result<u32, GateError>;
}

/// Per-licence usage counter for one billing period
#[derive(Debug, Clone, Copy, Default)]
struct UsageCounter {
    period: u32,
    consumed: u32,
}

impl UsageCounter {
    /// Reset the counter when the billing period has rolled over
    fn roll_to(&mut self, period: u32) {
        if self.period != period {
            self.period = period;
            self.consumed = 0;
        }
    }
}

/// In-memory entitlement store with per-key locking
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntitlementStore {
    entitlements: Arc<RwLock<HashMap<String, Entitlement>>>,
    usage: Arc<RwLock<HashMap<String, Arc<Mutex<UsageCounter>>>>>,
}

impl InMemoryEntitlementStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the per-key counter cell.
    ///
    /// The map lock is held only long enough to clone the Arc; the
    /// read-modify-write happens under the per-key mutex.
    async fn counter_cell(&self, licence_key: &str) -> Arc<Mutex<UsageCounter>> {
        {
            let usage = self.usage.read().await;
            if let Some(cell) = usage.get(licence_key) {
                return cell.clone();
            }
        }
        let mut usage = self.usage.write().await;
        usage
            .entry(licence_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UsageCounter::default())))
            .clone()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get(&self, licence_key: &str) -> Result<Option<Entitlement>, GateError> {
        let entitlements = self.entitlements.read().await;
        Ok(entitlements.get(licence_key).cloned())
    }

    async fn upsert(&self, entitlement: Entitlement) -> Result<(), GateError> {
        let mut entitlements = self.entitlements.write().await;
        entitlements.insert(entitlement.licence_key.clone(), entitlement);
        Ok(())
    }

    async fn try_consume(
        &self,
        licence_key: &str,
        period: u32,
        limit: Limit,
    ) -> Result<ConsumeOutcome, GateError> {
        let cell = self.counter_cell(licence_key).await;
        let mut counter = cell.lock().await;
        counter.roll_to(period);

        if limit.allows(counter.consumed) {
            counter.consumed += 1;
            Ok(ConsumeOutcome::Consumed {
                consumed: counter.consumed,
            })
        } else {
            Ok(ConsumeOutcome::LimitReached {
                consumed: counter.consumed,
            })
        }
    }

    async fn refund(&self, licence_key: &str, period: u32) -> Result<(), GateError> {
        let cell = self.counter_cell(licence_key).await;
        let mut counter = cell.lock().await;
        if counter.period == period && counter.consumed > 0 {
            counter.consumed -= 1;
        }
        Ok(())
    }

    async fn consumed(&self, licence_key: &str, period: u32) -> Result<u32, GateError> {
        let cell = self.counter_cell(licence_key).await;
        let counter = cell.lock().await;
        Ok(if counter.period == period {
            counter.consumed
        } else {
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::Validity;
    use chrono::Utc;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = InMemoryEntitlementStore::new();
        assert!(store.get("K1").await.unwrap().is_none());

        let ent = Entitlement::activate("K1".into(), "starter".into(), Validity::Days(7), Utc::now());
        store.upsert(ent.clone()).await.unwrap();
        assert_eq!(store.get("K1").await.unwrap(), Some(ent));
    }

    #[tokio::test]
    async fn test_consume_until_limit() {
        let store = InMemoryEntitlementStore::new();

        for expected in 1..=3 {
            let outcome = store.try_consume("K1", 0, Limit::Count(3)).await.unwrap();
            assert_eq!(outcome, ConsumeOutcome::Consumed { consumed: expected });
        }

        let outcome = store.try_consume("K1", 0, Limit::Count(3)).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::LimitReached { consumed: 3 });
        assert_eq!(store.consumed("K1", 0).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unlimited_never_denies() {
        let store = InMemoryEntitlementStore::new();
        for _ in 0..500 {
            let outcome = store.try_consume("K1", 0, Limit::Unlimited).await.unwrap();
            assert!(matches!(outcome, ConsumeOutcome::Consumed { .. }));
        }
    }

    #[tokio::test]
    async fn test_period_rollover_resets_counter() {
        let store = InMemoryEntitlementStore::new();
        store.try_consume("K1", 0, Limit::Count(1)).await.unwrap();
        assert_eq!(
            store.try_consume("K1", 0, Limit::Count(1)).await.unwrap(),
            ConsumeOutcome::LimitReached { consumed: 1 }
        );

        // New period starts fresh
        assert_eq!(
            store.try_consume("K1", 1, Limit::Count(1)).await.unwrap(),
            ConsumeOutcome::Consumed { consumed: 1 }
        );
        assert_eq!(store.consumed("K1", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refund_restores_slot() {
        let store = InMemoryEntitlementStore::new();
        store.try_consume("K1", 0, Limit::Count(1)).await.unwrap();

        store.refund("K1", 0).await.unwrap();
        assert_eq!(store.consumed("K1", 0).await.unwrap(), 0);
        assert!(matches!(
            store.try_consume("K1", 0, Limit::Count(1)).await.unwrap(),
            ConsumeOutcome::Consumed { .. }
        ));
    }

    #[tokio::test]
    async fn test_refund_ignores_stale_period() {
        let store = InMemoryEntitlementStore::new();
        store.try_consume("K1", 1, Limit::Count(5)).await.unwrap();

        // Refund against the old period must not touch the new count
        store.refund("K1", 0).await.unwrap();
        assert_eq!(store.consumed("K1", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refund_never_goes_negative() {
        let store = InMemoryEntitlementStore::new();
        store.refund("K1", 0).await.unwrap();
        assert_eq!(store.consumed("K1", 0).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_consume_never_exceeds_limit() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let limit = 10u32;

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_consume("K1", 0, Limit::Count(limit)).await.unwrap()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), ConsumeOutcome::Consumed { .. }) {
                allowed += 1;
            }
        }

        assert_eq!(allowed, limit);
        assert_eq!(store.consumed("K1", 0).await.unwrap(), limit);
    }
}
