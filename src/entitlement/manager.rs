//! Entitlement Manager
//!
//! Central decision point for paid generation requests: resolves licence
//! keys to tiers, enforces per-period campaign quotas and answers save
//! limit questions for the campaign store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::store::{ConsumeOutcome, EntitlementStore};
use super::validator::{LicenceValidator, ValidationError};
use super::Entitlement;
use crate::error::GateError;
use crate::retry::{retry_transient, RetryConfig};
use crate::tiers::{Feature, Limit, TierCatalog};

/// Decision from an atomic quota check-and-consume
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeDecision {
    /// A slot was consumed
    Allowed {
        /// Slots left in the period; `None` on unlimited tiers
        remaining: Option<u32>,
    },
    /// Quota is exhausted; nothing was mutated
    Denied {
        /// Tier the licence resolved to
        tier: String,
        /// Campaign limit of that tier
        limit: u32,
        /// Start of the next billing period
        reset_at: DateTime<Utc>,
    },
}

/// Current usage picture for a licence, for the usage endpoint
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    /// Tier identifier
    pub tier: String,
    /// Tier display name
    pub tier_name: String,
    /// Campaigns consumed in the current billing period
    pub consumed: u32,
    /// Period campaign limit; `None` on unlimited tiers
    pub campaign_limit: Option<u32>,
    /// Slots left in the period; `None` on unlimited tiers
    pub remaining: Option<u32>,
    /// Saved-campaign limit; `None` on unlimited tiers
    pub save_limit: Option<u32>,
    /// Capability flags of the tier
    pub features: Vec<Feature>,
    /// When the licence was activated
    pub activated_at: DateTime<Utc>,
    /// When the licence expires; `None` for lifetime purchases
    pub expires_at: Option<DateTime<Utc>>,
    /// When the current billing period rolls over
    pub reset_at: DateTime<Utc>,
}

/// Entitlement manager
pub struct EntitlementManager {
    catalog: Arc<TierCatalog>,
    store: Arc<dyn EntitlementStore>,
    validator: Arc<dyn LicenceValidator>,
    period_days: u32,
}

impl EntitlementManager {
    /// Create a manager over the given catalog, store and validator
    pub fn new(
        catalog: Arc<TierCatalog>,
        store: Arc<dyn EntitlementStore>,
        validator: Arc<dyn LicenceValidator>,
        period_days: u32,
    ) -> Self {
        Self {
            catalog,
            store,
            validator,
            period_days: period_days.max(1),
        }
    }

    /// Resolve a licence key to its entitlement, creating it lazily on
    /// first successful validation.
    ///
    /// Fails with `InvalidLicence` when the provider rejects the key and
    /// `LicenceExpired` when the validity window is over. Provider
    /// unavailability surfaces as a transient, retryable error.
    pub async fn resolve_entitlement(&self, licence_key: &str) -> Result<Entitlement, GateError> {
        let entitlement = match self.store.get(licence_key).await? {
            Some(existing) => existing,
            None => {
                // Provider outages are retried; rejections are terminal
                let validator = self.validator.clone();
                let key = licence_key.to_string();
                let validated = retry_transient(&RetryConfig::default(), move || {
                    let validator = validator.clone();
                    let key = key.clone();
                    async move {
                        validator.validate(&key).await.map_err(|e| match e {
                            ValidationError::Rejected(reason) => GateError::InvalidLicence(reason),
                            ValidationError::Unavailable(reason) => {
                                GateError::TransientStorage(reason)
                            }
                        })
                    }
                })
                .await?;

                let tier = self.catalog.tier_for_product(&validated.product_id);
                let entitlement = Entitlement::activate(
                    licence_key.to_string(),
                    tier.id.to_string(),
                    tier.validity,
                    Utc::now(),
                );
                self.store.upsert(entitlement.clone()).await?;
                info!(tier = tier.id, "activated new entitlement");
                entitlement
            }
        };

        if entitlement.is_expired(Utc::now()) {
            return Err(GateError::LicenceExpired {
                expired_at: entitlement.expires_at.expect("expired implies expiry set"),
            });
        }

        Ok(entitlement)
    }

    /// Re-register a licence under a (possibly new) product id.
    ///
    /// Supersedes the stored tier and recomputes the validity window from
    /// now; the activation anchor of a brand-new licence is also now.
    /// This is the upgrade path driven by payment-provider webhooks.
    pub async fn register(&self, licence_key: &str, product_id: &str) -> Result<Entitlement, GateError> {
        let tier = self.catalog.tier_for_product(product_id);
        let now = Utc::now();

        let entitlement = match self.store.get(licence_key).await? {
            Some(existing) => {
                let mut updated = existing;
                updated.tier_id = tier.id.to_string();
                updated.expires_at = Entitlement::activate(
                    licence_key.to_string(),
                    tier.id.to_string(),
                    tier.validity,
                    now,
                )
                .expires_at;
                updated
            }
            None => Entitlement::activate(
                licence_key.to_string(),
                tier.id.to_string(),
                tier.validity,
                now,
            ),
        };

        self.store.upsert(entitlement.clone()).await?;
        info!(tier = tier.id, "registered entitlement");
        Ok(entitlement)
    }

    /// Atomically consume one generation slot for the current billing
    /// period, or deny without mutating anything.
    pub async fn check_and_consume(&self, licence_key: &str) -> Result<ConsumeDecision, GateError> {
        let entitlement = self.resolve_entitlement(licence_key).await?;
        let tier = self.catalog.resolve(&entitlement.tier_id);
        let now = Utc::now();
        let period = entitlement.period_index(now, self.period_days);

        match self
            .store
            .try_consume(licence_key, period, tier.campaign_limit)
            .await?
        {
            ConsumeOutcome::Consumed { consumed } => {
                let remaining = tier.campaign_limit.count().map(|l| l.saturating_sub(consumed));
                debug!(tier = tier.id, consumed, "generation slot consumed");
                Ok(ConsumeDecision::Allowed { remaining })
            }
            ConsumeOutcome::LimitReached { consumed } => {
                let limit = tier
                    .campaign_limit
                    .count()
                    .expect("unlimited tiers never reach a limit");
                debug!(tier = tier.id, consumed, "generation denied, quota exhausted");
                Ok(ConsumeDecision::Denied {
                    tier: tier.id.to_string(),
                    limit,
                    reset_at: entitlement.period_reset_at(now, self.period_days),
                })
            }
        }
    }

    /// Return a slot consumed in the current period.
    ///
    /// Compensating decrement for a generation that failed downstream
    /// after the gate had committed the consume.
    pub async fn refund(&self, licence_key: &str) -> Result<(), GateError> {
        if let Some(entitlement) = self.store.get(licence_key).await? {
            let period = entitlement.period_index(Utc::now(), self.period_days);
            self.store.refund(licence_key, period).await?;
            debug!("refunded one generation slot");
        }
        Ok(())
    }

    /// Whether `current_saved` saved campaigns still leave room under the
    /// tier's save limit. Pure comparison; no mutation.
    pub async fn check_save_allowed(
        &self,
        licence_key: &str,
        current_saved: u32,
    ) -> Result<bool, GateError> {
        let limit = self.save_limit(licence_key).await?;
        Ok(limit.allows(current_saved))
    }

    /// Save limit of the licence's tier
    pub async fn save_limit(&self, licence_key: &str) -> Result<Limit, GateError> {
        let entitlement = self.resolve_entitlement(licence_key).await?;
        Ok(self.catalog.resolve(&entitlement.tier_id).save_limit)
    }

    /// Whether the licence's tier carries a capability flag
    pub async fn has_feature(&self, licence_key: &str, feature: Feature) -> Result<bool, GateError> {
        let entitlement = self.resolve_entitlement(licence_key).await?;
        Ok(self.catalog.resolve(&entitlement.tier_id).has_feature(feature))
    }

    /// Usage summary for the usage endpoint
    pub async fn usage_summary(&self, licence_key: &str) -> Result<UsageSummary, GateError> {
        let entitlement = self.resolve_entitlement(licence_key).await?;
        let tier = self.catalog.resolve(&entitlement.tier_id);
        let now = Utc::now();
        let period = entitlement.period_index(now, self.period_days);
        let consumed = self.store.consumed(licence_key, period).await?;

        Ok(UsageSummary {
            tier: tier.id.to_string(),
            tier_name: tier.name.to_string(),
            consumed,
            campaign_limit: tier.campaign_limit.count(),
            remaining: tier.campaign_limit.count().map(|l| l.saturating_sub(consumed)),
            save_limit: tier.save_limit.count(),
            features: tier.features.to_vec(),
            activated_at: entitlement.activated_at,
            expires_at: entitlement.expires_at,
            reset_at: entitlement.period_reset_at(now, self.period_days),
        })
    }

    /// Tier catalog backing this manager
    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }
}
