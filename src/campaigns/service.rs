//! Campaign Service
//!
//! Owner-facing campaign operations, gated by the tier's save limit. The
//! save path resolves the owner's limit through the entitlement manager
//! and then relies on the store's atomic insert-if-under-limit, so the
//! quota check and the insert cannot be interleaved by a concurrent save.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::store::{Campaign, CampaignStore, CampaignSummary, InsertOutcome};
use crate::entitlement::EntitlementManager;
use crate::error::GateError;
use crate::tiers::Limit;

/// One page of an owner's campaign listing
#[derive(Debug, Clone, Serialize)]
pub struct CampaignPage {
    /// Summaries in newest-first order
    pub items: Vec<CampaignSummary>,
    /// Total campaigns the owner has saved
    pub total: u32,
    /// Requested page index
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
}

/// Ownership-scoped campaign operations
pub struct CampaignService {
    store: Arc<dyn CampaignStore>,
    entitlements: Arc<EntitlementManager>,
}

impl CampaignService {
    /// Create a service over the given store and entitlement manager
    pub fn new(store: Arc<dyn CampaignStore>, entitlements: Arc<EntitlementManager>) -> Self {
        Self { store, entitlements }
    }

    /// Persist a campaign for the owner, enforcing the tier's save limit
    pub async fn save(&self, owner: &str, payload: Value) -> Result<Uuid, GateError> {
        let limit = self.entitlements.save_limit(owner).await?;
        let campaign = Campaign::from_payload(owner, payload, Utc::now());
        let id = campaign.id;

        match self.store.insert_if_under_limit(campaign, limit).await? {
            InsertOutcome::Inserted => {
                info!(%id, "campaign saved");
                Ok(id)
            }
            InsertOutcome::LimitReached { current } => {
                let limit = match limit {
                    Limit::Count(n) => n,
                    // Unreachable in practice; an unlimited tier never
                    // reports LimitReached
                    Limit::Unlimited => current,
                };
                Err(GateError::SaveLimitExceeded { limit })
            }
        }
    }

    /// A campaign by id; `NotFound` covers both absence and foreign
    /// ownership.
    pub async fn get(&self, owner: &str, id: Uuid) -> Result<Campaign, GateError> {
        self.store
            .get(owner, id)
            .await?
            .ok_or(GateError::NotFound)
    }

    /// The owner's campaigns, newest-first
    pub async fn list(&self, owner: &str, page: u32, page_size: u32) -> Result<CampaignPage, GateError> {
        let page_size = page_size.clamp(1, 100);
        let (items, total) = self.store.list(owner, page, page_size).await?;
        Ok(CampaignPage {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Replace a campaign's payload
    pub async fn update(&self, owner: &str, id: Uuid, payload: Value) -> Result<(), GateError> {
        if self.store.update(owner, id, payload).await? {
            Ok(())
        } else {
            Err(GateError::NotFound)
        }
    }

    /// Delete a campaign; a second delete of the same id is `NotFound`
    pub async fn delete(&self, owner: &str, id: Uuid) -> Result<(), GateError> {
        if self.store.delete(owner, id).await? {
            info!(%id, "campaign deleted");
            Ok(())
        } else {
            Err(GateError::NotFound)
        }
    }

    /// Campaigns the owner currently has saved
    pub async fn count(&self, owner: &str) -> Result<u32, GateError> {
        self.store.count(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaigns::store::InMemoryCampaignStore;
    use crate::entitlement::{InMemoryEntitlementStore, StaticLicenceValidator};
    use crate::tiers::TierCatalog;
    use serde_json::json;
    use std::collections::HashMap;

    fn service() -> CampaignService {
        let mut products = HashMap::new();
        products.insert("prod-starter".to_string(), "starter".to_string());
        products.insert("prod-agency".to_string(), "agency".to_string());

        let entitlements = Arc::new(EntitlementManager::new(
            Arc::new(TierCatalog::builtin("professional", products)),
            Arc::new(InMemoryEntitlementStore::new()),
            Arc::new(
                StaticLicenceValidator::new()
                    .with_key("GUM-STARTER-1", "prod-starter")
                    .with_key("GUM-AGENCY-1", "prod-agency"),
            ),
            30,
        ));
        CampaignService::new(Arc::new(InMemoryCampaignStore::new()), entitlements)
    }

    fn payload() -> Value {
        json!({ "company": { "name": "Acme", "industry": "SaaS" } })
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let service = service();
        let id = service.save("GUM-STARTER-1", payload()).await.unwrap();

        let fetched = service.get("GUM-STARTER-1", id).await.unwrap();
        assert_eq!(fetched.payload, payload());

        service.delete("GUM-STARTER-1", id).await.unwrap();
        assert!(matches!(
            service.get("GUM-STARTER-1", id).await,
            Err(GateError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_save_limit_then_delete_frees_slot() {
        let service = service();

        // Starter allows 3 saved campaigns
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(service.save("GUM-STARTER-1", payload()).await.unwrap());
        }

        let err = service.save("GUM-STARTER-1", payload()).await.unwrap_err();
        assert!(matches!(err, GateError::SaveLimitExceeded { limit: 3 }));

        service.delete("GUM-STARTER-1", ids[0]).await.unwrap();
        assert!(service.save("GUM-STARTER-1", payload()).await.is_ok());
        assert!(matches!(
            service.save("GUM-STARTER-1", payload()).await,
            Err(GateError::SaveLimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_unlimited_tier_saves_freely() {
        let service = service();
        for _ in 0..50 {
            service.save("GUM-AGENCY-1", payload()).await.unwrap();
        }
        assert_eq!(service.count("GUM-AGENCY-1").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_foreign_owner_gets_not_found() {
        let service = service();
        let id = service.save("GUM-STARTER-1", payload()).await.unwrap();

        assert!(matches!(
            service.get("GUM-AGENCY-1", id).await,
            Err(GateError::NotFound)
        ));
        assert!(matches!(
            service.update("GUM-AGENCY-1", id, payload()).await,
            Err(GateError::NotFound)
        ));
        assert!(matches!(
            service.delete("GUM-AGENCY-1", id).await,
            Err(GateError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_save_requires_valid_licence() {
        let service = service();
        let err = service.save("GUM-NOBODY-1", payload()).await.unwrap_err();
        assert!(matches!(err, GateError::InvalidLicence(_)));
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let service = service();
        let id = service.save("GUM-STARTER-1", payload()).await.unwrap();
        service.delete("GUM-STARTER-1", id).await.unwrap();
        assert!(matches!(
            service.delete("GUM-STARTER-1", id).await,
            Err(GateError::NotFound)
        ));
    }
}
