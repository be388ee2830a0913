//! Campaign Store
//!
//! Keyed storage of campaign payloads per owner. The save-limit check and
//! the insert are one atomic unit under a per-owner lock, so two
//! concurrent saves can never both squeeze into the last free slot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::GateError;
use crate::tiers::Limit;

/// A generated campaign owned by a licence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Generated identifier
    pub id: Uuid,

    /// Licence key that owns this campaign
    pub owner: String,

    /// Target company name, extracted from the payload for listings
    pub company_name: String,

    /// Target industry, extracted from the payload for listings
    pub industry: String,

    /// Opaque structured campaign content
    pub payload: Value,

    /// When the campaign was saved
    pub created_at: DateTime<Utc>,

    /// When the campaign was last updated
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Build a campaign from a payload, pulling the company summary
    /// fields out of `payload.company.{name,industry}` when present.
    pub fn from_payload(owner: &str, payload: Value, now: DateTime<Utc>) -> Self {
        let company_name = payload
            .pointer("/company/name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let industry = payload
            .pointer("/company/industry")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();

        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            company_name,
            industry,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// Listing summary without the payload
    pub fn summary(&self) -> CampaignSummary {
        CampaignSummary {
            id: self.id,
            company_name: self.company_name.clone(),
            industry: self.industry.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing view of a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    /// Campaign identifier
    pub id: Uuid,
    /// Target company name
    pub company_name: String,
    /// Target industry
    pub industry: String,
    /// When the campaign was saved
    pub created_at: DateTime<Utc>,
    /// When the campaign was last updated
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an atomic insert-if-under-limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The campaign was persisted
    Inserted,
    /// The owner is at their save limit; nothing was persisted
    LimitReached {
        /// Campaigns the owner currently has saved
        current: u32,
    },
}

/// Ownership-scoped campaign storage
///
/// Implementations must make `insert_if_under_limit` a single atomic unit
/// per owner and must never let one owner's queries see another owner's
/// rows.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Atomically insert the campaign if the owner's saved count is under
    /// the limit.
    async fn insert_if_under_limit(
        &self,
        campaign: Campaign,
        limit: Limit,
    ) -> Result<InsertOutcome, GateError>;

    /// Campaign by id, scoped to the owner
    async fn get(&self, owner: &str, id: Uuid) -> Result<Option<Campaign>, GateError>;

    /// Owner's campaigns newest-first, paginated; also returns the total
    async fn list(
        &self,
        owner: &str,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<CampaignSummary>, u32), GateError>;

    /// Replace a campaign's payload, bumping `updated_at`. Returns false
    /// when the id does not exist for this owner.
    async fn update(&self, owner: &str, id: Uuid, payload: Value) -> Result<bool, GateError>;

    /// Delete a campaign. Returns false when the id does not exist for
    /// this owner.
    async fn delete(&self, owner: &str, id: Uuid) -> Result<bool, GateError>;

    /// Campaigns currently saved by the owner
    async fn count(&self, owner: &str) -> Result<u32, GateError>;
}

/// In-memory campaign store with per-owner locking
#[derive(Debug, Clone, Default)]
pub struct InMemoryCampaignStore {
    owners: Arc<RwLock<HashMap<String, Arc<Mutex<Vec<Campaign>>>>>>,
}

impl InMemoryCampaignStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn owner_cell(&self, owner: &str) -> Arc<Mutex<Vec<Campaign>>> {
        {
            let owners = self.owners.read().await;
            if let Some(cell) = owners.get(owner) {
                return cell.clone();
            }
        }
        let mut owners = self.owners.write().await;
        owners
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn insert_if_under_limit(
        &self,
        campaign: Campaign,
        limit: Limit,
    ) -> Result<InsertOutcome, GateError> {
        let cell = self.owner_cell(&campaign.owner).await;
        let mut campaigns = cell.lock().await;

        let current = campaigns.len() as u32;
        if limit.allows(current) {
            campaigns.push(campaign);
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::LimitReached { current })
        }
    }

    async fn get(&self, owner: &str, id: Uuid) -> Result<Option<Campaign>, GateError> {
        let cell = self.owner_cell(owner).await;
        let campaigns = cell.lock().await;
        Ok(campaigns.iter().find(|c| c.id == id).cloned())
    }

    async fn list(
        &self,
        owner: &str,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<CampaignSummary>, u32), GateError> {
        let cell = self.owner_cell(owner).await;
        let campaigns = cell.lock().await;

        let mut summaries: Vec<CampaignSummary> = campaigns.iter().map(Campaign::summary).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = summaries.len() as u32;
        let start = (page as usize).saturating_mul(page_size as usize);
        let items = summaries
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();

        Ok((items, total))
    }

    async fn update(&self, owner: &str, id: Uuid, payload: Value) -> Result<bool, GateError> {
        let cell = self.owner_cell(owner).await;
        let mut campaigns = cell.lock().await;

        match campaigns.iter_mut().find(|c| c.id == id) {
            Some(campaign) => {
                let now = Utc::now();
                let fresh = Campaign::from_payload(owner, payload, now);
                campaign.company_name = fresh.company_name;
                campaign.industry = fresh.industry;
                campaign.payload = fresh.payload;
                campaign.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, owner: &str, id: Uuid) -> Result<bool, GateError> {
        let cell = self.owner_cell(owner).await;
        let mut campaigns = cell.lock().await;

        let before = campaigns.len();
        campaigns.retain(|c| c.id != id);
        Ok(campaigns.len() < before)
    }

    async fn count(&self, owner: &str) -> Result<u32, GateError> {
        let cell = self.owner_cell(owner).await;
        let campaigns = cell.lock().await;
        Ok(campaigns.len() as u32)
    }
}
