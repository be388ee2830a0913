//! Entitlement and Quota Management Module
//!
//! This module resolves licence keys to purchase tiers, tracks consumed
//! campaign counts per billing period and issues allow/deny decisions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Entitlement Manager                       │
//! ├──────────────────────┬──────────────────────────────────────┤
//! │   Licence Validator  │            Tier Catalog              │
//! │   (external call)    │        (static, read-only)           │
//! ├──────────────────────┴──────────────────────────────────────┤
//! │         Entitlement Store (atomic per-key counters)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod manager;
pub mod store;
pub mod validator;

pub use manager::{ConsumeDecision, EntitlementManager, UsageSummary};
pub use store::{ConsumeOutcome, EntitlementStore, InMemoryEntitlementStore};
pub use validator::{HttpLicenceValidator, LicenceValidator, StaticLicenceValidator, ValidationError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::tiers::Validity;

/// The resolved binding of a licence key to a tier plus its validity window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Opaque licence key, unique per purchase
    pub licence_key: String,

    /// Tier the licence resolved to
    pub tier_id: String,

    /// When the licence was first resolved (billing period anchor)
    pub activated_at: DateTime<Utc>,

    /// When the licence stops being valid; `None` for lifetime purchases
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entitlement {
    /// Create an entitlement activated now, deriving expiry from validity
    pub fn activate(licence_key: String, tier_id: String, validity: Validity, now: DateTime<Utc>) -> Self {
        let expires_at = match validity {
            Validity::Days(days) => Some(now + Duration::days(days as i64)),
            Validity::Lifetime => None,
        };
        Self {
            licence_key,
            tier_id,
            activated_at: now,
            expires_at,
        }
    }

    /// Whether the licence is past its validity window
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Billing period index for an instant, anchored at `activated_at`
    pub fn period_index(&self, now: DateTime<Utc>, period_days: u32) -> u32 {
        let days = (now - self.activated_at).num_days();
        if days <= 0 {
            0
        } else {
            days as u32 / period_days.max(1)
        }
    }

    /// Start of the billing period after the one containing `now`
    pub fn period_reset_at(&self, now: DateTime<Utc>, period_days: u32) -> DateTime<Utc> {
        let next = self.period_index(now, period_days) as i64 + 1;
        self.activated_at + Duration::days(next * period_days.max(1) as i64)
    }
}
