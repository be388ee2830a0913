//! Tier Catalog
//!
//! Static table of purchase tiers and their limits. The catalog is loaded
//! once at process start and never mutated. Unknown tier identifiers and
//! unrecognized product identifiers resolve to a designated default tier
//! (the mid-range "Professional" tier) rather than failing, so licences
//! issued before new tiers existed keep working.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A quota that is either a fixed count or unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Limit {
    /// Bounded quota
    Count(u32),
    /// No quota at all
    Unlimited,
}

impl Limit {
    /// Whether `consumed` uses still leave room under this limit
    pub fn allows(&self, consumed: u32) -> bool {
        match self {
            Limit::Count(n) => consumed < *n,
            Limit::Unlimited => true,
        }
    }

    /// The bound as an option (`None` for unlimited)
    pub fn count(&self) -> Option<u32> {
        match self {
            Limit::Count(n) => Some(*n),
            Limit::Unlimited => None,
        }
    }
}

/// Validity window of a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    /// Licence is valid for this many days after activation
    Days(u32),
    /// Licence never expires
    Lifetime,
}

/// Capability flags attached to a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Export generated campaigns to documents
    BasicExport,
    /// Access to previously saved campaigns
    CampaignHistory,
    /// Priority support channel
    PrioritySupport,
    /// Early access to new generators
    EarlyAccess,
    /// White-label output
    WhiteLabel,
    /// Programmatic API access
    ApiAccess,
}

/// A purchasable entitlement bundle
#[derive(Debug, Clone)]
pub struct Tier {
    /// Stable tier identifier
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Price in USD, informational only
    pub price_usd: u32,
    /// Campaigns that may be generated per billing period
    pub campaign_limit: Limit,
    /// How long a purchase stays valid
    pub validity: Validity,
    /// Campaigns that may be kept saved at any one time
    pub save_limit: Limit,
    /// Capability flags
    pub features: &'static [Feature],
}

impl Tier {
    /// Whether this tier carries a capability flag
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

const STARTER: Tier = Tier {
    id: "starter",
    name: "Starter",
    price_usd: 29,
    campaign_limit: Limit::Count(10),
    validity: Validity::Days(7),
    save_limit: Limit::Count(3),
    features: &[Feature::BasicExport],
};

const PROFESSIONAL: Tier = Tier {
    id: "professional",
    name: "Professional",
    price_usd: 49,
    campaign_limit: Limit::Count(50),
    validity: Validity::Days(30),
    save_limit: Limit::Count(10),
    features: &[Feature::BasicExport, Feature::CampaignHistory],
};

const UNLIMITED: Tier = Tier {
    id: "unlimited",
    name: "Unlimited",
    price_usd: 99,
    campaign_limit: Limit::Unlimited,
    validity: Validity::Days(90),
    save_limit: Limit::Unlimited,
    features: &[
        Feature::BasicExport,
        Feature::CampaignHistory,
        Feature::PrioritySupport,
        Feature::EarlyAccess,
    ],
};

const AGENCY: Tier = Tier {
    id: "agency",
    name: "Agency",
    price_usd: 199,
    campaign_limit: Limit::Unlimited,
    validity: Validity::Lifetime,
    save_limit: Limit::Unlimited,
    features: &[
        Feature::BasicExport,
        Feature::CampaignHistory,
        Feature::PrioritySupport,
        Feature::EarlyAccess,
        Feature::WhiteLabel,
        Feature::ApiAccess,
    ],
};

/// Read-only catalog of purchase tiers
///
/// `resolve` is a total function: every input maps to some tier, with
/// unknown identifiers falling back to the default.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    /// Tiers in ascending order of price (drives the upgrade path)
    tiers: Vec<Tier>,
    /// Identifier of the fallback tier
    default_id: String,
    /// Payment-provider product id → tier id
    product_map: HashMap<String, String>,
}

impl TierCatalog {
    /// Build the catalog with the built-in tier table
    ///
    /// `default_id` must name one of the built-in tiers; an unknown value
    /// falls back to "professional" so the catalog stays total.
    pub fn builtin(default_id: &str, product_map: HashMap<String, String>) -> Self {
        let tiers = vec![STARTER, PROFESSIONAL, UNLIMITED, AGENCY];
        let default_id = if tiers.iter().any(|t| t.id == default_id) {
            default_id.to_string()
        } else {
            "professional".to_string()
        };
        Self {
            tiers,
            default_id,
            product_map,
        }
    }

    /// Resolve a tier identifier, falling back to the default tier
    pub fn resolve(&self, tier_id: &str) -> &Tier {
        self.tiers
            .iter()
            .find(|t| t.id == tier_id)
            .unwrap_or_else(|| self.default_tier())
    }

    /// Map a payment-provider product id to a tier
    ///
    /// Unrecognized product ids resolve to the default tier; this is the
    /// backward-compatibility path for licences sold before new tiers
    /// existed.
    pub fn tier_for_product(&self, product_id: &str) -> &Tier {
        match self.product_map.get(product_id) {
            Some(tier_id) => self.resolve(tier_id),
            None => self.default_tier(),
        }
    }

    /// The fallback tier
    pub fn default_tier(&self) -> &Tier {
        self.tiers
            .iter()
            .find(|t| t.id == self.default_id)
            .expect("default tier is validated at construction")
    }

    /// All tiers in ascending price order
    pub fn all(&self) -> &[Tier] {
        &self.tiers
    }

    /// Tiers strictly above the given one, for upgrade suggestions
    pub fn upgrade_path(&self, tier_id: &str) -> Vec<&Tier> {
        let current = self.resolve(tier_id).id;
        let idx = self
            .tiers
            .iter()
            .position(|t| t.id == current)
            .unwrap_or(0);
        self.tiers[idx + 1..].iter().collect()
    }
}
