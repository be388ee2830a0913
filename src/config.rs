//! Backend Configuration
//!
//! Configuration for the entitlement gate, demo rate limiter and HTTP
//! server. Defaults can be overridden through `CAMPAIGNFORGE_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default anonymous demo requests per rolling window
pub const DEFAULT_DEMO_LIMIT: u32 = 3;
/// Default demo rate-limit window in hours
pub const DEFAULT_DEMO_WINDOW_HOURS: u64 = 24;
/// Default billing period length in days, anchored at activation
pub const DEFAULT_BILLING_PERIOD_DAYS: u32 = 30;
/// Default fallback tier for unrecognized licences
pub const DEFAULT_TIER_ID: &str = "professional";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Anonymous demo rate limiting
    pub demo: DemoConfig,

    /// Billing and tier resolution
    pub billing: BillingConfig,

    /// External licence verification provider
    pub licence: LicenceProviderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            demo: DemoConfig::default(),
            billing: BillingConfig::default(),
            licence: LicenceProviderConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, starting from defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CAMPAIGNFORGE_PORT") {
            if let Ok(port) = val.parse() {
                config.server.port = port;
            }
        }

        if let Ok(val) = std::env::var("CAMPAIGNFORGE_ADDR_SALT") {
            config.server.addr_salt = val;
        }

        if let Ok(val) = std::env::var("CAMPAIGNFORGE_DEMO_LIMIT") {
            if let Ok(limit) = val.parse() {
                config.demo.limit = limit;
            }
        }

        if let Ok(val) = std::env::var("CAMPAIGNFORGE_DEMO_WINDOW_HOURS") {
            if let Ok(hours) = val.parse() {
                config.demo.window_hours = hours;
            }
        }

        if let Ok(val) = std::env::var("CAMPAIGNFORGE_DEFAULT_TIER") {
            config.billing.default_tier = val;
        }

        if let Ok(val) = std::env::var("CAMPAIGNFORGE_BILLING_PERIOD_DAYS") {
            if let Ok(days) = val.parse() {
                config.billing.period_days = days;
            }
        }

        if let Ok(val) = std::env::var("CAMPAIGNFORGE_LICENCE_VERIFY_URL") {
            config.licence.verify_url = Some(val);
        }

        if let Ok(val) = std::env::var("CAMPAIGNFORGE_LICENCE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.licence.timeout_secs = secs;
            }
        }

        // Product ids are per tier: CAMPAIGNFORGE_PRODUCT_ID_STARTER etc.
        for tier in ["starter", "professional", "unlimited", "agency"] {
            let var = format!("CAMPAIGNFORGE_PRODUCT_ID_{}", tier.to_uppercase());
            if let Ok(product_id) = std::env::var(&var) {
                config.licence.product_ids.insert(product_id, tier.to_string());
            }
        }

        config
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Salt mixed into anonymous address hashes
    pub addr_salt: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            addr_salt: "campaignforge-dev-salt".to_string(),
        }
    }
}

/// Anonymous demo rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Demo requests allowed per address per rolling window
    pub limit: u32,

    /// Rolling window length in hours
    pub window_hours: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_DEMO_LIMIT,
            window_hours: DEFAULT_DEMO_WINDOW_HOURS,
        }
    }
}

impl DemoConfig {
    /// Window length as a duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_hours * 3600)
    }
}

/// Billing and tier resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BillingConfig {
    /// Fallback tier for unrecognized-but-valid licences
    pub default_tier: String,

    /// Billing period length in days, anchored at licence activation
    pub period_days: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_tier: DEFAULT_TIER_ID.to_string(),
            period_days: DEFAULT_BILLING_PERIOD_DAYS,
        }
    }
}

/// External licence verification provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LicenceProviderConfig {
    /// Verification endpoint; `None` falls back to the static dev validator
    pub verify_url: Option<String>,

    /// Payment-provider product id → tier id
    pub product_ids: HashMap<String, String>,

    /// Timeout for a verification call in seconds
    pub timeout_secs: u64,
}

impl Default for LicenceProviderConfig {
    fn default() -> Self {
        Self {
            verify_url: None,
            product_ids: HashMap::new(),
            timeout_secs: 15,
        }
    }
}
