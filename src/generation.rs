//! Generation Orchestration
//!
//! The creative generation itself is an external collaborator behind the
//! [`CampaignGenerator`] trait. This module enforces the ordering the
//! gate requires: the entitlement consume is committed strictly before
//! the generator is invoked, and a slot consumed for a generation that
//! then fails downstream is returned by an atomic compensating decrement,
//! so users are not charged for failed generations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::entitlement::{ConsumeDecision, EntitlementManager};
use crate::error::GateError;
use crate::identity::{AddrHash, IdentityKey};
use crate::rate_limit::{DemoRateLimiter, RateLimitDecision};
use crate::retry::{retry_transient, RetryConfig};

/// A validated request to generate an outbound campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Target company name
    pub company_name: String,

    /// Target industry
    pub industry: String,

    /// What is being sold to the target
    pub offer: String,

    /// Copywriting style
    #[serde(default = "default_style")]
    pub style: String,

    /// Rough target company size
    #[serde(default = "default_company_size")]
    pub company_size: String,
}

fn default_style() -> String {
    "professional".to_string()
}

fn default_company_size() -> String {
    "unknown".to_string()
}

/// Successful generation, with quota bookkeeping for the response
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    /// The generated campaign content
    pub payload: Value,

    /// Generation slots left in the billing period; `None` on unlimited
    /// tiers and on the demo path
    pub remaining: Option<u32>,
}

/// External collaborator that produces campaign content
#[async_trait]
pub trait CampaignGenerator: Send + Sync {
    /// Produce campaign content for a validated request
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Value>;
}

/// Deterministic generator used when no LLM provider is configured and in
/// tests. Echoes the request back as a skeletal campaign payload.
#[derive(Debug, Clone, Default)]
pub struct StubGenerator;

#[async_trait]
impl CampaignGenerator for StubGenerator {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Value> {
        Ok(json!({
            "company": {
                "name": request.company_name,
                "industry": request.industry,
                "size": request.company_size,
            },
            "offer": request.offer,
            "style": request.style,
            "emails": [],
        }))
    }
}

/// Gate-then-generate orchestration for paid and demo requests
pub struct GenerationService {
    entitlements: Arc<EntitlementManager>,
    demo_limiter: Arc<DemoRateLimiter>,
    generator: Arc<dyn CampaignGenerator>,
}

impl GenerationService {
    /// Create a service over the gate components and the generator
    pub fn new(
        entitlements: Arc<EntitlementManager>,
        demo_limiter: Arc<DemoRateLimiter>,
        generator: Arc<dyn CampaignGenerator>,
    ) -> Self {
        Self {
            entitlements,
            demo_limiter,
            generator,
        }
    }

    /// Generate for a resolved caller identity: licence keys take the
    /// quota-gated paid path, hashed addresses the rate-limited demo path.
    pub async fn handle(
        &self,
        identity: &IdentityKey,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GateError> {
        match identity {
            IdentityKey::Licence(key) => self.generate(key, request).await,
            IdentityKey::Anonymous(addr) => self.demo(addr, request).await,
        }
    }

    /// Paid generation: consume a quota slot, then run the generator.
    ///
    /// The consume is committed before the generator runs; if the
    /// generator fails, the slot is refunded and the failure surfaces as
    /// a server fault, never as a quota denial.
    pub async fn generate(
        &self,
        licence_key: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GateError> {
        let remaining = match self.entitlements.check_and_consume(licence_key).await? {
            ConsumeDecision::Allowed { remaining } => remaining,
            ConsumeDecision::Denied { tier, limit, reset_at } => {
                return Err(GateError::QuotaExceeded { tier, limit, reset_at });
            }
        };

        match self.generator.generate(request).await {
            Ok(payload) => {
                info!(company = %request.company_name, "campaign generated");
                Ok(GenerationOutput { payload, remaining })
            }
            Err(e) => {
                warn!("generation failed, refunding consumed slot: {e}");
                // The caller always sees the generation failure; a refund
                // that keeps failing after retries must not mask it
                let entitlements = self.entitlements.clone();
                let key = licence_key.to_string();
                let refund = retry_transient(&RetryConfig::default(), move || {
                    let entitlements = entitlements.clone();
                    let key = key.clone();
                    async move { entitlements.refund(&key).await }
                })
                .await;
                if let Err(refund_err) = refund {
                    warn!("refund failed, slot stays consumed: {refund_err}");
                }
                Err(GateError::GenerationFailed(e.to_string()))
            }
        }
    }

    /// Anonymous demo generation: gated by the sliding-window rate
    /// limiter only; usage counters are never touched.
    pub async fn demo(
        &self,
        addr: &AddrHash,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GateError> {
        match self.demo_limiter.check_and_record(addr).await? {
            RateLimitDecision::Allowed { .. } => {}
            RateLimitDecision::Denied { retry_after } => {
                return Err(GateError::RateLimitExceeded {
                    retry_after_secs: retry_after.as_secs(),
                });
            }
        }

        let payload = self
            .generator
            .generate(request)
            .await
            .map_err(|e| GateError::GenerationFailed(e.to_string()))?;

        Ok(GenerationOutput {
            payload,
            remaining: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoConfig;
    use crate::entitlement::{
        ConsumeOutcome, Entitlement, EntitlementStore, InMemoryEntitlementStore,
        StaticLicenceValidator,
    };
    use crate::identity::AddrHasher;
    use crate::rate_limit::InMemoryRateLimitStore;
    use crate::tiers::{Limit, TierCatalog};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Generator that fails while the flag is set
    struct FlakyGenerator {
        failing: AtomicBool,
    }

    #[async_trait]
    impl CampaignGenerator for FlakyGenerator {
        async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Value> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("provider timeout");
            }
            StubGenerator.generate(request).await
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            company_name: "Acme".to_string(),
            industry: "SaaS".to_string(),
            offer: "Outbound automation".to_string(),
            style: default_style(),
            company_size: default_company_size(),
        }
    }

    fn service_with(generator: Arc<dyn CampaignGenerator>) -> GenerationService {
        let mut products = HashMap::new();
        products.insert("prod-starter".to_string(), "starter".to_string());

        let entitlements = Arc::new(EntitlementManager::new(
            Arc::new(TierCatalog::builtin("professional", products)),
            Arc::new(InMemoryEntitlementStore::new()),
            Arc::new(StaticLicenceValidator::new().with_key("GUM-K1-00000", "prod-starter")),
            30,
        ));
        let demo_limiter = Arc::new(DemoRateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            &DemoConfig {
                limit: 3,
                window_hours: 24,
            },
        ));
        GenerationService::new(entitlements, demo_limiter, generator)
    }

    #[tokio::test]
    async fn test_paid_generation_consumes_slot() {
        let service = service_with(Arc::new(StubGenerator));

        let output = service.generate("GUM-K1-00000", &request()).await.unwrap();
        assert_eq!(output.remaining, Some(9));
        assert_eq!(output.payload.pointer("/company/name").unwrap(), "Acme");
    }

    #[tokio::test]
    async fn test_quota_exhaustion_surfaces_denial() {
        let service = service_with(Arc::new(StubGenerator));

        for _ in 0..10 {
            service.generate("GUM-K1-00000", &request()).await.unwrap();
        }

        let err = service.generate("GUM-K1-00000", &request()).await.unwrap_err();
        match err {
            GateError::QuotaExceeded { tier, limit, .. } => {
                assert_eq!(tier, "starter");
                assert_eq!(limit, 10);
            }
            other => panic!("expected quota denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_generation_refunds_slot() {
        let generator = Arc::new(FlakyGenerator {
            failing: AtomicBool::new(true),
        });
        let service = service_with(generator.clone());

        let err = service.generate("GUM-K1-00000", &request()).await.unwrap_err();
        assert!(matches!(err, GateError::GenerationFailed(_)));

        // The slot came back: ten successes still fit in the period
        generator.failing.store(false, Ordering::SeqCst);
        for _ in 0..10 {
            service.generate("GUM-K1-00000", &request()).await.unwrap();
        }
        assert!(matches!(
            service.generate("GUM-K1-00000", &request()).await,
            Err(GateError::QuotaExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_handle_dispatches_on_identity() {
        let service = service_with(Arc::new(StubGenerator));
        let addr = AddrHasher::new(b"salt").hash_addr("198.51.100.6");

        let paid = service
            .handle(&IdentityKey::Licence("GUM-K1-00000".to_string()), &request())
            .await
            .unwrap();
        assert_eq!(paid.remaining, Some(9));

        let demo = service
            .handle(&IdentityKey::Anonymous(addr), &request())
            .await
            .unwrap();
        assert_eq!(demo.remaining, None);
    }

    /// Store whose refunds always fail transiently
    struct RefundFailingStore {
        inner: InMemoryEntitlementStore,
        refund_attempts: AtomicUsize,
    }

    #[async_trait]
    impl EntitlementStore for RefundFailingStore {
        async fn get(&self, licence_key: &str) -> Result<Option<Entitlement>, GateError> {
            self.inner.get(licence_key).await
        }

        async fn upsert(&self, entitlement: Entitlement) -> Result<(), GateError> {
            self.inner.upsert(entitlement).await
        }

        async fn try_consume(
            &self,
            licence_key: &str,
            period: u32,
            limit: Limit,
        ) -> Result<ConsumeOutcome, GateError> {
            self.inner.try_consume(licence_key, period, limit).await
        }

        async fn refund(&self, _licence_key: &str, _period: u32) -> Result<(), GateError> {
            self.refund_attempts.fetch_add(1, Ordering::SeqCst);
            Err(GateError::TransientStorage("contention".to_string()))
        }

        async fn consumed(&self, licence_key: &str, period: u32) -> Result<u32, GateError> {
            self.inner.consumed(licence_key, period).await
        }
    }

    #[tokio::test]
    async fn test_refund_failure_does_not_mask_generation_error() {
        let mut products = HashMap::new();
        products.insert("prod-starter".to_string(), "starter".to_string());

        let store = Arc::new(RefundFailingStore {
            inner: InMemoryEntitlementStore::new(),
            refund_attempts: AtomicUsize::new(0),
        });
        let entitlements = Arc::new(EntitlementManager::new(
            Arc::new(TierCatalog::builtin("professional", products)),
            store.clone(),
            Arc::new(StaticLicenceValidator::new().with_key("GUM-K1-00000", "prod-starter")),
            30,
        ));
        let demo_limiter = Arc::new(DemoRateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            &DemoConfig {
                limit: 3,
                window_hours: 24,
            },
        ));
        let service = GenerationService::new(
            entitlements,
            demo_limiter,
            Arc::new(FlakyGenerator {
                failing: AtomicBool::new(true),
            }),
        );

        // The caller sees the generation failure, not the storage fault
        let err = service.generate("GUM-K1-00000", &request()).await.unwrap_err();
        assert!(matches!(err, GateError::GenerationFailed(_)));

        // The refund was retried to exhaustion before giving up
        assert_eq!(store.refund_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_demo_path_rate_limited() {
        let service = service_with(Arc::new(StubGenerator));
        let addr = AddrHasher::new(b"salt").hash_addr("198.51.100.7");

        for _ in 0..3 {
            let output = service.demo(&addr, &request()).await.unwrap();
            assert_eq!(output.remaining, None);
        }

        let err = service.demo(&addr, &request()).await.unwrap_err();
        assert!(matches!(err, GateError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_demo_failure_does_not_touch_quota() {
        let service = service_with(Arc::new(FlakyGenerator {
            failing: AtomicBool::new(true),
        }));
        let addr = AddrHasher::new(b"salt").hash_addr("198.51.100.8");

        let err = service.demo(&addr, &request()).await.unwrap_err();
        assert!(matches!(err, GateError::GenerationFailed(_)));
    }
}
