//! Licence Validation Collaborator
//!
//! External verification of licence keys against the payment provider.
//! The provider call returns a product identifier on success; mapping
//! that product to a tier is the catalog's job. The cryptographic side of
//! key verification is entirely the provider's concern.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// A licence accepted by the verification provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLicence {
    /// Product identifier the purchase was made under
    pub product_id: String,
}

/// Error from the verification collaborator
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The provider rejected the key (unknown, refunded, chargebacked)
    #[error("Licence rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached; retryable
    #[error("Licence provider unavailable: {0}")]
    Unavailable(String),
}

/// External licence-validation collaborator
#[async_trait]
pub trait LicenceValidator: Send + Sync {
    /// Verify a licence key, returning the product it was purchased under
    async fn validate(&self, licence_key: &str) -> Result<ValidatedLicence, ValidationError>;
}

/// Wire shape of the provider's verify response
#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    purchase: Option<Purchase>,
}

#[derive(Debug, Deserialize)]
struct Purchase {
    #[serde(default)]
    refunded: bool,
    #[serde(default)]
    chargebacked: bool,
}

/// HTTP licence validator against a Gumroad-style verify endpoint
///
/// A licence may have been purchased under any configured product, so the
/// verify call is tried per product id until one matches.
pub struct HttpLicenceValidator {
    client: reqwest::Client,
    verify_url: String,
    product_ids: Vec<String>,
}

impl HttpLicenceValidator {
    /// Create a validator for the given endpoint and product ids
    pub fn new(
        verify_url: String,
        product_ids: Vec<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        if product_ids.is_empty() {
            anyhow::bail!("no product ids configured for licence verification");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            verify_url,
            product_ids,
        })
    }
}

#[async_trait]
impl LicenceValidator for HttpLicenceValidator {
    async fn validate(&self, licence_key: &str) -> Result<ValidatedLicence, ValidationError> {
        if licence_key.len() < 10 {
            return Err(ValidationError::Rejected(
                "invalid licence key format".to_string(),
            ));
        }

        for product_id in &self.product_ids {
            let response = self
                .client
                .post(&self.verify_url)
                .form(&[
                    ("product_id", product_id.as_str()),
                    ("license_key", licence_key),
                ])
                .send()
                .await
                .map_err(|e| ValidationError::Unavailable(e.to_string()))?;

            if !response.status().is_success() {
                // Provider answers non-2xx for keys of other products
                continue;
            }

            let body: VerifyResponse = response
                .json()
                .await
                .map_err(|e| ValidationError::Unavailable(e.to_string()))?;

            if !body.success {
                continue;
            }

            if let Some(purchase) = body.purchase {
                if purchase.refunded {
                    return Err(ValidationError::Rejected("licence was refunded".to_string()));
                }
                if purchase.chargebacked {
                    return Err(ValidationError::Rejected(
                        "licence was chargebacked".to_string(),
                    ));
                }
            }

            debug!(product_id, "licence verified");
            return Ok(ValidatedLicence {
                product_id: product_id.clone(),
            });
        }

        warn!("licence not found under any configured product");
        Err(ValidationError::Rejected(
            "licence key not found for any product".to_string(),
        ))
    }
}

/// Static in-memory validator for tests and local development
#[derive(Debug, Clone, Default)]
pub struct StaticLicenceValidator {
    keys: HashMap<String, String>,
}

impl StaticLicenceValidator {
    /// Create an empty validator that rejects everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a licence key as purchased under the given product
    pub fn with_key(mut self, licence_key: &str, product_id: &str) -> Self {
        self.keys
            .insert(licence_key.to_string(), product_id.to_string());
        self
    }
}

#[async_trait]
impl LicenceValidator for StaticLicenceValidator {
    async fn validate(&self, licence_key: &str) -> Result<ValidatedLicence, ValidationError> {
        match self.keys.get(licence_key) {
            Some(product_id) => Ok(ValidatedLicence {
                product_id: product_id.clone(),
            }),
            None => Err(ValidationError::Rejected("unknown licence key".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_validator_accepts_known_key() {
        let validator = StaticLicenceValidator::new().with_key("GUM-TEST-111", "prod-pro");
        let validated = validator.validate("GUM-TEST-111").await.unwrap();
        assert_eq!(validated.product_id, "prod-pro");
    }

    #[tokio::test]
    async fn test_static_validator_rejects_unknown_key() {
        let validator = StaticLicenceValidator::new();
        let err = validator.validate("GUM-NOPE").await.unwrap_err();
        assert!(matches!(err, ValidationError::Rejected(_)));
    }

    #[test]
    fn test_http_validator_requires_products() {
        let result = HttpLicenceValidator::new(
            "https://example.test/verify".to_string(),
            Vec::new(),
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }
}
