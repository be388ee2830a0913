//! Gate Error Taxonomy
//!
//! Every denial the gate can issue is a distinct variant carrying the
//! detail a caller needs to act on it: when the quota resets, how long
//! until the demo window opens, which limit was hit. The server layer
//! maps these onto HTTP statuses without inspecting message strings.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the entitlement gate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    /// The licence key was rejected by the payment provider
    #[error("Invalid licence: {0}")]
    InvalidLicence(String),

    /// The licence's validity window is over
    #[error("Licence expired at {expired_at}")]
    LicenceExpired {
        /// When the validity window ended
        expired_at: DateTime<Utc>,
    },

    /// The per-period campaign quota is exhausted
    #[error("Campaign quota of {limit} exhausted for tier '{tier}'")]
    QuotaExceeded {
        /// Tier the licence resolved to
        tier: String,
        /// Campaign limit of that tier
        limit: u32,
        /// Start of the next billing period
        reset_at: DateTime<Utc>,
    },

    /// The tier's saved-campaign limit is reached
    #[error("Save limit of {limit} reached")]
    SaveLimitExceeded {
        /// Saved-campaign limit of the tier
        limit: u32,
    },

    /// The demo window for this address is full
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimitExceeded {
        /// Seconds until the oldest request leaves the window
        retry_after_secs: u64,
    },

    /// The campaign does not exist for this owner
    #[error("Not found")]
    NotFound,

    /// The downstream generator failed after the gate allowed the request
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Storage or provider trouble that is worth retrying
    #[error("Transient storage error: {0}")]
    TransientStorage(String),
}

impl GateError {
    /// Whether the caller, not the service, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLicence(_)
                | Self::LicenceExpired { .. }
                | Self::QuotaExceeded { .. }
                | Self::SaveLimitExceeded { .. }
                | Self::RateLimitExceeded { .. }
                | Self::NotFound
        )
    }

    /// Whether retrying the same request can succeed without the caller
    /// changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_flagged() {
        assert!(GateError::NotFound.is_client_error());
        assert!(GateError::InvalidLicence("bad key".into()).is_client_error());
        assert!(GateError::SaveLimitExceeded { limit: 3 }.is_client_error());
        assert!(GateError::RateLimitExceeded { retry_after_secs: 60 }.is_client_error());

        assert!(!GateError::TransientStorage("busy".into()).is_client_error());
        assert!(!GateError::GenerationFailed("timeout".into()).is_client_error());
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(GateError::TransientStorage("busy".into()).is_retryable());

        assert!(!GateError::NotFound.is_retryable());
        assert!(!GateError::GenerationFailed("timeout".into()).is_retryable());
        assert!(!GateError::QuotaExceeded {
            tier: "starter".into(),
            limit: 10,
            reset_at: Utc::now(),
        }
        .is_retryable());
    }

    #[test]
    fn test_messages_carry_detail() {
        let err = GateError::QuotaExceeded {
            tier: "starter".into(),
            limit: 10,
            reset_at: Utc::now(),
        };
        assert!(err.to_string().contains("starter"));
        assert!(err.to_string().contains("10"));

        let err = GateError::RateLimitExceeded { retry_after_secs: 82800 };
        assert!(err.to_string().contains("82800"));
    }
}
