//! CampaignForge Backend Library
//!
//! This library provides the core functionality for the CampaignForge
//! backend: purchase-tier entitlements, per-licence usage quotas,
//! anonymous demo rate limiting and ownership-scoped campaign storage.
//!
//! The creative generation itself (the LLM call) is an external
//! collaborator behind the [`generation::CampaignGenerator`] trait; this
//! crate decides *whether* a generation may run and records that it did.

pub mod campaigns;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod generation;
pub mod identity;
pub mod rate_limit;
pub mod retry;
pub mod server;
pub mod tiers;
