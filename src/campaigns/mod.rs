//! Campaign Storage Module
//!
//! Durable, ownership-scoped storage for generated campaign payloads.
//! Every read and mutation is scoped to the licence key that created the
//! campaign; ownership mismatch and absence are indistinguishable to the
//! caller, so campaign ids cannot be enumerated across owners.

pub mod service;
pub mod store;

pub use service::{CampaignPage, CampaignService};
pub use store::{Campaign, CampaignStore, CampaignSummary, InMemoryCampaignStore, InsertOutcome};
