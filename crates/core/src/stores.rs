//! Collaborator interfaces consumed by the engines.
//!
//! Persistence lives outside this workspace; engines only see these traits.
//! `MemoryStore` in [`crate::memory`] implements all of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LeadflowResult;
use crate::types::{AudienceScan, DynamicContentRule, Lead, LeadEvent, LeadPatch};

/// Append-only interaction log, keyed by brand and lead.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_event(&self, brand_id: &str, lead_id: &str, event: LeadEvent)
        -> LeadflowResult<()>;

    /// Full history for a lead, oldest first.
    async fn list_events(&self, brand_id: &str, lead_id: &str) -> LeadflowResult<Vec<LeadEvent>>;

    async fn get_last_event(&self, brand_id: &str, lead_id: &str)
        -> LeadflowResult<Option<LeadEvent>>;

    /// Events with `start <= timestamp < end`.
    async fn count_events_in_window(
        &self,
        brand_id: &str,
        lead_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LeadflowResult<u64>;
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get_lead(&self, brand_id: &str, lead_id: &str) -> LeadflowResult<Option<Lead>>;

    /// Merge `patch` into the lead, creating it on first sight.
    async fn upsert_lead(&self, brand_id: &str, lead_id: &str, patch: LeadPatch)
        -> LeadflowResult<()>;

    /// Up to `limit` leads in stable creation order, strictly after `cursor`.
    async fn list_leads(
        &self,
        brand_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> LeadflowResult<Vec<Lead>>;
}

/// Audience scans are only ever fetched by exact identifier.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn get_scan(&self, scan_id: &str) -> LeadflowResult<Option<AudienceScan>>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_active_rules(&self, brand_id: &str) -> LeadflowResult<Vec<DynamicContentRule>>;
}

#[async_trait]
pub trait RevenueStore: Send + Sync {
    /// Realized purchase revenue summed over the given leads.
    async fn sum_revenue_for_leads(&self, brand_id: &str, lead_ids: &[String])
        -> LeadflowResult<f64>;
}
