//! In-process collaborator backed by DashMap for lock-free concurrent access.
//! Implements every store trait; used by the dev binary and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{LeadflowError, LeadflowResult};
use crate::stores::{EventStore, LeadStore, RevenueStore, RuleStore, ScanStore};
use crate::types::{AudienceScan, DynamicContentRule, Lead, LeadEvent, LeadPatch};

type LeadKey = (String, String);

fn key(brand_id: &str, lead_id: &str) -> LeadKey {
    (brand_id.to_string(), lead_id.to_string())
}

#[derive(Default)]
pub struct MemoryStore {
    leads: DashMap<LeadKey, Lead>,
    /// Lead ids per brand in creation order; drives cursor pagination.
    lead_order: DashMap<String, Vec<String>>,
    events: DashMap<LeadKey, Vec<LeadEvent>>,
    scans: DashMap<String, AudienceScan>,
    rules: RwLock<Vec<DynamicContentRule>>,
    revenue: DashMap<LeadKey, f64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a lead as-is.
    pub fn insert_lead(&self, lead: Lead) {
        let k = key(&lead.brand_id, &lead.lead_id);
        if !self.leads.contains_key(&k) {
            self.lead_order
                .entry(lead.brand_id.clone())
                .or_default()
                .push(lead.lead_id.clone());
        }
        self.leads.insert(k, lead);
    }

    pub fn insert_scan(&self, scan: AudienceScan) {
        self.scans.insert(scan.id.clone(), scan);
    }

    /// Insert a rule, replacing any rule with the same id.
    pub fn insert_rule(&self, rule: DynamicContentRule) {
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }

    pub fn record_revenue(&self, brand_id: &str, lead_id: &str, amount: f64) {
        *self.revenue.entry(key(brand_id, lead_id)).or_insert(0.0) += amount;
    }

    pub fn lead_count(&self, brand_id: &str) -> usize {
        self.lead_order.get(brand_id).map_or(0, |ids| ids.len())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_event(
        &self,
        brand_id: &str,
        lead_id: &str,
        event: LeadEvent,
    ) -> LeadflowResult<()> {
        self.events.entry(key(brand_id, lead_id)).or_default().push(event);
        Ok(())
    }

    async fn list_events(&self, brand_id: &str, lead_id: &str) -> LeadflowResult<Vec<LeadEvent>> {
        let mut events = self
            .events
            .get(&key(brand_id, lead_id))
            .map(|e| e.clone())
            .unwrap_or_default();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn get_last_event(
        &self,
        brand_id: &str,
        lead_id: &str,
    ) -> LeadflowResult<Option<LeadEvent>> {
        Ok(self
            .events
            .get(&key(brand_id, lead_id))
            .and_then(|events| events.iter().max_by_key(|e| e.timestamp).cloned()))
    }

    async fn count_events_in_window(
        &self,
        brand_id: &str,
        lead_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LeadflowResult<u64> {
        Ok(self.events.get(&key(brand_id, lead_id)).map_or(0, |events| {
            events
                .iter()
                .filter(|e| e.timestamp >= start && e.timestamp < end)
                .count() as u64
        }))
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn get_lead(&self, brand_id: &str, lead_id: &str) -> LeadflowResult<Option<Lead>> {
        Ok(self.leads.get(&key(brand_id, lead_id)).map(|l| l.clone()))
    }

    async fn upsert_lead(
        &self,
        brand_id: &str,
        lead_id: &str,
        patch: LeadPatch,
    ) -> LeadflowResult<()> {
        let mut created = false;
        self.leads
            .entry(key(brand_id, lead_id))
            .or_insert_with(|| {
                created = true;
                Lead::new(brand_id, lead_id, patch.updated_at)
            })
            .apply(patch);
        if created {
            debug!(brand_id, lead_id, "Lead created");
            self.lead_order
                .entry(brand_id.to_string())
                .or_default()
                .push(lead_id.to_string());
        }
        Ok(())
    }

    async fn list_leads(
        &self,
        brand_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> LeadflowResult<Vec<Lead>> {
        let ids: Vec<String> = match self.lead_order.get(brand_id) {
            Some(order) => {
                let start = match cursor {
                    Some(c) => {
                        order.iter().position(|id| id == c).ok_or_else(|| {
                            LeadflowError::Validation(format!("unknown cursor '{c}'"))
                        })? + 1
                    }
                    None => 0,
                };
                order.iter().skip(start).take(limit).cloned().collect()
            }
            None => Vec::new(),
        };

        Ok(ids
            .iter()
            .filter_map(|id| self.leads.get(&key(brand_id, id)).map(|l| l.clone()))
            .collect())
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn get_scan(&self, scan_id: &str) -> LeadflowResult<Option<AudienceScan>> {
        Ok(self.scans.get(scan_id).map(|s| s.clone()))
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn list_active_rules(&self, brand_id: &str) -> LeadflowResult<Vec<DynamicContentRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.brand_id == brand_id && r.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RevenueStore for MemoryStore {
    async fn sum_revenue_for_leads(
        &self,
        brand_id: &str,
        lead_ids: &[String],
    ) -> LeadflowResult<f64> {
        Ok(lead_ids
            .iter()
            .filter_map(|id| self.revenue.get(&key(brand_id, id)).map(|r| *r))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use chrono::Duration;

    fn event(event_type: EventType, at: DateTime<Utc>) -> LeadEvent {
        LeadEvent {
            event_type,
            platform: "web".into(),
            timestamp: at,
            payload: None,
        }
    }

    #[tokio::test]
    async fn test_list_leads_paginates_in_creation_order() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for i in 1..=12 {
            store.insert_lead(Lead::new("brand-1", format!("lead-{i}"), now));
        }
        store.insert_lead(Lead::new("brand-2", "other", now));

        let first = store.list_leads("brand-1", None, 10).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first[9].lead_id, "lead-10");

        let rest = store.list_leads("brand-1", Some("lead-10"), 10).await.unwrap();
        let ids: Vec<_> = rest.iter().map(|l| l.lead_id.as_str()).collect();
        assert_eq!(ids, vec!["lead-11", "lead-12"]);

        assert!(store.list_leads("brand-1", Some("missing"), 10).await.is_err());
        assert!(store.list_leads("brand-3", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_creates_then_merges() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut patch = LeadPatch::new(now);
        patch.event_count_delta = 1;
        store.upsert_lead("brand-1", "lead-1", patch.clone()).await.unwrap();
        store.upsert_lead("brand-1", "lead-1", patch).await.unwrap();

        let lead = store.get_lead("brand-1", "lead-1").await.unwrap().unwrap();
        assert_eq!(lead.event_count, 2);
        assert_eq!(store.lead_count("brand-1"), 1);
    }

    #[tokio::test]
    async fn test_event_windows_and_last_event() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for days in [1, 3, 10, 20] {
            store
                .append_event("b", "l", event(EventType::PageView, now - Duration::days(days)))
                .await
                .unwrap();
        }
        store
            .append_event("b", "l", event(EventType::CheckoutInit, now))
            .await
            .unwrap();

        let last = store.get_last_event("b", "l").await.unwrap().unwrap();
        assert_eq!(last.event_type, EventType::CheckoutInit);

        let recent = store
            .count_events_in_window("b", "l", now - Duration::days(7), now)
            .await
            .unwrap();
        assert_eq!(recent, 2);
        assert!(store.get_last_event("b", "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revenue_sums_only_requested_leads() {
        let store = MemoryStore::new();
        store.record_revenue("b", "l1", 40.0);
        store.record_revenue("b", "l1", 10.0);
        store.record_revenue("b", "l2", 25.0);
        store.record_revenue("other", "l1", 999.0);

        let total = store
            .sum_revenue_for_leads("b", &["l1".to_string(), "l3".to_string()])
            .await
            .unwrap();
        assert_eq!(total, 50.0);
    }
}
