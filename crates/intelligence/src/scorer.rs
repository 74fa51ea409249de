//! On-demand propensity refresh: load history, score, persist score and
//! segment in one write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use leadflow_core::error::LeadflowResult;
use leadflow_core::stores::{EventStore, LeadStore};
use leadflow_core::types::{Lead, LeadPatch, PropensityResult};

use crate::propensity::PropensityEngine;

#[derive(Clone)]
pub struct LeadScorer {
    engine: Arc<PropensityEngine>,
    events: Arc<dyn EventStore>,
    leads: Arc<dyn LeadStore>,
}

impl std::fmt::Debug for LeadScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadScorer").field("engine", &self.engine).finish()
    }
}

impl LeadScorer {
    pub fn new(
        engine: PropensityEngine,
        events: Arc<dyn EventStore>,
        leads: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            events,
            leads,
        }
    }

    /// Score a lead against its stored history without persisting.
    pub async fn score(&self, lead: &Lead, now: DateTime<Utc>) -> LeadflowResult<PropensityResult> {
        let events = self.events.list_events(&lead.brand_id, &lead.lead_id).await?;
        Ok(self.engine.calculate(lead, &events, now))
    }

    /// Recompute and persist. Returns `None` when the lead does not exist.
    pub async fn refresh(
        &self,
        brand_id: &str,
        lead_id: &str,
    ) -> LeadflowResult<Option<PropensityResult>> {
        let Some(lead) = self.leads.get_lead(brand_id, lead_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let result = self.score(&lead, now).await?;
        self.leads
            .upsert_lead(
                brand_id,
                lead_id,
                LeadPatch::new(now).with_propensity(result.propensity),
            )
            .await?;

        info!(
            brand_id,
            lead_id,
            score = result.score(),
            segment = %result.segment(),
            previous = %lead.segment(),
            "Propensity refreshed"
        );
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use leadflow_core::types::{EventType, LeadEvent, Segment};
    use leadflow_core::MemoryStore;

    #[tokio::test]
    async fn test_refresh_persists_score_and_segment_together() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store.insert_lead(Lead::new("brand-1", "lead-1", now - Duration::days(3)));
        for event_type in [
            EventType::CheckoutInit,
            EventType::CheckoutInit,
            EventType::VslWatch,
            EventType::LeadCapture,
            EventType::CheckoutInit,
        ] {
            store
                .append_event(
                    "brand-1",
                    "lead-1",
                    LeadEvent {
                        event_type,
                        platform: "web".into(),
                        timestamp: now - Duration::hours(2),
                        payload: None,
                    },
                )
                .await
                .unwrap();
        }

        let scorer = LeadScorer::new(PropensityEngine::default(), store.clone(), store.clone());
        let result = scorer.refresh("brand-1", "lead-1").await.unwrap().unwrap();
        // 75 base + 10 recency
        assert!((result.score() - 0.85).abs() < 1e-9);
        assert_eq!(result.segment(), Segment::Hot);

        let lead = store.get_lead("brand-1", "lead-1").await.unwrap().unwrap();
        assert_eq!(lead.segment(), Segment::Hot);
        assert_eq!(lead.propensity_score(), result.score());
    }

    #[tokio::test]
    async fn test_refresh_unknown_lead() {
        let store = Arc::new(MemoryStore::new());
        let scorer = LeadScorer::new(PropensityEngine::default(), store.clone(), store);
        assert!(scorer.refresh("brand-1", "ghost").await.unwrap().is_none());
    }
}
