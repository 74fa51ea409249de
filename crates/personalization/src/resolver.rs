//! Personalization resolution — which content variations apply to a lead.
//!
//! A rule matches when the segment frozen into its target audience scan
//! equals the lead's persisted segment. The persisted segment is read as-is
//! (no recompute on the serving path), so it may trail the newest event.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use leadflow_core::error::LeadflowResult;
use leadflow_core::stores::{LeadStore, RuleStore, ScanStore};
use leadflow_core::types::{ContentVariation, Segment};

/// Segment reported by the resolver; `Unknown` when the lead does not exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedSegment {
    Hot,
    Warm,
    Cold,
    Unknown,
}

impl From<Segment> for ResolvedSegment {
    fn from(segment: Segment) -> Self {
        match segment {
            Segment::Hot => ResolvedSegment::Hot,
            Segment::Warm => ResolvedSegment::Warm,
            Segment::Cold => ResolvedSegment::Cold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub segment: ResolvedSegment,
    pub variations: Vec<ContentVariation>,
    /// `true` when no rule matched and default content should be served.
    pub fallback: bool,
    pub matched_rule_count: usize,
}

impl Resolution {
    fn fallback(segment: ResolvedSegment) -> Self {
        Self {
            segment,
            variations: Vec::new(),
            fallback: true,
            matched_rule_count: 0,
        }
    }
}

pub struct PersonalizationResolver {
    leads: Arc<dyn LeadStore>,
    rules: Arc<dyn RuleStore>,
    scans: Arc<dyn ScanStore>,
}

impl PersonalizationResolver {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        rules: Arc<dyn RuleStore>,
        scans: Arc<dyn ScanStore>,
    ) -> Self {
        Self {
            leads,
            rules,
            scans,
        }
    }

    /// Resolve content variations for a lead. Identifiers are assumed to be
    /// validated by the caller; store failures propagate.
    pub async fn resolve(&self, brand_id: &str, lead_id: &str) -> LeadflowResult<Resolution> {
        metrics::counter!("resolver.requests").increment(1);

        let Some(lead) = self.leads.get_lead(brand_id, lead_id).await? else {
            debug!(brand_id, lead_id, "Lead not found, serving fallback");
            metrics::counter!("resolver.fallbacks").increment(1);
            return Ok(Resolution::fallback(ResolvedSegment::Unknown));
        };
        let segment = lead.segment();

        let rules = self.rules.list_active_rules(brand_id).await?;
        if rules.is_empty() {
            metrics::counter!("resolver.fallbacks").increment(1);
            return Ok(Resolution::fallback(segment.into()));
        }

        let scan_segments = self.scan_segments(brand_id, &rules).await?;

        let matched: Vec<_> = rules
            .iter()
            .filter(|rule| scan_segments.get(rule.target_persona_id.as_str()) == Some(&segment))
            .collect();
        let variations: Vec<ContentVariation> = matched
            .iter()
            .flat_map(|rule| rule.variations.iter().cloned())
            .collect();

        debug!(
            brand_id,
            lead_id,
            %segment,
            active_rules = rules.len(),
            matched = matched.len(),
            "Personalization resolved"
        );

        let fallback = matched.is_empty();
        if fallback {
            metrics::counter!("resolver.fallbacks").increment(1);
        }
        Ok(Resolution {
            segment: segment.into(),
            variations,
            fallback,
            matched_rule_count: matched.len(),
        })
    }

    /// Fetch exactly the scans the rules reference, each once, by id.
    /// Missing or foreign scans are left out and so never match.
    async fn scan_segments<'r>(
        &self,
        brand_id: &str,
        rules: &'r [leadflow_core::types::DynamicContentRule],
    ) -> LeadflowResult<HashMap<&'r str, Segment>> {
        let scan_ids: BTreeSet<&str> = rules.iter().map(|r| r.target_persona_id.as_str()).collect();

        let lookups = scan_ids.into_iter().map(|id| async move {
            (id, self.scans.get_scan(id).await)
        });

        let mut segments = HashMap::new();
        for (id, scan) in futures::future::join_all(lookups).await {
            match scan? {
                Some(scan) if scan.brand_id == brand_id => {
                    segments.insert(id, scan.segment());
                }
                Some(_) => {
                    warn!(brand_id, scan_id = id, "Rule references another brand's scan");
                }
                None => {
                    debug!(brand_id, scan_id = id, "Referenced scan not found");
                }
            }
        }
        Ok(segments)
    }
}
