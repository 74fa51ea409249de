//! Cohort lifetime-value estimation. One cohort per segment, always all
//! three, projected at 3/6/12-month horizons.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use leadflow_core::config::LtvConfig;
use leadflow_core::error::LeadflowResult;
use leadflow_core::stores::{LeadStore, RevenueStore};
use leadflow_core::types::{LtvCohort, LtvEstimate, ProjectedLtv, Segment};

/// Realized figures for one segment, before projection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CohortStats {
    pub lead_count: u64,
    pub total_revenue: f64,
}

impl CohortStats {
    pub fn avg_revenue_per_lead(&self) -> f64 {
        if self.lead_count == 0 {
            0.0
        } else {
            self.total_revenue / self.lead_count as f64
        }
    }
}

/// Project cohorts from realized stats.
///
/// The projection base of a tier is floored at the best realized average of
/// any lower tier, so with an ordered multiplier curve a higher tier never
/// projects below a lower one. An empty cohort reports zero counts and
/// averages but still projects from that floor.
pub fn build_cohorts(config: &LtvConfig, stats: &BTreeMap<Segment, CohortStats>) -> Vec<LtvCohort> {
    let mut floor = 0.0_f64;
    let mut cohorts = Vec::with_capacity(3);

    // Cold first so the floor accumulates upward.
    for segment in [Segment::Cold, Segment::Warm, Segment::Hot] {
        let stat = stats.get(&segment).copied().unwrap_or_default();
        let avg = stat.avg_revenue_per_lead();

        let base = avg.max(floor);
        let curve = config.curve(segment);
        let projected_ltv = ProjectedLtv {
            m3: base * curve.m3,
            m6: base * curve.m6,
            m12: base * curve.m12,
        };
        floor = floor.max(avg);

        let confidence_score =
            (stat.lead_count as f64 / config.full_confidence_sample.max(1) as f64).min(1.0);

        cohorts.push(LtvCohort {
            segment,
            lead_count: stat.lead_count,
            total_revenue: stat.total_revenue,
            avg_revenue_per_lead: avg,
            projected_ltv,
            confidence_score,
        });
    }

    cohorts.reverse();
    cohorts
}

pub struct LtvEstimator {
    config: LtvConfig,
    leads: Arc<dyn LeadStore>,
    revenue: Arc<dyn RevenueStore>,
}

impl LtvEstimator {
    pub fn new(config: LtvConfig, leads: Arc<dyn LeadStore>, revenue: Arc<dyn RevenueStore>) -> Self {
        Self {
            config,
            leads,
            revenue,
        }
    }

    /// Estimate cohorts over every lead of the brand using the configured
    /// timeout.
    pub async fn estimate_batch(&self, brand_id: &str) -> LeadflowResult<LtvEstimate> {
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_millis(self.config.batch_timeout_ms);
        self.estimate_batch_at(brand_id, deadline).await
    }

    /// Fails only if the first page of leads cannot be read. Later failures,
    /// and anything still pending at `deadline`, yield cohorts over what was
    /// gathered with `complete = false`.
    pub async fn estimate_batch_at(
        &self,
        brand_id: &str,
        deadline: tokio::time::Instant,
    ) -> LeadflowResult<LtvEstimate> {
        let page_size = self.config.page_size.max(1);
        let mut members: BTreeMap<Segment, Vec<String>> =
            Segment::ALL.iter().map(|s| (*s, Vec::new())).collect();
        let mut cursor: Option<String> = None;
        let mut complete = true;

        loop {
            let listed = tokio::time::timeout_at(
                deadline,
                self.leads.list_leads(brand_id, cursor.as_deref(), page_size),
            )
            .await;
            let page = match listed {
                Ok(Ok(page)) => page,
                Ok(Err(e)) if cursor.is_some() => {
                    warn!(brand_id, error = %e, "Lead scan interrupted, estimating from partial scan");
                    complete = false;
                    break;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(brand_id, "Lead scan timed out, estimating from partial scan");
                    complete = false;
                    break;
                }
            };

            for lead in &page {
                members
                    .entry(lead.segment())
                    .or_default()
                    .push(lead.lead_id.clone());
            }
            if page.len() < page_size {
                break;
            }
            cursor = page.last().map(|l| l.lead_id.clone());
        }

        let lookups = members.iter().map(|(segment, ids)| async move {
            let revenue = if ids.is_empty() {
                Ok(Ok(0.0))
            } else {
                tokio::time::timeout_at(
                    deadline,
                    self.revenue.sum_revenue_for_leads(brand_id, ids),
                )
                .await
            };
            (*segment, ids.len() as u64, revenue)
        });

        let mut stats = BTreeMap::new();
        for (segment, lead_count, revenue) in futures::future::join_all(lookups).await {
            let total_revenue = match revenue {
                Ok(Ok(total)) => total,
                Ok(Err(e)) => {
                    warn!(brand_id, %segment, error = %e, "Revenue lookup failed, counting zero");
                    complete = false;
                    0.0
                }
                Err(_) => {
                    warn!(brand_id, %segment, "Revenue lookup timed out, counting zero");
                    complete = false;
                    0.0
                }
            };
            stats.insert(
                segment,
                CohortStats {
                    lead_count,
                    total_revenue,
                },
            );
        }

        let cohorts = build_cohorts(&self.config, &stats);
        info!(
            brand_id,
            leads = stats.values().map(|s| s.lead_count).sum::<u64>(),
            complete,
            "LTV estimation complete"
        );

        Ok(LtvEstimate {
            brand_id: brand_id.to_string(),
            cohorts,
            complete,
            computed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leadflow_core::error::LeadflowError;
    use leadflow_core::types::{Lead, LeadPatch, SegmentedScore};
    use leadflow_core::MemoryStore;

    fn stats(counts: [(Segment, u64, f64); 3]) -> BTreeMap<Segment, CohortStats> {
        counts
            .into_iter()
            .map(|(s, lead_count, total_revenue)| {
                (
                    s,
                    CohortStats {
                        lead_count,
                        total_revenue,
                    },
                )
            })
            .collect()
    }

    fn m12(cohorts: &[LtvCohort], segment: Segment) -> f64 {
        cohorts
            .iter()
            .find(|c| c.segment == segment)
            .map(|c| c.projected_ltv.m12)
            .unwrap()
    }

    fn assert_ordered(cohorts: &[LtvCohort]) {
        for c in cohorts {
            let p = c.projected_ltv;
            assert!(p.m3 < p.m6 && p.m6 < p.m12, "{:?} horizons unordered", c.segment);
        }
        let horizons: [fn(ProjectedLtv) -> f64; 3] = [|p| p.m3, |p| p.m6, |p| p.m12];
        for horizon in horizons {
            let value =
                |s: Segment| horizon(cohorts.iter().find(|c| c.segment == s).unwrap().projected_ltv);
            assert!(value(Segment::Hot) > value(Segment::Warm));
            assert!(value(Segment::Warm) > value(Segment::Cold));
        }
    }

    #[test]
    fn test_reference_cohorts_are_ordered() {
        let cohorts = build_cohorts(
            &LtvConfig::default(),
            &stats([
                (Segment::Hot, 30, 100.0),
                (Segment::Warm, 20, 50.0),
                (Segment::Cold, 10, 20.0),
            ]),
        );
        assert_eq!(cohorts.len(), 3);
        assert_eq!(cohorts[0].segment, Segment::Hot);
        assert!(m12(&cohorts, Segment::Hot) > m12(&cohorts, Segment::Warm));
        assert!(m12(&cohorts, Segment::Warm) > m12(&cohorts, Segment::Cold));
        assert_ordered(&cohorts);
        assert!((cohorts[1].avg_revenue_per_lead - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_ordering_holds_when_cold_outearns_hot() {
        let cohorts = build_cohorts(
            &LtvConfig::default(),
            &stats([
                (Segment::Hot, 5, 10.0),
                (Segment::Warm, 50, 20.0),
                (Segment::Cold, 40, 400.0),
            ]),
        );
        assert_ordered(&cohorts);
        // Realized averages are still reported as observed.
        assert!((cohorts[2].avg_revenue_per_lead - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_middle_tier_projects_from_floor() {
        let cohorts = build_cohorts(
            &LtvConfig::default(),
            &stats([
                (Segment::Hot, 30, 100.0),
                (Segment::Warm, 0, 0.0),
                (Segment::Cold, 10, 20.0),
            ]),
        );
        assert_ordered(&cohorts);
        let warm = &cohorts[1];
        assert_eq!(warm.segment, Segment::Warm);
        assert_eq!(warm.lead_count, 0);
        assert_eq!(warm.avg_revenue_per_lead, 0.0);
        assert_eq!(warm.confidence_score, 0.0);
        // Cold average of 2.0 times the warm curve.
        assert!((warm.projected_ltv.m12 - 12.0).abs() < 1e-9);
        assert!((m12(&cohorts, Segment::Cold) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_segments_are_zero_filled() {
        let cohorts = build_cohorts(&LtvConfig::default(), &BTreeMap::new());
        assert_eq!(cohorts.len(), 3);
        for c in &cohorts {
            assert_eq!(c.lead_count, 0);
            assert_eq!(c.avg_revenue_per_lead, 0.0);
            assert_eq!(c.projected_ltv, ProjectedLtv::default());
            assert_eq!(c.confidence_score, 0.0);
        }
    }

    #[test]
    fn test_confidence_grows_with_sample_and_caps() {
        let config = LtvConfig::default();
        let confidence = |n| {
            build_cohorts(&config, &stats([
                (Segment::Hot, n, 10.0),
                (Segment::Warm, 0, 0.0),
                (Segment::Cold, 0, 0.0),
            ]))[0]
                .confidence_score
        };
        assert!(confidence(10) < confidence(50));
        assert_eq!(confidence(100), 1.0);
        assert_eq!(confidence(10_000), 1.0);
    }

    #[tokio::test]
    async fn test_estimate_batch_scans_all_pages() {
        let store = Arc::new(MemoryStore::new());
        let seed = |prefix: &str, count: usize, score: f64, revenue_each: f64| {
            for i in 0..count {
                let id = format!("{prefix}-{i}");
                let mut lead = Lead::new("brand-1", id.clone(), Utc::now());
                lead.propensity = SegmentedScore::new(score);
                store.insert_lead(lead);
                store.record_revenue("brand-1", &id, revenue_each);
            }
        };
        seed("hot", 30, 0.9, 10.0);
        seed("warm", 20, 0.5, 5.0);
        seed("cold", 10, 0.1, 2.0);

        let config = LtvConfig {
            page_size: 7,
            ..LtvConfig::default()
        };
        let estimator = LtvEstimator::new(config, store.clone(), store);
        let estimate = estimator.estimate_batch("brand-1").await.unwrap();

        assert!(estimate.complete);
        let hot = estimate.cohort(Segment::Hot).unwrap();
        assert_eq!(hot.lead_count, 30);
        assert!((hot.total_revenue - 300.0).abs() < 1e-9);
        assert_eq!(estimate.cohort(Segment::Cold).unwrap().lead_count, 10);
        assert_ordered(&estimate.cohorts);
    }

    struct BrokenRevenue;

    #[async_trait]
    impl RevenueStore for BrokenRevenue {
        async fn sum_revenue_for_leads(&self, _: &str, _: &[String]) -> LeadflowResult<f64> {
            Err(LeadflowError::Store("ledger unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_revenue_failure_marks_incomplete() {
        let store = Arc::new(MemoryStore::new());
        store.insert_lead(Lead::new("brand-1", "lead-1", Utc::now()));
        let estimator = LtvEstimator::new(LtvConfig::default(), store, Arc::new(BrokenRevenue));

        let estimate = estimator.estimate_batch("brand-1").await.unwrap();
        assert!(!estimate.complete);
        assert_eq!(estimate.cohorts.len(), 3);
        assert_eq!(estimate.cohort(Segment::Cold).unwrap().total_revenue, 0.0);
    }

    /// Lead store that serves the first page and fails on every later one.
    struct FailsAfterFirstPage {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl LeadStore for FailsAfterFirstPage {
        async fn get_lead(&self, brand_id: &str, lead_id: &str) -> LeadflowResult<Option<Lead>> {
            self.inner.get_lead(brand_id, lead_id).await
        }

        async fn upsert_lead(&self, brand_id: &str, lead_id: &str, patch: LeadPatch) -> LeadflowResult<()> {
            self.inner.upsert_lead(brand_id, lead_id, patch).await
        }

        async fn list_leads(
            &self,
            brand_id: &str,
            cursor: Option<&str>,
            limit: usize,
        ) -> LeadflowResult<Vec<Lead>> {
            if cursor.is_some() {
                return Err(LeadflowError::Store("replica lost".into()));
            }
            self.inner.list_leads(brand_id, cursor, limit).await
        }
    }

    #[tokio::test]
    async fn test_mid_scan_failure_keeps_scanned_leads() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..12 {
            let id = format!("lead-{i}");
            let mut lead = Lead::new("brand-1", id.clone(), Utc::now());
            lead.propensity = SegmentedScore::new(0.9);
            store.insert_lead(lead);
            store.record_revenue("brand-1", &id, 10.0);
        }
        let config = LtvConfig {
            page_size: 5,
            ..LtvConfig::default()
        };
        let leads = Arc::new(FailsAfterFirstPage {
            inner: store.clone(),
        });
        let estimator = LtvEstimator::new(config, leads, store);

        let estimate = estimator.estimate_batch("brand-1").await.unwrap();
        assert!(!estimate.complete);
        let hot = estimate.cohort(Segment::Hot).unwrap();
        assert_eq!(hot.lead_count, 5);
        assert!((hot.total_revenue - 50.0).abs() < 1e-9);
        assert_eq!(estimate.cohort(Segment::Warm).unwrap().lead_count, 0);
    }

    /// Revenue store that never answers for hot leads.
    struct StalledRevenue {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl RevenueStore for StalledRevenue {
        async fn sum_revenue_for_leads(&self, brand_id: &str, lead_ids: &[String]) -> LeadflowResult<f64> {
            if lead_ids.iter().any(|id| id.starts_with("hot")) {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
            self.inner.sum_revenue_for_leads(brand_id, lead_ids).await
        }
    }

    #[tokio::test]
    async fn test_stalled_revenue_respects_deadline() {
        let store = Arc::new(MemoryStore::new());
        for (id, score) in [("hot-1", 0.9), ("warm-1", 0.5), ("cold-1", 0.1)] {
            let mut lead = Lead::new("brand-1", id, Utc::now());
            lead.propensity = SegmentedScore::new(score);
            store.insert_lead(lead);
            store.record_revenue("brand-1", id, 40.0);
        }
        let revenue = Arc::new(StalledRevenue {
            inner: store.clone(),
        });
        let estimator = LtvEstimator::new(LtvConfig::default(), store, revenue);
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(200);

        let estimate = estimator.estimate_batch_at("brand-1", deadline).await.unwrap();
        assert!(!estimate.complete);
        assert_eq!(estimate.cohort(Segment::Hot).unwrap().total_revenue, 0.0);
        assert!((estimate.cohort(Segment::Warm).unwrap().total_revenue - 40.0).abs() < 1e-9);
        assert_eq!(estimate.cohort(Segment::Hot).unwrap().lead_count, 1);
    }
}
