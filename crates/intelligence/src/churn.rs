//! Churn prediction — cursor-paginated batch scan of a brand's leads.
//!
//! Each page is capped at [`MAX_CHURN_PAGE_SIZE`] leads. Per-lead event
//! lookups run concurrently (bounded by the page size) and are joined in
//! cursor order, so a partial result on timeout is always a prefix of the
//! page and the returned cursor resumes exactly where it stopped. The lead
//! listing itself runs under the same deadline. Lifecycle events are only
//! emitted for predictions that make it into the returned batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use tracing::{info, warn};

use leadflow_core::config::{ChurnConfig, MAX_CHURN_PAGE_SIZE};
use leadflow_core::error::LeadflowResult;
use leadflow_core::event_bus::{make_event, EventSink, LifecycleDetail, LifecycleEventType};
use leadflow_core::stores::{EventStore, LeadStore};
use leadflow_core::types::{ActivityTrend, ChurnBatch, ChurnPrediction, Lead, RiskLevel, Segment};

/// Observed activity for one lead with at least one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadActivity {
    pub days_inactive: i64,
    pub recent_window_events: u64,
    pub older_window_events: u64,
}

impl LeadActivity {
    pub fn trend(&self) -> ActivityTrend {
        use std::cmp::Ordering;
        match self.recent_window_events.cmp(&self.older_window_events) {
            Ordering::Less => ActivityTrend::Declining,
            Ordering::Equal => ActivityTrend::Steady,
            Ordering::Greater => ActivityTrend::Growing,
        }
    }
}

/// Risk assessment for a lead with observed activity.
pub fn assess(config: &ChurnConfig, lead_id: &str, segment: Segment, activity: LeadActivity) -> ChurnPrediction {
    let trend = activity.trend();
    let declining = trend == ActivityTrend::Declining;
    let horizon = config.critical_inactivity_days.saturating_mul(2).max(1) as f64;

    let inactivity = (activity.days_inactive as f64 / horizon).clamp(0.0, 1.0);
    let segment_bias = match segment {
        Segment::Hot => 0.0,
        Segment::Warm => 0.05,
        Segment::Cold => 0.1,
    };
    let churn_risk =
        (inactivity * 0.7 + if declining { 0.2 } else { 0.0 } + segment_bias).clamp(0.0, 1.0);

    let risk_level = if segment == Segment::Hot
        && activity.days_inactive >= config.critical_inactivity_days
        && declining
    {
        RiskLevel::Critical
    } else if activity.days_inactive >= config.warning_inactivity_days {
        RiskLevel::Warning
    } else {
        RiskLevel::Safe
    };

    let predicted_segment = if risk_level == RiskLevel::Critical {
        segment.downgrade()
    } else {
        segment
    };

    ChurnPrediction {
        lead_id: lead_id.to_string(),
        churn_risk,
        risk_level,
        current_segment: segment,
        predicted_segment,
        days_inactive: Some(activity.days_inactive),
        trend: Some(trend),
    }
}

/// Prediction for a lead with no observable events.
pub fn assess_without_activity(config: &ChurnConfig, lead_id: &str, segment: Segment) -> ChurnPrediction {
    ChurnPrediction {
        lead_id: lead_id.to_string(),
        churn_risk: config.no_event_risk,
        risk_level: RiskLevel::Warning,
        current_segment: segment,
        predicted_segment: segment,
        days_inactive: None,
        trend: None,
    }
}

pub struct ChurnPredictor {
    config: ChurnConfig,
    events: Arc<dyn EventStore>,
    leads: Arc<dyn LeadStore>,
    event_sink: Arc<dyn EventSink>,
}

impl ChurnPredictor {
    pub fn new(config: ChurnConfig, events: Arc<dyn EventStore>, leads: Arc<dyn LeadStore>) -> Self {
        Self {
            config,
            events,
            leads,
            event_sink: leadflow_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for flagging critical leads.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Predict one page of leads using the configured timeout.
    pub async fn predict_batch(&self, brand_id: &str, cursor: Option<&str>) -> LeadflowResult<ChurnBatch> {
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_millis(self.config.batch_timeout_ms);
        self.predict_batch_at(brand_id, cursor, Utc::now(), deadline).await
    }

    pub async fn predict_batch_at(
        &self,
        brand_id: &str,
        cursor: Option<&str>,
        now: DateTime<Utc>,
        deadline: tokio::time::Instant,
    ) -> LeadflowResult<ChurnBatch> {
        let page_size = self.config.effective_page_size();
        debug_assert!(page_size <= MAX_CHURN_PAGE_SIZE);

        let leads = match tokio::time::timeout_at(
            deadline,
            self.leads.list_leads(brand_id, cursor, page_size),
        )
        .await
        {
            Ok(listed) => listed?,
            Err(_) => {
                warn!(brand_id, "Churn batch timed out listing leads");
                return Ok(ChurnBatch {
                    predictions: Vec::new(),
                    total_leads: 0,
                    has_more: true,
                    next_cursor: cursor.map(str::to_string),
                    timed_out: true,
                });
            }
        };
        let total_leads = leads.len();

        let pending: Vec<_> = leads.iter().map(|lead| self.predict_lead(brand_id, lead, now)).collect();
        let stream = futures::stream::iter(pending).buffered(page_size);
        let mut stream = std::pin::pin!(stream);

        let mut predictions = Vec::with_capacity(total_leads);
        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(Some(prediction)) => predictions.push(prediction),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        let (has_more, next_cursor) = if timed_out {
            warn!(
                brand_id,
                completed = predictions.len(),
                read = total_leads,
                "Churn batch timed out, returning partial page"
            );
            let resume = predictions
                .last()
                .map(|p| p.lead_id.clone())
                .or_else(|| cursor.map(str::to_string));
            (true, resume)
        } else if total_leads == page_size {
            (true, leads.last().map(|l| l.lead_id.clone()))
        } else {
            (false, None)
        };

        let mut critical = 0usize;
        for prediction in predictions
            .iter()
            .filter(|p| p.risk_level == RiskLevel::Critical)
        {
            critical += 1;
            self.event_sink.emit(make_event(
                LifecycleEventType::ChurnRiskFlagged,
                brand_id,
                prediction.lead_id.clone(),
                LifecycleDetail::Churn {
                    risk: prediction.churn_risk,
                    level: prediction.risk_level,
                    predicted: prediction.predicted_segment,
                },
            ));
        }
        info!(
            brand_id,
            predictions = predictions.len(),
            critical,
            has_more,
            "Churn batch complete"
        );

        Ok(ChurnBatch {
            predictions,
            total_leads,
            has_more,
            next_cursor,
            timed_out,
        })
    }

    async fn predict_lead(&self, brand_id: &str, lead: &Lead, now: DateTime<Utc>) -> ChurnPrediction {
        let segment = lead.segment();
        match self.observe(brand_id, &lead.lead_id, now).await {
            Ok(Some(activity)) => assess(&self.config, &lead.lead_id, segment, activity),
            Ok(None) => assess_without_activity(&self.config, &lead.lead_id, segment),
            Err(e) => {
                warn!(
                    brand_id,
                    lead_id = %lead.lead_id,
                    error = %e,
                    "Event lookup failed, treating lead as inactive"
                );
                metrics::counter!("churn.degraded_leads").increment(1);
                assess_without_activity(&self.config, &lead.lead_id, segment)
            }
        }
    }

    async fn observe(
        &self,
        brand_id: &str,
        lead_id: &str,
        now: DateTime<Utc>,
    ) -> LeadflowResult<Option<LeadActivity>> {
        let Some(last) = self.events.get_last_event(brand_id, lead_id).await? else {
            return Ok(None);
        };

        let window = Duration::days(self.config.trend_window_days);
        let split = now - window;
        let (recent, older) = tokio::try_join!(
            self.events.count_events_in_window(brand_id, lead_id, split, now),
            self.events
                .count_events_in_window(brand_id, lead_id, split - window, split),
        )?;

        Ok(Some(LeadActivity {
            days_inactive: (now - last.timestamp).num_days().max(0),
            recent_window_events: recent,
            older_window_events: older,
        }))
    }
}
