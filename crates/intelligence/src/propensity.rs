//! Rule-based propensity scoring: event history in, 0–1 score and segment out.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use leadflow_core::config::PropensityConfig;
use leadflow_core::types::{EventType, Lead, LeadEvent, PropensityResult, SegmentedScore};

/// Maximum number of reasoning factors returned with a score.
const MAX_REASONS: usize = 3;

/// Intermediate tally, exposed for explainability tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub retention_bonus: f64,
    pub recent_events: usize,
    pub recency_bonus: f64,
    pub inactive_days: Option<i64>,
    pub raw: f64,
}

#[derive(Debug, Clone)]
pub struct PropensityEngine {
    config: PropensityConfig,
}

impl PropensityEngine {
    pub fn new(config: PropensityConfig) -> Self {
        Self { config }
    }

    /// Score a lead from its event history. Pure: persisting the result is
    /// the caller's job.
    pub fn calculate(&self, lead: &Lead, events: &[LeadEvent], now: DateTime<Utc>) -> PropensityResult {
        let breakdown = self.breakdown(events, now);
        let propensity = SegmentedScore::new((breakdown.raw / self.config.normalizer).min(1.0));

        debug!(
            brand_id = %lead.brand_id,
            lead_id = %lead.lead_id,
            events = events.len(),
            raw = breakdown.raw,
            score = propensity.score(),
            segment = %propensity.segment(),
            "Propensity calculated"
        );

        PropensityResult {
            propensity,
            reasoning: self.reasoning(&breakdown),
        }
    }

    pub fn breakdown(&self, events: &[LeadEvent], now: DateTime<Utc>) -> ScoreBreakdown {
        let cfg = &self.config;
        let mut breakdown = ScoreBreakdown::default();

        for event in events {
            breakdown.base += cfg.weights.weight(event.event_type);
            if event.event_type == EventType::VslWatch {
                breakdown.retention_bonus += self.retention_bonus(event);
            }
        }

        let recency_cutoff = now - Duration::hours(cfg.recency_window_hours);
        breakdown.recent_events = events
            .iter()
            .filter(|e| e.timestamp >= recency_cutoff)
            .count();
        breakdown.recency_bonus = (breakdown.recent_events as f64 * cfg.recency_bonus_per_event)
            .min(cfg.recency_bonus_cap);

        breakdown.raw = breakdown.base + breakdown.retention_bonus + breakdown.recency_bonus;

        if let Some(last) = events.iter().map(|e| e.timestamp).max() {
            let idle = now - last;
            if idle > Duration::days(cfg.inactivity_days) {
                breakdown.inactive_days = Some(idle.num_days());
                breakdown.raw *= cfg.inactivity_multiplier;
            }
        }

        breakdown
    }

    fn retention_bonus(&self, event: &LeadEvent) -> f64 {
        match event.watch_seconds() {
            Some(secs) if secs > self.config.deep_watch_secs => self.config.deep_watch_bonus,
            Some(secs) if secs > self.config.partial_watch_secs => self.config.partial_watch_bonus,
            _ => 0.0,
        }
    }

    fn reasoning(&self, breakdown: &ScoreBreakdown) -> Vec<String> {
        let mut reasons = Vec::new();
        if breakdown.retention_bonus > 0.0 {
            reasons.push(format!(
                "High VSL retention (+{} points)",
                breakdown.retention_bonus
            ));
        }
        if breakdown.recency_bonus > 0.0 {
            reasons.push(format!(
                "{} interactions in the last {}h (+{} points)",
                breakdown.recent_events, self.config.recency_window_hours, breakdown.recency_bonus
            ));
        }
        if let Some(days) = breakdown.inactive_days {
            reasons.push(format!(
                "Inactive for {days} days (score x{})",
                self.config.inactivity_multiplier
            ));
        }
        reasons.truncate(MAX_REASONS);
        reasons
    }
}

impl Default for PropensityEngine {
    fn default() -> Self {
        Self::new(PropensityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::types::{EventPayload, Segment, HOT_THRESHOLD, WARM_THRESHOLD};

    fn event(event_type: EventType, at: DateTime<Utc>) -> LeadEvent {
        LeadEvent {
            event_type,
            platform: "web".into(),
            timestamp: at,
            payload: None,
        }
    }

    fn vsl(at: DateTime<Utc>, watch_seconds: u32) -> LeadEvent {
        LeadEvent {
            payload: Some(EventPayload {
                watch_seconds: Some(watch_seconds),
                metadata: None,
            }),
            ..event(EventType::VslWatch, at)
        }
    }

    fn lead() -> Lead {
        Lead::new("brand-1", "lead-1", Utc::now())
    }

    #[test]
    fn test_no_events_scores_zero() {
        let result = PropensityEngine::default().calculate(&lead(), &[], Utc::now());
        assert_eq!(result.score(), 0.0);
        assert_eq!(result.segment(), Segment::Cold);
        assert!(result.reasoning.is_empty());
    }

    #[test]
    fn test_weights_and_recency_bonus() {
        let now = Utc::now();
        let two_days_ago = now - Duration::days(2);
        let events = vec![
            event(EventType::PageView, two_days_ago),
            event(EventType::LeadCapture, two_days_ago),
            event(EventType::CheckoutInit, now - Duration::hours(1)),
            event(EventType::Custom, now - Duration::hours(2)),
        ];
        let engine = PropensityEngine::default();
        let breakdown = engine.breakdown(&events, now);
        assert_eq!(breakdown.base, 28.0);
        assert_eq!(breakdown.recent_events, 2);
        assert_eq!(breakdown.recency_bonus, 4.0);

        let result = engine.calculate(&lead(), &events, now);
        assert!((result.score() - 0.32).abs() < 1e-9);
        assert_eq!(result.segment(), Segment::Warm);
        assert_eq!(result.reasoning.len(), 1);
    }

    #[test]
    fn test_recency_bonus_is_capped() {
        let now = Utc::now();
        let events: Vec<_> = (0..15)
            .map(|i| event(EventType::PageView, now - Duration::minutes(i)))
            .collect();
        let breakdown = PropensityEngine::default().breakdown(&events, now);
        assert_eq!(breakdown.recency_bonus, 20.0);
    }

    #[test]
    fn test_vsl_retention_tiers() {
        let now = Utc::now();
        let engine = PropensityEngine::default();
        let deep = engine.breakdown(&[vsl(now, 601)], now);
        let partial = engine.breakdown(&[vsl(now, 301)], now);
        let short = engine.breakdown(&[vsl(now, 300)], now);
        assert_eq!(deep.retention_bonus, 15.0);
        assert_eq!(partial.retention_bonus, 5.0);
        assert_eq!(short.retention_bonus, 0.0);
    }

    #[test]
    fn test_inactivity_halves_score() {
        let now = Utc::now();
        let stale = now - Duration::days(10);
        let events = vec![
            event(EventType::CheckoutInit, stale),
            event(EventType::CheckoutInit, stale),
            vsl(stale, 700),
        ];
        let result = PropensityEngine::default().calculate(&lead(), &events, now);
        // (20 + 20 + 10 + 15) * 0.5 = 32.5
        assert!((result.score() - 0.325).abs() < 1e-9);
        assert_eq!(result.reasoning.len(), 2);
        assert!(result.reasoning[0].starts_with("High VSL retention"));
        assert!(result.reasoning[1].starts_with("Inactive for 10 days"));
    }

    #[test]
    fn test_reasoning_order_and_limit() {
        let now = Utc::now();
        let events = vec![vsl(now - Duration::hours(1), 900)];
        let result = PropensityEngine::default().calculate(&lead(), &events, now);
        assert_eq!(result.reasoning.len(), 2);
        assert!(result.reasoning[0].starts_with("High VSL retention"));
        assert!(result.reasoning[1].contains("interactions in the last 24h"));
    }

    #[test]
    fn test_score_bounded_and_segment_consistent() {
        let now = Utc::now();
        let engine = PropensityEngine::default();
        let mut events = Vec::new();
        for i in 0..40 {
            let kind = match i % 4 {
                0 => EventType::CheckoutInit,
                1 => EventType::VslWatch,
                2 => EventType::AdClick,
                _ => EventType::PageView,
            };
            events.push(event(kind, now - Duration::hours(i * 7)));
            let result = engine.calculate(&lead(), &events, now);
            let score = result.score();
            assert!((0.0..=1.0).contains(&score));
            let expected = if score >= HOT_THRESHOLD {
                Segment::Hot
            } else if score >= WARM_THRESHOLD {
                Segment::Warm
            } else {
                Segment::Cold
            };
            assert_eq!(result.segment(), expected);
        }
        assert_eq!(engine.calculate(&lead(), &events, now).score(), 1.0);
    }
}
