//! Lead lifecycle event bus — trait for emitting state-change notifications
//! from any engine.
//!
//! Engines accept an `Arc<dyn EventSink>`; the binary routes events to the
//! structured log, tests capture them in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{AwarenessLevel, RiskLevel, Segment};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    LeadCreated,
    AwarenessAdvanced,
    SegmentChanged,
    ChurnRiskFlagged,
}

/// What changed, when it is worth carrying.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LifecycleDetail {
    None,
    Awareness { from: AwarenessLevel, to: AwarenessLevel },
    Segment { from: Segment, to: Segment, score: f64 },
    Churn { risk: f64, level: RiskLevel, predicted: Segment },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_id: Uuid,
    pub event_type: LifecycleEventType,
    pub brand_id: String,
    pub lead_id: String,
    pub detail: LifecycleDetail,
    pub timestamp: DateTime<Utc>,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// No-op sink for tests and engines that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

/// Writes every event to the structured log.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LifecycleEvent) {
        tracing::info!(
            event_type = ?event.event_type,
            brand_id = %event.brand_id,
            lead_id = %event.lead_id,
            detail = ?event.detail,
            "Lead lifecycle event"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: LifecycleEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for creating `LifecycleEvent` with minimal boilerplate.
pub fn make_event(
    event_type: LifecycleEventType,
    brand_id: impl Into<String>,
    lead_id: impl Into<String>,
    detail: LifecycleDetail,
) -> LifecycleEvent {
    LifecycleEvent {
        event_id: Uuid::new_v4(),
        event_type,
        brand_id: brand_id.into(),
        lead_id: lead_id.into(),
        detail,
        timestamp: Utc::now(),
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(
            LifecycleEventType::LeadCreated,
            "brand-1",
            "lead-1",
            LifecycleDetail::None,
        ));
        sink.emit(make_event(
            LifecycleEventType::SegmentChanged,
            "brand-1",
            "lead-1",
            LifecycleDetail::Segment {
                from: Segment::Cold,
                to: Segment::Warm,
                score: 0.35,
            },
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(LifecycleEventType::SegmentChanged), 1);
        assert_eq!(sink.events()[0].lead_id, "lead-1");
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        sink.emit(make_event(
            LifecycleEventType::LeadCreated,
            "brand-1",
            "lead-1",
            LifecycleDetail::None,
        ));
    }
}
