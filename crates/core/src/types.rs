use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Minimum propensity score for the `hot` segment.
pub const HOT_THRESHOLD: f64 = 0.7;
/// Minimum propensity score for the `warm` segment.
pub const WARM_THRESHOLD: f64 = 0.3;

// ─── Segments & Scores ──────────────────────────────────────────────────

/// Three-tier lead classification. Ordered `Cold < Warm < Hot`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Cold,
    Warm,
    Hot,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Hot, Segment::Warm, Segment::Cold];

    pub fn from_score(score: f64) -> Self {
        if score >= HOT_THRESHOLD {
            Segment::Hot
        } else if score >= WARM_THRESHOLD {
            Segment::Warm
        } else {
            Segment::Cold
        }
    }

    /// One tier down. Cold stays cold.
    pub fn downgrade(self) -> Self {
        match self {
            Segment::Hot => Segment::Warm,
            Segment::Warm | Segment::Cold => Segment::Cold,
        }
    }

    /// The tier directly below, if any.
    pub fn lower(self) -> Option<Self> {
        match self {
            Segment::Hot => Some(Segment::Warm),
            Segment::Warm => Some(Segment::Cold),
            Segment::Cold => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Hot => "hot",
            Segment::Warm => "warm",
            Segment::Cold => "cold",
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A propensity score paired with the segment it implies.
///
/// The segment is never stored independently: it is derived on construction
/// and recomputed on deserialization, so a persisted record cannot carry a
/// segment that disagrees with its score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "StoredScore")]
pub struct SegmentedScore {
    score: f64,
    segment: Segment,
}

#[derive(Deserialize)]
struct StoredScore {
    score: f64,
}

impl From<StoredScore> for SegmentedScore {
    fn from(stored: StoredScore) -> Self {
        SegmentedScore::new(stored.score)
    }
}

impl SegmentedScore {
    /// Clamps `score` into `[0, 1]` and derives the segment. NaN maps to 0.
    pub fn new(score: f64) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self {
            score,
            segment: Segment::from_score(score),
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }
}

impl Default for SegmentedScore {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Output of the propensity engine, also frozen into audience scans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropensityResult {
    #[serde(flatten)]
    pub propensity: SegmentedScore,
    pub reasoning: Vec<String>,
}

impl PropensityResult {
    pub fn score(&self) -> f64 {
        self.propensity.score()
    }

    pub fn segment(&self) -> Segment {
        self.propensity.segment()
    }
}

// ─── Awareness ──────────────────────────────────────────────────────────

/// Five-stage funnel position. Ordered from least to most aware.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum AwarenessLevel {
    #[default]
    Unaware,
    ProblemAware,
    SolutionAware,
    ProductAware,
    MostAware,
}

// ─── Events ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    LeadCapture,
    VslWatch,
    CheckoutInit,
    Custom,
    DmReceived,
    CommentMade,
    AdClick,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::LeadCapture => "lead_capture",
            EventType::VslWatch => "vsl_watch",
            EventType::CheckoutInit => "checkout_init",
            EventType::Custom => "custom",
            EventType::DmReceived => "dm_received",
            EventType::CommentMade => "comment_made",
            EventType::AdClick => "ad_click",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// VSL watch duration in seconds.
    #[serde(default)]
    pub watch_seconds: Option<u32>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Immutable entry in a lead's interaction log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeadEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Option<EventPayload>,
}

impl LeadEvent {
    pub fn watch_seconds(&self) -> Option<u32> {
        self.payload.as_ref().and_then(|p| p.watch_seconds)
    }
}

// ─── Leads ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastInteraction {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub content_ref: Option<String>,
}

/// One lead of one brand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub brand_id: String,
    pub lead_id: String,
    #[serde(default)]
    pub propensity: SegmentedScore,
    #[serde(default)]
    pub awareness_level: AwarenessLevel,
    #[serde(default)]
    pub event_count: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub last_interaction: Option<LastInteraction>,
    pub first_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(brand_id: impl Into<String>, lead_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            brand_id: brand_id.into(),
            lead_id: lead_id.into(),
            propensity: SegmentedScore::default(),
            awareness_level: AwarenessLevel::default(),
            event_count: 0,
            tags: BTreeSet::new(),
            last_interaction: None,
            first_seen_at: now,
            last_interaction_at: None,
            updated_at: now,
        }
    }

    pub fn segment(&self) -> Segment {
        self.propensity.segment()
    }

    pub fn propensity_score(&self) -> f64 {
        self.propensity.score()
    }

    /// Merge a partial update into this lead.
    ///
    /// Score and segment are replaced together (last writer wins). Awareness
    /// only advances. The last interaction is kept if it is newer than the
    /// patch's.
    pub fn apply(&mut self, patch: LeadPatch) {
        if let Some(propensity) = patch.propensity {
            self.propensity = propensity;
        }
        if let Some(level) = patch.awareness_level {
            self.awareness_level = self.awareness_level.max(level);
        }
        self.event_count = self.event_count.saturating_add(patch.event_count_delta);
        self.tags.extend(patch.add_tags);
        if let Some(interaction) = patch.last_interaction {
            let newer = self
                .last_interaction_at
                .map_or(true, |at| interaction.timestamp >= at);
            if newer {
                self.last_interaction_at = Some(interaction.timestamp);
                self.last_interaction = Some(interaction);
            }
        }
        self.updated_at = patch.updated_at;
    }
}

/// Partial lead update handed to `LeadStore::upsert_lead`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    #[serde(default)]
    pub propensity: Option<SegmentedScore>,
    #[serde(default)]
    pub awareness_level: Option<AwarenessLevel>,
    #[serde(default)]
    pub event_count_delta: u64,
    #[serde(default)]
    pub add_tags: BTreeSet<String>,
    #[serde(default)]
    pub last_interaction: Option<LastInteraction>,
    pub updated_at: DateTime<Utc>,
}

impl LeadPatch {
    pub fn new(updated_at: DateTime<Utc>) -> Self {
        Self {
            propensity: None,
            awareness_level: None,
            event_count_delta: 0,
            add_tags: BTreeSet::new(),
            last_interaction: None,
            updated_at,
        }
    }

    pub fn with_propensity(mut self, propensity: SegmentedScore) -> Self {
        self.propensity = Some(propensity);
        self
    }
}

/// An observed lead interaction, as handed to the Maestro.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub brand_id: String,
    pub lead_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Option<EventPayload>,
    #[serde(default)]
    pub content_ref: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Interaction {
    pub fn to_event(&self) -> LeadEvent {
        LeadEvent {
            event_type: self.event_type,
            platform: self.platform.clone(),
            timestamp: self.timestamp,
            payload: self.payload.clone(),
        }
    }
}

// ─── Audience Scans & Content Rules ─────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    #[serde(default)]
    pub demographics: BTreeMap<String, String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub desires: Vec<String>,
    #[serde(default)]
    pub objections: Vec<String>,
    /// Market sophistication, 1 (naive) to 5 (jaded).
    pub sophistication_level: u8,
}

/// Frozen persona + propensity snapshot referenced by content rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudienceScan {
    pub id: String,
    pub brand_id: String,
    pub persona: Persona,
    pub propensity: PropensityResult,
    pub created_at: DateTime<Utc>,
}

impl AudienceScan {
    pub fn segment(&self) -> Segment {
        self.propensity.segment()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentVariation {
    pub id: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub offer_ref: Option<String>,
    #[serde(default)]
    pub cta: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DynamicContentRule {
    pub id: String,
    pub brand_id: String,
    pub name: String,
    /// Identifier of the `AudienceScan` this rule targets.
    pub target_persona_id: String,
    pub variations: Vec<ContentVariation>,
    pub is_active: bool,
}

// ─── Churn ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityTrend {
    Growing,
    Steady,
    Declining,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChurnPrediction {
    pub lead_id: String,
    pub churn_risk: f64,
    pub risk_level: RiskLevel,
    pub current_segment: Segment,
    pub predicted_segment: Segment,
    /// `None` when the lead has no observed events.
    pub days_inactive: Option<i64>,
    pub trend: Option<ActivityTrend>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnBatch {
    pub predictions: Vec<ChurnPrediction>,
    pub total_leads: usize,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub timed_out: bool,
}

// ─── LTV ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectedLtv {
    pub m3: f64,
    pub m6: f64,
    pub m12: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LtvCohort {
    pub segment: Segment,
    pub lead_count: u64,
    pub total_revenue: f64,
    pub avg_revenue_per_lead: f64,
    #[serde(rename = "projectedLTV")]
    pub projected_ltv: ProjectedLtv,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtvEstimate {
    pub brand_id: String,
    /// Always hot, warm, cold in that order.
    pub cohorts: Vec<LtvCohort>,
    /// `false` when a collaborator failed mid-run.
    pub complete: bool,
    pub computed_at: DateTime<Utc>,
}

impl LtvEstimate {
    pub fn cohort(&self, segment: Segment) -> Option<&LtvCohort> {
        self.cohorts.iter().find(|c| c.segment == segment)
    }
}
