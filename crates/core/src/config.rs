use serde::Deserialize;

use crate::error::{LeadflowError, LeadflowResult};
use crate::types::{EventType, Segment};

/// Hard cap on leads read per churn batch invocation.
pub const MAX_CHURN_PAGE_SIZE: usize = 500;

/// Upper bound for any day-denominated window or threshold.
pub const MAX_WINDOW_DAYS: i64 = 3_650;

/// Upper bound for the propensity recency window.
pub const MAX_RECENCY_WINDOW_HOURS: i64 = 24 * 365;

/// Root application configuration. Loaded from environment variables
/// with the prefix `LEADFLOW__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub propensity: PropensityConfig,
    #[serde(default)]
    pub churn: ChurnConfig,
    #[serde(default)]
    pub ltv: LtvConfig,
    #[serde(default)]
    pub maestro: MaestroConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            propensity: PropensityConfig::default(),
            churn: ChurnConfig::default(),
            ltv: LtvConfig::default(),
            maestro: MaestroConfig::default(),
        }
    }
}

// ─── Propensity Config ──────────────────────────────────────────────────

/// Per-event-type raw score contributions.
#[derive(Debug, Clone, Deserialize)]
pub struct EventWeights {
    #[serde(default = "default_weight_page_view")]
    pub page_view: f64,
    #[serde(default = "default_weight_lead_capture")]
    pub lead_capture: f64,
    #[serde(default = "default_weight_vsl_watch")]
    pub vsl_watch: f64,
    #[serde(default = "default_weight_checkout_init")]
    pub checkout_init: f64,
    #[serde(default = "default_weight_custom")]
    pub custom: f64,
    #[serde(default = "default_weight_dm_received")]
    pub dm_received: f64,
    #[serde(default = "default_weight_comment_made")]
    pub comment_made: f64,
    #[serde(default = "default_weight_ad_click")]
    pub ad_click: f64,
}

fn default_weight_page_view() -> f64 { 1.0 }
fn default_weight_lead_capture() -> f64 { 5.0 }
fn default_weight_vsl_watch() -> f64 { 10.0 }
fn default_weight_checkout_init() -> f64 { 20.0 }
fn default_weight_custom() -> f64 { 2.0 }
fn default_weight_dm_received() -> f64 { 3.0 }
fn default_weight_comment_made() -> f64 { 2.0 }
fn default_weight_ad_click() -> f64 { 2.0 }

impl EventWeights {
    pub fn weight(&self, event_type: EventType) -> f64 {
        match event_type {
            EventType::PageView => self.page_view,
            EventType::LeadCapture => self.lead_capture,
            EventType::VslWatch => self.vsl_watch,
            EventType::CheckoutInit => self.checkout_init,
            EventType::Custom => self.custom,
            EventType::DmReceived => self.dm_received,
            EventType::CommentMade => self.comment_made,
            EventType::AdClick => self.ad_click,
        }
    }
}

impl Default for EventWeights {
    fn default() -> Self {
        Self {
            page_view: default_weight_page_view(),
            lead_capture: default_weight_lead_capture(),
            vsl_watch: default_weight_vsl_watch(),
            checkout_init: default_weight_checkout_init(),
            custom: default_weight_custom(),
            dm_received: default_weight_dm_received(),
            comment_made: default_weight_comment_made(),
            ad_click: default_weight_ad_click(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropensityConfig {
    #[serde(default)]
    pub weights: EventWeights,
    #[serde(default = "default_deep_watch_secs")]
    pub deep_watch_secs: u32,
    #[serde(default = "default_deep_watch_bonus")]
    pub deep_watch_bonus: f64,
    #[serde(default = "default_partial_watch_secs")]
    pub partial_watch_secs: u32,
    #[serde(default = "default_partial_watch_bonus")]
    pub partial_watch_bonus: f64,
    #[serde(default = "default_recency_window_hours")]
    pub recency_window_hours: i64,
    #[serde(default = "default_recency_bonus_per_event")]
    pub recency_bonus_per_event: f64,
    #[serde(default = "default_recency_bonus_cap")]
    pub recency_bonus_cap: f64,
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: i64,
    #[serde(default = "default_inactivity_multiplier")]
    pub inactivity_multiplier: f64,
    #[serde(default = "default_normalizer")]
    pub normalizer: f64,
}

fn default_deep_watch_secs() -> u32 { 600 }
fn default_deep_watch_bonus() -> f64 { 15.0 }
fn default_partial_watch_secs() -> u32 { 300 }
fn default_partial_watch_bonus() -> f64 { 5.0 }
fn default_recency_window_hours() -> i64 { 24 }
fn default_recency_bonus_per_event() -> f64 { 2.0 }
fn default_recency_bonus_cap() -> f64 { 20.0 }
fn default_inactivity_days() -> i64 { 7 }
fn default_inactivity_multiplier() -> f64 { 0.5 }
fn default_normalizer() -> f64 { 100.0 }

impl PropensityConfig {
    pub fn validate(&self) -> LeadflowResult<()> {
        if !(1..=MAX_RECENCY_WINDOW_HOURS).contains(&self.recency_window_hours) {
            return Err(LeadflowError::Config(format!(
                "propensity.recency_window_hours must be within 1..={MAX_RECENCY_WINDOW_HOURS}"
            )));
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.inactivity_days) {
            return Err(LeadflowError::Config(format!(
                "propensity.inactivity_days must be within 0..={MAX_WINDOW_DAYS}"
            )));
        }
        if self.normalizer.is_nan() || self.normalizer <= 0.0 {
            return Err(LeadflowError::Config(
                "propensity.normalizer must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PropensityConfig {
    fn default() -> Self {
        Self {
            weights: EventWeights::default(),
            deep_watch_secs: default_deep_watch_secs(),
            deep_watch_bonus: default_deep_watch_bonus(),
            partial_watch_secs: default_partial_watch_secs(),
            partial_watch_bonus: default_partial_watch_bonus(),
            recency_window_hours: default_recency_window_hours(),
            recency_bonus_per_event: default_recency_bonus_per_event(),
            recency_bonus_cap: default_recency_bonus_cap(),
            inactivity_days: default_inactivity_days(),
            inactivity_multiplier: default_inactivity_multiplier(),
            normalizer: default_normalizer(),
        }
    }
}

// ─── Churn Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChurnConfig {
    #[serde(default = "default_churn_page_size")]
    pub page_size: usize,
    #[serde(default = "default_warning_inactivity_days")]
    pub warning_inactivity_days: i64,
    #[serde(default = "default_critical_inactivity_days")]
    pub critical_inactivity_days: i64,
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: i64,
    #[serde(default = "default_no_event_risk")]
    pub no_event_risk: f64,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_churn_page_size() -> usize { MAX_CHURN_PAGE_SIZE }
fn default_warning_inactivity_days() -> i64 { 7 }
fn default_critical_inactivity_days() -> i64 { 14 }
fn default_trend_window_days() -> i64 { 14 }
fn default_no_event_risk() -> f64 { 0.8 }
fn default_batch_timeout_ms() -> u64 { 10_000 }

impl ChurnConfig {
    /// Page size clamped to `1..=MAX_CHURN_PAGE_SIZE`.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_CHURN_PAGE_SIZE)
    }

    pub fn validate(&self) -> LeadflowResult<()> {
        let days = [
            ("warning_inactivity_days", self.warning_inactivity_days),
            ("critical_inactivity_days", self.critical_inactivity_days),
        ];
        for (name, value) in days {
            if !(0..=MAX_WINDOW_DAYS).contains(&value) {
                return Err(LeadflowError::Config(format!(
                    "churn.{name} must be within 0..={MAX_WINDOW_DAYS}"
                )));
            }
        }
        if self.critical_inactivity_days < self.warning_inactivity_days {
            return Err(LeadflowError::Config(
                "churn.critical_inactivity_days must not be below warning_inactivity_days".into(),
            ));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.trend_window_days) {
            return Err(LeadflowError::Config(format!(
                "churn.trend_window_days must be within 1..={MAX_WINDOW_DAYS}"
            )));
        }
        if !(0.0..=1.0).contains(&self.no_event_risk) {
            return Err(LeadflowError::Config(
                "churn.no_event_risk must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            page_size: default_churn_page_size(),
            warning_inactivity_days: default_warning_inactivity_days(),
            critical_inactivity_days: default_critical_inactivity_days(),
            trend_window_days: default_trend_window_days(),
            no_event_risk: default_no_event_risk(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

// ─── LTV Config ─────────────────────────────────────────────────────────

/// Revenue multipliers at the 3/6/12-month horizons.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct HorizonMultipliers {
    pub m3: f64,
    pub m6: f64,
    pub m12: f64,
}

impl HorizonMultipliers {
    fn increasing(&self) -> bool {
        0.0 < self.m3 && self.m3 < self.m6 && self.m6 < self.m12
    }

    fn dominates(&self, other: &HorizonMultipliers) -> bool {
        self.m3 > other.m3 && self.m6 > other.m6 && self.m12 > other.m12
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LtvConfig {
    #[serde(default = "default_hot_curve")]
    pub hot: HorizonMultipliers,
    #[serde(default = "default_warm_curve")]
    pub warm: HorizonMultipliers,
    #[serde(default = "default_cold_curve")]
    pub cold: HorizonMultipliers,
    #[serde(default = "default_full_confidence_sample")]
    pub full_confidence_sample: u64,
    #[serde(default = "default_ltv_page_size")]
    pub page_size: usize,
    #[serde(default = "default_ltv_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_hot_curve() -> HorizonMultipliers {
    HorizonMultipliers { m3: 3.0, m6: 5.5, m12: 10.0 }
}
fn default_warm_curve() -> HorizonMultipliers {
    HorizonMultipliers { m3: 2.0, m6: 3.5, m12: 6.0 }
}
fn default_cold_curve() -> HorizonMultipliers {
    HorizonMultipliers { m3: 1.0, m6: 1.8, m12: 3.0 }
}
fn default_full_confidence_sample() -> u64 { 100 }
fn default_ltv_page_size() -> usize { MAX_CHURN_PAGE_SIZE }
fn default_ltv_batch_timeout_ms() -> u64 { 10_000 }

impl LtvConfig {
    pub fn curve(&self, segment: Segment) -> HorizonMultipliers {
        match segment {
            Segment::Hot => self.hot,
            Segment::Warm => self.warm,
            Segment::Cold => self.cold,
        }
    }

    /// Rejects curves that would break horizon or segment ordering.
    pub fn validate(&self) -> LeadflowResult<()> {
        for segment in Segment::ALL {
            if !self.curve(segment).increasing() {
                return Err(LeadflowError::Config(format!(
                    "ltv.{segment} multipliers must be positive and increase m3 < m6 < m12"
                )));
            }
        }
        if !(self.hot.dominates(&self.warm) && self.warm.dominates(&self.cold)) {
            return Err(LeadflowError::Config(
                "ltv multipliers must be ordered hot > warm > cold at every horizon".into(),
            ));
        }
        if self.full_confidence_sample == 0 {
            return Err(LeadflowError::Config(
                "ltv.full_confidence_sample must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LtvConfig {
    fn default() -> Self {
        Self {
            hot: default_hot_curve(),
            warm: default_warm_curve(),
            cold: default_cold_curve(),
            full_confidence_sample: default_full_confidence_sample(),
            page_size: default_ltv_page_size(),
            batch_timeout_ms: default_ltv_batch_timeout_ms(),
        }
    }
}

// ─── Maestro Config ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MaestroConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Interactions weighing at least this much trigger a propensity refresh.
    #[serde(default = "default_refresh_min_weight")]
    pub refresh_min_weight: f64,
}

fn default_queue_capacity() -> usize { 10_000 }
fn default_refresh_min_weight() -> f64 { 5.0 }

impl Default for MaestroConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            refresh_min_weight: default_refresh_min_weight(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> LeadflowResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LEADFLOW")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LeadflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LeadflowResult<()> {
        self.ltv.validate()?;
        self.churn.validate()?;
        self.propensity.validate()
    }
}
