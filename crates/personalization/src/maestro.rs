//! Maestro — incremental lead-state updates driven by interactions.
//!
//! The state transition itself ([`plan_interaction`]) is a pure function of
//! the current lead and the interaction. [`Maestro::process`] applies it
//! against the stores; [`MaestroHandle::dispatch`] hands interactions to a
//! background task so producers never wait on persistence.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use leadflow_core::config::{EventWeights, MaestroConfig};
use leadflow_core::error::LeadflowResult;
use leadflow_core::event_bus::{make_event, EventSink, LifecycleDetail, LifecycleEventType};
use leadflow_core::stores::LeadStore;
use leadflow_core::types::{
    AwarenessLevel, Interaction, LastInteraction, Lead, LeadPatch, PropensityResult, Segment,
};
use leadflow_intelligence::LeadScorer;

use crate::awareness::AwarenessStateMachine;

/// What one interaction does to a lead, before any store access.
#[derive(Debug, Clone)]
pub struct InteractionPlan {
    pub patch: LeadPatch,
    pub created: bool,
    pub awareness_from: AwarenessLevel,
    pub awareness_to: AwarenessLevel,
    pub refresh_propensity: bool,
}

/// Pure state transition: `(current lead, interaction) -> plan`.
pub fn plan_interaction(
    machine: &AwarenessStateMachine,
    weights: &EventWeights,
    refresh_min_weight: f64,
    current: Option<&Lead>,
    interaction: &Interaction,
) -> InteractionPlan {
    let awareness_from = current.map(|l| l.awareness_level).unwrap_or_default();
    let awareness_to = machine.advance(awareness_from, interaction.event_type);
    let created = current.is_none();

    let mut patch = LeadPatch::new(Utc::now());
    patch.event_count_delta = 1;
    patch.add_tags = interaction.tags.clone();
    patch.last_interaction = Some(LastInteraction {
        event_type: interaction.event_type,
        platform: interaction.platform.clone(),
        timestamp: interaction.timestamp,
        content_ref: interaction.content_ref.clone(),
    });
    if awareness_to > awareness_from {
        patch.awareness_level = Some(awareness_to);
    }

    let refresh_propensity = created
        || awareness_to > awareness_from
        || weights.weight(interaction.event_type) >= refresh_min_weight;

    InteractionPlan {
        patch,
        created,
        awareness_from,
        awareness_to,
        refresh_propensity,
    }
}

/// Result of processing a single interaction.
#[derive(Debug, Clone)]
pub struct InteractionOutcome {
    pub created: bool,
    pub awareness_level: AwarenessLevel,
    pub refreshed: Option<PropensityResult>,
}

pub struct Maestro {
    config: MaestroConfig,
    weights: EventWeights,
    machine: AwarenessStateMachine,
    scorer: LeadScorer,
    leads: Arc<dyn LeadStore>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Maestro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Maestro")
            .field("config", &self.config)
            .field("rules", &self.machine.rules.len())
            .finish()
    }
}

impl Maestro {
    pub fn new(
        config: MaestroConfig,
        weights: EventWeights,
        scorer: LeadScorer,
        leads: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            config,
            weights,
            machine: AwarenessStateMachine::new(),
            scorer,
            leads,
            event_sink: leadflow_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for lifecycle notifications.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Apply one interaction to its lead.
    ///
    /// Expects the interaction's event to already be in the event store so
    /// that a propensity refresh sees it. A failed refresh still records the
    /// interaction; the score catches up on the next significant one.
    pub async fn process(&self, interaction: &Interaction) -> LeadflowResult<InteractionOutcome> {
        let brand_id = interaction.brand_id.as_str();
        let lead_id = interaction.lead_id.as_str();

        let current = self.leads.get_lead(brand_id, lead_id).await?;
        let plan = plan_interaction(
            &self.machine,
            &self.weights,
            self.config.refresh_min_weight,
            current.as_ref(),
            interaction,
        );
        let mut patch = plan.patch.clone();

        let mut refreshed = None;
        if plan.refresh_propensity {
            let mut projected = current
                .clone()
                .unwrap_or_else(|| Lead::new(brand_id, lead_id, interaction.timestamp));
            projected.apply(patch.clone());
            match self.scorer.score(&projected, Utc::now()).await {
                Ok(result) => {
                    patch.propensity = Some(result.propensity);
                    refreshed = Some(result);
                }
                Err(e) => {
                    warn!(brand_id, lead_id, error = %e, "Propensity refresh failed");
                }
            }
        }

        self.leads.upsert_lead(brand_id, lead_id, patch).await?;
        metrics::counter!("maestro.processed").increment(1);

        self.emit_changes(interaction, current.as_ref(), &plan, refreshed.as_ref());
        debug!(
            brand_id,
            lead_id,
            event_type = interaction.event_type.as_str(),
            awareness = ?plan.awareness_to,
            refreshed = refreshed.is_some(),
            "Interaction applied"
        );

        Ok(InteractionOutcome {
            created: plan.created,
            awareness_level: plan.awareness_to,
            refreshed,
        })
    }

    fn emit_changes(
        &self,
        interaction: &Interaction,
        previous: Option<&Lead>,
        plan: &InteractionPlan,
        refreshed: Option<&PropensityResult>,
    ) {
        let brand_id = &interaction.brand_id;
        let lead_id = &interaction.lead_id;

        if plan.created {
            self.event_sink.emit(make_event(
                LifecycleEventType::LeadCreated,
                brand_id.clone(),
                lead_id.clone(),
                LifecycleDetail::None,
            ));
        }
        if plan.awareness_to > plan.awareness_from {
            self.event_sink.emit(make_event(
                LifecycleEventType::AwarenessAdvanced,
                brand_id.clone(),
                lead_id.clone(),
                LifecycleDetail::Awareness {
                    from: plan.awareness_from,
                    to: plan.awareness_to,
                },
            ));
        }
        if let Some(result) = refreshed {
            let from = previous.map_or(Segment::Cold, |l| l.segment());
            if from != result.segment() {
                self.event_sink.emit(make_event(
                    LifecycleEventType::SegmentChanged,
                    brand_id.clone(),
                    lead_id.clone(),
                    LifecycleDetail::Segment {
                        from,
                        to: result.segment(),
                        score: result.score(),
                    },
                ));
            }
        }
    }

    /// Start the background worker and return the producer-side handle.
    ///
    /// The worker stops once every handle has been dropped and the queue is
    /// drained.
    pub fn spawn(self: Arc<Self>) -> (MaestroHandle, JoinHandle<()>) {
        let (handle, mut receiver) = MaestroHandle::channel(self.config.queue_capacity);
        let worker = tokio::spawn(async move {
            info!("Maestro worker started");
            while let Some(interaction) = receiver.recv().await {
                if let Err(e) = self.process(&interaction).await {
                    error!(
                        brand_id = %interaction.brand_id,
                        lead_id = %interaction.lead_id,
                        error = %e,
                        "Failed to apply interaction"
                    );
                    metrics::counter!("maestro.failed").increment(1);
                }
            }
            info!("Maestro worker stopped");
        });
        (handle, worker)
    }
}

/// Producer-side handle. Cloning is cheap; dispatch never waits.
#[derive(Debug, Clone)]
pub struct MaestroHandle {
    sender: mpsc::Sender<Interaction>,
}

impl MaestroHandle {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Interaction>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// `true` once the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Queue an interaction. Returns `false` if it was dropped.
    pub fn dispatch(&self, interaction: Interaction) -> bool {
        match self.sender.try_send(interaction) {
            Ok(()) => {
                metrics::counter!("maestro.queued").increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("maestro.dropped").increment(1);
                warn!("Interaction dropped: {}", e);
                false
            }
        }
    }
}
