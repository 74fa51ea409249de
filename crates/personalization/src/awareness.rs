use serde::{Deserialize, Serialize};

use leadflow_core::types::{AwarenessLevel, EventType};

/// An interaction type that lifts a lead to at least `floor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwarenessRule {
    pub trigger: EventType,
    pub floor: AwarenessLevel,
}

/// Guards awareness progression: levels only ever advance, and only on
/// qualifying interaction types.
#[derive(Debug, Clone)]
pub struct AwarenessStateMachine {
    pub rules: Vec<AwarenessRule>,
}

impl AwarenessStateMachine {
    /// Creates a state machine with the standard funnel rules.
    pub fn new() -> Self {
        let rules = vec![
            // Engagement signals ->
            AwarenessRule {
                trigger: EventType::PageView,
                floor: AwarenessLevel::ProblemAware,
            },
            AwarenessRule {
                trigger: EventType::AdClick,
                floor: AwarenessLevel::ProblemAware,
            },
            AwarenessRule {
                trigger: EventType::CommentMade,
                floor: AwarenessLevel::ProblemAware,
            },
            // Conversation / opt-in ->
            AwarenessRule {
                trigger: EventType::LeadCapture,
                floor: AwarenessLevel::SolutionAware,
            },
            AwarenessRule {
                trigger: EventType::DmReceived,
                floor: AwarenessLevel::SolutionAware,
            },
            // Offer exposure ->
            AwarenessRule {
                trigger: EventType::VslWatch,
                floor: AwarenessLevel::ProductAware,
            },
            AwarenessRule {
                trigger: EventType::CheckoutInit,
                floor: AwarenessLevel::MostAware,
            },
        ];

        Self { rules }
    }

    /// Returns `true` if moving `from` -> `to` is allowed (never a regression).
    pub fn can_transition(&self, from: &AwarenessLevel, to: &AwarenessLevel) -> bool {
        to >= from
    }

    /// The level a lead reaches after `trigger`, starting from `current`.
    pub fn advance(&self, current: AwarenessLevel, trigger: EventType) -> AwarenessLevel {
        self.rules
            .iter()
            .filter(|r| r.trigger == trigger)
            .map(|r| r.floor)
            .filter(|floor| self.can_transition(&current, floor))
            .max()
            .unwrap_or(current)
    }
}

impl Default for AwarenessStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advances_through_funnel() {
        let machine = AwarenessStateMachine::new();
        let mut level = AwarenessLevel::Unaware;
        for (trigger, expected) in [
            (EventType::AdClick, AwarenessLevel::ProblemAware),
            (EventType::LeadCapture, AwarenessLevel::SolutionAware),
            (EventType::VslWatch, AwarenessLevel::ProductAware),
            (EventType::CheckoutInit, AwarenessLevel::MostAware),
        ] {
            level = machine.advance(level, trigger);
            assert_eq!(level, expected);
        }
    }

    #[test]
    fn test_never_regresses() {
        let machine = AwarenessStateMachine::new();
        let level = machine.advance(AwarenessLevel::ProductAware, EventType::PageView);
        assert_eq!(level, AwarenessLevel::ProductAware);
        assert!(!machine.can_transition(&AwarenessLevel::MostAware, &AwarenessLevel::Unaware));
    }

    #[test]
    fn test_custom_events_do_not_move_awareness() {
        let machine = AwarenessStateMachine::new();
        assert_eq!(
            machine.advance(AwarenessLevel::Unaware, EventType::Custom),
            AwarenessLevel::Unaware
        );
    }

    #[test]
    fn test_skips_stages_on_strong_signal() {
        let machine = AwarenessStateMachine::new();
        assert_eq!(
            machine.advance(AwarenessLevel::Unaware, EventType::CheckoutInit),
            AwarenessLevel::MostAware
        );
    }
}
