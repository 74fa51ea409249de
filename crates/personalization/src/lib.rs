//! Personalization — awareness progression driven by lead interactions, and
//! content-rule resolution against a lead's current segment.

pub mod awareness;
pub mod maestro;
pub mod resolver;

pub use awareness::AwarenessStateMachine;
pub use maestro::{Maestro, MaestroHandle};
pub use resolver::{PersonalizationResolver, Resolution, ResolvedSegment};
