//! Aether Engine -- physically simulated magic energy.
//!
//! This crate builds on [`aether_core`] to put energy into a physics world:
//! manifestations become rapier bodies, contacts move energy between them,
//! and every manipulation a caster performs goes through the cost-gated
//! [`EnergyController`](gateway::EnergyController).
//!
//! # Quick Start
//!
//! ```
//! use aether_engine::prelude::*;
//!
//! let mut world = EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default());
//! let wizard = world.spawn_unit(0, Vec3::zeros(), 1000, 100);
//! let controller = EnergyController::with_defaults(&world, wizard);
//!
//! let (result, orb) = controller.manifest_energy(
//!     &mut world,
//!     100,
//!     Element::Fire,
//!     Shape::Sphere,
//!     Vec3::new(10.0, 0.0, 0.0),
//!     Vec3::zeros(),
//! );
//! assert_eq!(result, ActionResult::Success);
//! assert_eq!(world.energy(wizard), 900);
//! assert_eq!(world.energy(orb.unwrap()), 100);
//!
//! let mut sim = Simulation::new(world);
//! sim.run_steps(60);
//! assert_eq!(sim.tick_count(), 60);
//! ```

#![deny(unsafe_code)]

pub mod aura;
pub mod collision;
pub mod config;
pub mod gateway;
pub mod manifestation;
pub mod manipulation;
pub mod physics;
pub mod snapshot;
pub mod spell;
pub mod tick;
pub mod unit;
pub mod world;

/// Re-export the core crate for convenience.
pub use aether_core;

use aether_core::entity::EntityId;
use aether_core::EnergyError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while setting up or querying the engine.
///
/// Gameplay failures are [`ActionResult`](aether_core::result::ActionResult)
/// values, never errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] EnergyError),

    /// The entity is alive but has no physics body.
    #[error("entity {entity} has no physics body")]
    MissingBody { entity: EntityId },

    /// A controller was requested for something that cannot cast.
    #[error("entity {entity} cannot cast (dead or without an energy ledger)")]
    UnknownCaster { entity: EntityId },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use aether_core::prelude::*;

    pub use crate::aura::{Aura, AuraTick};
    pub use crate::config::{EngineConfig, MergeMomentum};
    pub use crate::gateway::{EnergyController, ProbeHit, ProbeResult};
    pub use crate::manifestation::{FrameProperties, Manifestation, PendingState};
    pub use crate::physics::{BodyType, ColliderShape, ConnectionId, ContactEvent, ContactPhase, PhysicsWorld, Vec3};
    pub use crate::snapshot::WorldDigest;
    pub use crate::spell::{
        FocusHandle, FocusTable, Release, Spell, SpellContext, SpellHost, SpellKind, SpellState, SpellStep,
    };
    pub use crate::tick::{IntervalTimer, Simulation, SpellId, StepDiagnostics};
    pub use crate::unit::{DamageOutcome, StatusEffect, Unit};
    pub use crate::world::{BodyInfo, Destruction, EnergyWorld};
    pub use crate::EngineError;
}
