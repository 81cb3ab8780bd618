//! Aether Core -- data model of the energy manipulation engine.
//!
//! This crate holds everything about magic energy that does not need a
//! physics engine:
//!
//! - [`ledger`]: the ownership tree of energy holders.
//! - [`element`]: element and shape definitions, threaded explicitly through
//!   the engine as an [`EnergyRegistry`](element::EnergyRegistry).
//! - [`cost`]: pluggable pricing of manipulations.
//! - [`events`]: publish/subscribe change notifications.
//! - [`formula`]: closed-form game physics (relativistic mass, deformation,
//!   contact energy).
//! - [`result`]: the closed set of manipulation outcomes.
//!
//! # Quick Start
//!
//! ```
//! use aether_core::prelude::*;
//!
//! let mut events = EventBus::new();
//! let mut ledgers = LedgerTree::new();
//! let wizard = EntityId::new(0, 0);
//! ledgers.insert(wizard, 1000);
//!
//! let registry = EnergyRegistry::default();
//! let cost = DefaultEnergyCost::default();
//! let total = 100 + cost.manifest_energy(100, Element::Fire, Shape::Sphere);
//! assert!(total <= ledgers.energy(wizard));
//! ledgers.decrease(wizard, total, &mut events);
//! assert_eq!(ledgers.energy(wizard), 900);
//! assert!(registry.element(Element::Fire).pass_through);
//! ```

#![deny(unsafe_code)]

pub mod cost;
pub mod element;
pub mod entity;
pub mod events;
pub mod formula;
pub mod ledger;
pub mod result;
pub mod status;

/// Raw charge per user-facing unit of energy.
pub const ENERGY_SCALE: u64 = 100;

/// Absolute zero, in the game's temperature units.
pub const MIN_TEMPERATURE: i32 = -273;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while building core tables or resolving handles.
///
/// Gameplay failures are never errors; see [`result::ActionResult`].
#[derive(Debug, thiserror::Error)]
pub enum EnergyError {
    /// The handle does not name a live object.
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    #[error("registry has no definition for element {element:?}")]
    MissingElement { element: element::Element },

    #[error("registry has no definition for shape {shape:?}")]
    MissingShape { shape: element::Shape },

    #[error("invalid value {value} for '{name}'")]
    InvalidConstant { name: &'static str, value: f64 },

    #[error("failed to parse energy table: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::cost::{
        AuraCost, CostPolicy, DefaultAuraCost, DefaultEnergyCost, ForceMode, FreeEnergyCost,
    };
    pub use crate::element::{
        ColliderKind, Element, ElementDefinition, EnergyRegistry, Shape, ShapeDefinition,
    };
    pub use crate::entity::{EntityAllocator, EntityId, ObjectKind};
    pub use crate::events::{EnergyEvent, EventBus, SubscriptionId};
    pub use crate::ledger::{LedgerNode, LedgerTree, OwnerChange};
    pub use crate::result::{try_, try_strict, ActionResult};
    pub use crate::status::{AuraKind, StatusEffectKind};
    pub use crate::{EnergyError, ENERGY_SCALE, MIN_TEMPERATURE};
}
