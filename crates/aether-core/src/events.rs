//! Change notifications with optional subscribers.
//!
//! Ledgers, manifestations and units announce state changes by publishing an
//! [`EnergyEvent`] on an [`EventBus`]. Nothing in the core depends on a
//! listener existing: publishing to a bus with no subscribers is a no-op.
//! UI health bars, aura triggers and combat logs attach with
//! [`EventBus::subscribe`].
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use aether_core::prelude::*;
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//!
//! let mut bus = EventBus::new();
//! bus.subscribe(move |event| sink.borrow_mut().push(event.clone()));
//!
//! let entity = EntityId::new(0, 0);
//! bus.publish(EnergyEvent::EnergyDepleted { entity });
//! assert_eq!(seen.borrow().len(), 1);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::{Element, Shape};
use crate::entity::{EntityId, ObjectKind};
use crate::status::{AuraKind, StatusEffectKind};

// ---------------------------------------------------------------------------
// EnergyEvent
// ---------------------------------------------------------------------------

/// A named state change on one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnergyEvent {
    /// The entity's ledger changed by `delta` (positive for increases).
    EnergyChanged { entity: EntityId, delta: i64 },
    /// The entity's ledger hit exactly zero.
    EnergyDepleted { entity: EntityId },
    OwnerChanged {
        entity: EntityId,
        old: Option<EntityId>,
        new: Option<EntityId>,
    },
    ChildAttached { parent: EntityId, child: EntityId },
    ChildDetached { parent: EntityId, child: EntityId },
    /// A pending element change was committed at the frame boundary.
    ElementChanged {
        entity: EntityId,
        from: Element,
        to: Element,
    },
    /// A pending shape change was committed at the frame boundary.
    ShapeChanged {
        entity: EntityId,
        from: Shape,
        to: Shape,
    },
    CollisionEnter {
        entity: EntityId,
        other: EntityId,
        kind: ObjectKind,
    },
    CollisionExit {
        entity: EntityId,
        other: EntityId,
        kind: ObjectKind,
    },
    /// Violent destruction, usually from an excessive collision impulse.
    Smashed { entity: EntityId },
    /// Clean destruction.
    Disposed { entity: EntityId },
    AuraApplied {
        aura: EntityId,
        target: EntityId,
        kind: AuraKind,
    },
    AuraExpired {
        aura: EntityId,
        target: EntityId,
        kind: AuraKind,
    },
    StatusApplied {
        unit: EntityId,
        effect: StatusEffectKind,
    },
    /// A unit took `amount` damage after barrier absorption.
    UnitDamaged { unit: EntityId, amount: u64 },
    UnitDefeated { unit: EntityId },
    /// A ritual manifestation was turned into a unit.
    Summoned { unit: EntityId, from: EntityId },
}

impl EnergyEvent {
    /// The entity the event is primarily about.
    pub fn entity(&self) -> EntityId {
        match self {
            EnergyEvent::EnergyChanged { entity, .. }
            | EnergyEvent::EnergyDepleted { entity }
            | EnergyEvent::OwnerChanged { entity, .. }
            | EnergyEvent::ElementChanged { entity, .. }
            | EnergyEvent::ShapeChanged { entity, .. }
            | EnergyEvent::CollisionEnter { entity, .. }
            | EnergyEvent::CollisionExit { entity, .. }
            | EnergyEvent::Smashed { entity }
            | EnergyEvent::Disposed { entity } => *entity,
            EnergyEvent::ChildAttached { parent, .. }
            | EnergyEvent::ChildDetached { parent, .. } => *parent,
            EnergyEvent::AuraApplied { aura, .. } | EnergyEvent::AuraExpired { aura, .. } => *aura,
            EnergyEvent::StatusApplied { unit, .. }
            | EnergyEvent::UnitDamaged { unit, .. }
            | EnergyEvent::UnitDefeated { unit }
            | EnergyEvent::Summoned { unit, .. } => *unit,
        }
    }

    /// Short stable name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            EnergyEvent::EnergyChanged { .. } => "energy_changed",
            EnergyEvent::EnergyDepleted { .. } => "energy_depleted",
            EnergyEvent::OwnerChanged { .. } => "owner_changed",
            EnergyEvent::ChildAttached { .. } => "child_attached",
            EnergyEvent::ChildDetached { .. } => "child_detached",
            EnergyEvent::ElementChanged { .. } => "element_changed",
            EnergyEvent::ShapeChanged { .. } => "shape_changed",
            EnergyEvent::CollisionEnter { .. } => "collision_enter",
            EnergyEvent::CollisionExit { .. } => "collision_exit",
            EnergyEvent::Smashed { .. } => "smashed",
            EnergyEvent::Disposed { .. } => "disposed",
            EnergyEvent::AuraApplied { .. } => "aura_applied",
            EnergyEvent::AuraExpired { .. } => "aura_expired",
            EnergyEvent::StatusApplied { .. } => "status_applied",
            EnergyEvent::UnitDamaged { .. } => "unit_damaged",
            EnergyEvent::UnitDefeated { .. } => "unit_defeated",
            EnergyEvent::Summoned { .. } => "summoned",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

type Subscriber = Box<dyn FnMut(&EnergyEvent)>;

/// Synchronous publish/subscribe dispatch.
///
/// Subscribers run inline, in subscription order, during `publish`. A bus can
/// additionally record every event it sees; tests and combat logs drain the
/// record with [`take_recorded`](Self::take_recorded).
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u32,
    recorded: Option<Vec<EnergyEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that records every published event.
    pub fn recording() -> Self {
        Self {
            recorded: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&EnergyEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn publish(&mut self, event: EnergyEvent) {
        tracing::trace!(event = event.name(), entity = %event.entity(), "publish");
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
        if let Some(recorded) = &mut self.recorded {
            recorded.push(event);
        }
    }

    pub fn set_recording(&mut self, enabled: bool) {
        match (enabled, self.recorded.is_some()) {
            (true, false) => self.recorded = Some(Vec::new()),
            (false, true) => self.recorded = None,
            _ => {}
        }
    }

    /// Drain the recorded events. Empty when recording is off.
    pub fn take_recorded(&mut self) -> Vec<EnergyEvent> {
        self.recorded.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("recording", &self.recorded.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
