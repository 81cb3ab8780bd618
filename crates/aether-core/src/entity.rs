//! Object handles and allocation.
//!
//! Every simulated object (caster, manifestation, aura, prop) is named by an
//! [`EntityId`]: a 64-bit handle packing a *generation* counter in the high 32
//! bits and a slot *index* in the low 32 bits. Ledgers are keyed by the id of
//! the object they belong to, so a ledger reference can never outlive its
//! object undetected: once the slot is released the generation moves on and
//! every outstanding handle goes stale.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational object handle.
///
/// Layout: `[generation: u32 | index: u32]`. Ordering follows the raw value,
/// which gives collision processing and digests a stable iteration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct a handle from a slot index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// ObjectKind
// ---------------------------------------------------------------------------

/// What kind of object an [`EntityId`] names.
///
/// Collision resolution dispatches on this classification of the partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A living unit: a caster, a creature, a summoned minion.
    Unit,
    /// A manifested body of energy.
    Manifestation,
    /// A movable physical prop with positive mass.
    Solid,
    /// Immovable world geometry.
    Static,
    /// A ledger-backed effect attached to a unit. Has no physical body.
    Aura,
}

impl ObjectKind {
    /// Whether objects of this kind carry an energy ledger.
    pub fn has_ledger(self) -> bool {
        matches!(self, ObjectKind::Unit | ObjectKind::Manifestation | ObjectKind::Aura)
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Hands out [`EntityId`]s and recycles released slots.
///
/// Released indices go to the back of a FIFO queue so a single hot slot does
/// not burn through its generations.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_indices: VecDeque<u32>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh handle, reusing a released slot when one is queued.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free_indices.pop_front() {
            // Generation was already bumped on release.
            self.alive[index as usize] = true;
            EntityId::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.alive.push(true);
            EntityId::new(index, 0)
        }
    }

    /// Release a handle. Returns `false` if it was already stale.
    pub fn release(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let idx = id.index() as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_indices.push_back(id.index());
        true
    }

    /// Whether `id` names a live object of the current generation.
    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index() as usize;
        idx < self.generations.len()
            && self.alive[idx]
            && self.generations[idx] == id.generation()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_slot_bumps_generation() {
        let mut alloc = EntityAllocator::new();
        let first = alloc.allocate();
        assert!(alloc.release(first));
        let second = alloc.allocate();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(!alloc.is_alive(first), "old handle must be stale");
        assert!(alloc.is_alive(second));
    }

    #[test]
    fn double_release_is_rejected() {
        let mut alloc = EntityAllocator::new();
        let id = alloc.allocate();
        assert!(alloc.release(id));
        assert!(!alloc.release(id));
        assert_eq!(alloc.alive_count(), 0);
    }

    #[test]
    fn ids_order_by_raw_value() {
        let a = EntityId::new(1, 0);
        let b = EntityId::new(2, 0);
        let c = EntityId::new(0, 1);
        let mut ids = vec![c, b, a];
        ids.sort();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn ledger_bearing_kinds() {
        assert!(ObjectKind::Unit.has_ledger());
        assert!(ObjectKind::Manifestation.has_ledger());
        assert!(ObjectKind::Aura.has_ledger());
        assert!(!ObjectKind::Solid.has_ledger());
        assert!(!ObjectKind::Static.has_ledger());
    }

    #[test]
    fn display_shows_index_and_generation() {
        assert_eq!(EntityId::new(7, 3).to_string(), "7v3");
        assert_eq!(EntityId::from_raw(EntityId::new(7, 3).to_raw()), EntityId::new(7, 3));
    }
}
