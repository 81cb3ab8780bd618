//! The energy ledger tree.
//!
//! Every unit, manifestation and aura owns exactly one ledger node, keyed by
//! its [`EntityId`]. A node stores an energy quantity and an optional owner.
//! Ownership chains are flattened on assignment: a node's owner is always a
//! root (a node with no owner of its own), so [`LedgerTree::resolve_owner`]
//! is at most one hop in a consistent tree.
//!
//! The tree never destroys objects itself. Operations that leave an object
//! without a reason to exist report it back ([`OwnerChange::Orphaned`], or the
//! list returned by [`LedgerTree::remove`]) and the owning world disposes of
//! it.
//!
//! # Example
//!
//! ```
//! use aether_core::prelude::*;
//!
//! let mut events = EventBus::new();
//! let mut ledgers = LedgerTree::new();
//! let caster = EntityId::new(0, 0);
//! let orb = EntityId::new(1, 0);
//! ledgers.insert(caster, 1000);
//! ledgers.insert(orb, 0);
//!
//! ledgers.set_owner(orb, Some(caster), false, &mut events);
//! assert_eq!(ledgers.resolve_owner(orb), caster);
//!
//! assert_eq!(ledgers.decrease(caster, 5000, &mut events), 1000);
//! assert_eq!(ledgers.energy(caster), 0);
//! ```

use std::collections::{BTreeSet, HashMap};

use crate::entity::EntityId;
use crate::events::{EnergyEvent, EventBus};

// ---------------------------------------------------------------------------
// LedgerNode
// ---------------------------------------------------------------------------

/// One node of the ledger tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerNode {
    energy: u64,
    owner: Option<EntityId>,
    children: BTreeSet<EntityId>,
}

impl LedgerNode {
    pub fn energy(&self) -> u64 {
        self.energy
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn children(&self) -> &BTreeSet<EntityId> {
        &self.children
    }
}

// ---------------------------------------------------------------------------
// OwnerChange
// ---------------------------------------------------------------------------

/// What [`LedgerTree::set_owner`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerChange {
    /// Nothing changed (same owner, unknown node, or an illegal assignment).
    Unchanged,
    /// The node now belongs to `root`.
    Attached { root: EntityId },
    /// The node lost its owner but its object was asked to stay alive.
    Released,
    /// The node lost its owner and its object should be destroyed.
    Orphaned,
}

// ---------------------------------------------------------------------------
// LedgerTree
// ---------------------------------------------------------------------------

/// Arena of ledger nodes.
#[derive(Debug, Clone, Default)]
pub struct LedgerTree {
    nodes: HashMap<EntityId, LedgerNode>,
}

impl LedgerTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root node holding `energy`. Returns `false` if `id` already
    /// has a ledger.
    pub fn insert(&mut self, id: EntityId, energy: u64) -> bool {
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.nodes.insert(
            id,
            LedgerNode {
                energy,
                ..LedgerNode::default()
            },
        );
        true
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&LedgerNode> {
        self.nodes.get(&id)
    }

    /// Energy held by `id`, or `0` for an unknown node.
    pub fn energy(&self, id: EntityId) -> u64 {
        self.nodes.get(&id).map_or(0, |n| n.energy)
    }

    pub fn owner(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(&id).and_then(|n| n.owner)
    }

    /// Direct children of `id`, in id order.
    pub fn children(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.nodes
            .get(&id)
            .into_iter()
            .flat_map(|n| n.children.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids, sorted.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Add `amount` to `id`. Returns the amount actually added.
    pub fn increase(&mut self, id: EntityId, amount: u64, events: &mut EventBus) -> u64 {
        if amount == 0 {
            return 0;
        }
        let Some(node) = self.nodes.get_mut(&id) else {
            tracing::warn!(ledger = %id, amount, "increase on unknown ledger");
            return 0;
        };
        node.energy = node.energy.saturating_add(amount);
        events.publish(EnergyEvent::EnergyChanged {
            entity: id,
            delta: amount as i64,
        });
        amount
    }

    /// Remove up to `amount` from `id`. Returns `min(amount, energy)`.
    ///
    /// Publishes `EnergyDepleted` when the node reaches exactly zero.
    pub fn decrease(&mut self, id: EntityId, amount: u64, events: &mut EventBus) -> u64 {
        let Some(node) = self.nodes.get_mut(&id) else {
            if amount > 0 {
                tracing::warn!(ledger = %id, amount, "decrease on unknown ledger");
            }
            return 0;
        };
        let taken = amount.min(node.energy);
        if taken == 0 {
            return 0;
        }
        node.energy -= taken;
        let depleted = node.energy == 0;
        events.publish(EnergyEvent::EnergyChanged {
            entity: id,
            delta: -(taken as i64),
        });
        if depleted {
            events.publish(EnergyEvent::EnergyDepleted { entity: id });
        }
        taken
    }

    /// Follow the owner chain of `id` to its root. An unknown or ownerless
    /// node is its own root.
    pub fn resolve_owner(&self, id: EntityId) -> EntityId {
        let mut current = id;
        // Bounded by the node count so a corrupted tree cannot spin forever.
        for _ in 0..=self.nodes.len() {
            match self.owner(current) {
                Some(owner) => current = owner,
                None => return current,
            }
        }
        tracing::warn!(ledger = %id, "owner chain did not terminate");
        current
    }

    /// Whether `ancestor` is on the owner chain of `id` (excluding `id`).
    pub fn is_descendant_of(&self, id: EntityId, ancestor: EntityId) -> bool {
        let mut current = self.owner(id);
        for _ in 0..=self.nodes.len() {
            match current {
                Some(owner) if owner == ancestor => return true,
                Some(owner) => current = self.owner(owner),
                None => return false,
            }
        }
        false
    }

    /// Reassign the owner of `id`.
    ///
    /// `new_owner` is resolved to its root before attaching. If `id` itself
    /// owned children, they migrate to the new root so that no node ends up
    /// as an intermediate owner. Passing `None` detaches; unless
    /// `keep_object` is set the result is [`OwnerChange::Orphaned`].
    pub fn set_owner(
        &mut self,
        id: EntityId,
        new_owner: Option<EntityId>,
        keep_object: bool,
        events: &mut EventBus,
    ) -> OwnerChange {
        let Some(current) = self.nodes.get(&id).map(|n| n.owner) else {
            tracing::warn!(ledger = %id, "set_owner on unknown ledger");
            return OwnerChange::Unchanged;
        };

        let target = new_owner.map(|o| self.resolve_owner(o));
        if let Some(root) = target {
            if !self.nodes.contains_key(&root) {
                tracing::warn!(ledger = %id, owner = %root, "set_owner to unknown ledger");
                return OwnerChange::Unchanged;
            }
            if root == id {
                tracing::warn!(ledger = %id, "set_owner would create an ownership cycle");
                return OwnerChange::Unchanged;
            }
        }
        if current == target {
            return OwnerChange::Unchanged;
        }

        if let Some(old) = current {
            self.detach(old, id, events);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.owner = target;
        }

        match target {
            Some(root) => {
                self.attach(root, id, events);
                events.publish(EnergyEvent::OwnerChanged {
                    entity: id,
                    old: current,
                    new: target,
                });
                let migrating = self
                    .nodes
                    .get_mut(&id)
                    .map(|n| std::mem::take(&mut n.children))
                    .unwrap_or_default();
                for child in migrating {
                    events.publish(EnergyEvent::ChildDetached { parent: id, child });
                    self.reparent(child, Some(id), root, events);
                }
                OwnerChange::Attached { root }
            }
            None => {
                events.publish(EnergyEvent::OwnerChanged {
                    entity: id,
                    old: current,
                    new: None,
                });
                if keep_object {
                    OwnerChange::Released
                } else {
                    OwnerChange::Orphaned
                }
            }
        }
    }

    /// Delete the node for `id`, contracting the tree around it.
    ///
    /// Children move to the removed node's owner. When the removed node was a
    /// root, children lose their owner and are returned: their objects must be
    /// destroyed by the caller.
    pub fn remove(&mut self, id: EntityId, events: &mut EventBus) -> Vec<EntityId> {
        let Some(node) = self.nodes.remove(&id) else {
            return Vec::new();
        };
        if let Some(owner) = node.owner {
            self.detach(owner, id, events);
        }

        let mut orphaned = Vec::new();
        for child in node.children {
            match node.owner {
                Some(owner) => self.reparent(child, Some(id), owner, events),
                None => {
                    if let Some(c) = self.nodes.get_mut(&child) {
                        c.owner = None;
                    }
                    events.publish(EnergyEvent::OwnerChanged {
                        entity: child,
                        old: Some(id),
                        new: None,
                    });
                    orphaned.push(child);
                }
            }
        }
        orphaned
    }

    fn attach(&mut self, parent: EntityId, child: EntityId, events: &mut EventBus) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.insert(child);
            events.publish(EnergyEvent::ChildAttached { parent, child });
        }
    }

    fn detach(&mut self, parent: EntityId, child: EntityId, events: &mut EventBus) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            if p.children.remove(&child) {
                events.publish(EnergyEvent::ChildDetached { parent, child });
            }
        }
    }

    fn reparent(&mut self, child: EntityId, old: Option<EntityId>, root: EntityId, events: &mut EventBus) {
        if let Some(c) = self.nodes.get_mut(&child) {
            c.owner = Some(root);
        }
        self.attach(root, child, events);
        events.publish(EnergyEvent::OwnerChanged {
            entity: child,
            old,
            new: Some(root),
        });
    }

    /// Check the structural invariants. Used by tests and debug assertions.
    ///
    /// - every owner is a root
    /// - `children` of each node equals the set of nodes naming it as owner
    pub fn check_invariants(&self) -> Result<(), String> {
        for (&id, node) in &self.nodes {
            if let Some(owner) = node.owner {
                let Some(owner_node) = self.nodes.get(&owner) else {
                    return Err(format!("{id} points at missing owner {owner}"));
                };
                if owner_node.owner.is_some() {
                    return Err(format!("{id} is owned by non-root {owner}"));
                }
                if !owner_node.children.contains(&id) {
                    return Err(format!("{owner} does not list child {id}"));
                }
            }
            for child in &node.children {
                if self.owner(*child) != Some(id) {
                    return Err(format!("{id} lists {child} which is not its child"));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: u32) -> EntityId {
        EntityId::new(i, 0)
    }

    fn tree(energies: &[u64]) -> LedgerTree {
        let mut t = LedgerTree::new();
        for (i, e) in energies.iter().enumerate() {
            t.insert(id(i as u32), *e);
        }
        t
    }

    #[test]
    fn increase_zero_is_silent() {
        let mut t = tree(&[10]);
        let mut bus = EventBus::recording();
        assert_eq!(t.increase(id(0), 0, &mut bus), 0);
        assert!(bus.take_recorded().is_empty());
    }

    #[test]
    fn decrease_clamps_and_reports_depletion() {
        let mut t = tree(&[30]);
        let mut bus = EventBus::recording();
        assert_eq!(t.decrease(id(0), 50, &mut bus), 30);
        assert_eq!(t.energy(id(0)), 0);
        let events = bus.take_recorded();
        assert_eq!(
            events,
            vec![
                EnergyEvent::EnergyChanged { entity: id(0), delta: -30 },
                EnergyEvent::EnergyDepleted { entity: id(0) },
            ]
        );
    }

    #[test]
    fn decrease_partial_does_not_deplete() {
        let mut t = tree(&[30]);
        let mut bus = EventBus::recording();
        assert_eq!(t.decrease(id(0), 10, &mut bus), 10);
        assert_eq!(t.energy(id(0)), 20);
        assert!(!bus
            .take_recorded()
            .iter()
            .any(|e| matches!(e, EnergyEvent::EnergyDepleted { .. })));
    }

    #[test]
    fn set_owner_resolves_to_root() {
        let mut t = tree(&[0, 0, 0]);
        let mut bus = EventBus::new();
        t.set_owner(id(1), Some(id(0)), false, &mut bus);
        let change = t.set_owner(id(2), Some(id(1)), false, &mut bus);
        assert_eq!(change, OwnerChange::Attached { root: id(0) });
        assert_eq!(t.owner(id(2)), Some(id(0)));
        assert_eq!(t.children(id(0)).collect::<Vec<_>>(), vec![id(1), id(2)]);
        t.check_invariants().unwrap();
    }

    #[test]
    fn set_owner_same_owner_is_noop() {
        let mut t = tree(&[0, 0]);
        let mut bus = EventBus::recording();
        t.set_owner(id(1), Some(id(0)), false, &mut bus);
        bus.take_recorded();
        assert_eq!(t.set_owner(id(1), Some(id(0)), false, &mut bus), OwnerChange::Unchanged);
        assert!(bus.take_recorded().is_empty());
    }

    #[test]
    fn root_with_children_migrates_them_when_owned() {
        let mut t = tree(&[0, 0, 0]);
        let mut bus = EventBus::new();
        // 2 owns 1, then 2 is handed to 0: 1 must end up directly under 0.
        t.set_owner(id(1), Some(id(2)), false, &mut bus);
        t.set_owner(id(2), Some(id(0)), false, &mut bus);
        assert_eq!(t.owner(id(1)), Some(id(0)));
        assert_eq!(t.owner(id(2)), Some(id(0)));
        assert_eq!(t.children(id(2)).count(), 0);
        t.check_invariants().unwrap();
    }

    #[test]
    fn cycle_is_refused() {
        let mut t = tree(&[0, 0]);
        let mut bus = EventBus::new();
        t.set_owner(id(1), Some(id(0)), false, &mut bus);
        assert_eq!(t.set_owner(id(0), Some(id(1)), false, &mut bus), OwnerChange::Unchanged);
        assert_eq!(t.owner(id(0)), None);
        t.check_invariants().unwrap();
    }

    #[test]
    fn clearing_owner_orphans_unless_kept() {
        let mut t = tree(&[0, 0, 0]);
        let mut bus = EventBus::new();
        t.set_owner(id(1), Some(id(0)), false, &mut bus);
        t.set_owner(id(2), Some(id(0)), false, &mut bus);
        assert_eq!(t.set_owner(id(1), None, false, &mut bus), OwnerChange::Orphaned);
        assert_eq!(t.set_owner(id(2), None, true, &mut bus), OwnerChange::Released);
        assert_eq!(t.children(id(0)).count(), 0);
        t.check_invariants().unwrap();
    }

    #[test]
    fn removing_root_orphans_children() {
        let mut t = tree(&[0, 0, 0]);
        let mut bus = EventBus::new();
        t.set_owner(id(1), Some(id(0)), false, &mut bus);
        t.set_owner(id(2), Some(id(0)), false, &mut bus);
        let orphaned = t.remove(id(0), &mut bus);
        assert_eq!(orphaned, vec![id(1), id(2)]);
        assert_eq!(t.owner(id(1)), None);
        t.check_invariants().unwrap();
    }

    #[test]
    fn removing_child_detaches_from_owner() {
        let mut t = tree(&[0, 0]);
        let mut bus = EventBus::recording();
        t.set_owner(id(1), Some(id(0)), false, &mut bus);
        bus.take_recorded();
        assert!(t.remove(id(1), &mut bus).is_empty());
        assert_eq!(t.children(id(0)).count(), 0);
        assert_eq!(
            bus.take_recorded(),
            vec![EnergyEvent::ChildDetached { parent: id(0), child: id(1) }]
        );
    }

    #[test]
    fn descendant_query_follows_chain() {
        let mut t = tree(&[0, 0]);
        let mut bus = EventBus::new();
        t.set_owner(id(1), Some(id(0)), false, &mut bus);
        assert!(t.is_descendant_of(id(1), id(0)));
        assert!(!t.is_descendant_of(id(0), id(1)));
        assert!(!t.is_descendant_of(id(0), id(0)));
    }
}
