//! The interface spells use to drive the gateway.
//!
//! A spell never holds entity ids of its own: it focuses manifestations in a
//! [`FocusTable`] and refers to them by [`FocusHandle`]. The table drops
//! entries that die or leave the caster's control range, reporting each loss
//! once. A [`SpellHost`] owns one spell with its controller and focus table,
//! runs it through its lifecycle and releases everything it focused when the
//! spell ends, however it ends.

use aether_core::entity::EntityId;
use aether_core::result::ActionResult;

use crate::gateway::EnergyController;
use crate::world::EnergyWorld;

// ---------------------------------------------------------------------------
// Focus
// ---------------------------------------------------------------------------

/// Index into a [`FocusTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FocusHandle(u32);

impl FocusHandle {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// What happens to focused manifestations when a spell lets go of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Release {
    #[default]
    Dispose,
    /// Clear the owner but keep the object; it then decays on its own.
    Disown,
}

/// Manifestations tracked by one spell.
///
/// Handles are never reused within a table, so a stale handle stays stale.
#[derive(Debug, Clone, Default)]
pub struct FocusTable {
    entries: Vec<Option<EntityId>>,
}

impl FocusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&mut self, entity: EntityId) -> FocusHandle {
        let handle = FocusHandle(self.entries.len() as u32);
        self.entries.push(Some(entity));
        handle
    }

    /// The focused entity, `None` once the focus was lost or released.
    pub fn get(&self, handle: FocusHandle) -> Option<EntityId> {
        self.entries.get(handle.0 as usize).copied().flatten()
    }

    /// Stop tracking `handle` without touching the object.
    pub fn unfocus(&mut self, handle: FocusHandle) -> Option<EntityId> {
        self.entries.get_mut(handle.0 as usize).and_then(Option::take)
    }

    /// Handles still in focus.
    pub fn handles(&self) -> impl Iterator<Item = FocusHandle> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(index, _)| FocusHandle(index as u32))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries that died or left `controller`'s range and return their
    /// handles. A lost handle is only ever returned once.
    pub fn refresh(&mut self, world: &EnergyWorld, controller: &EnergyController) -> Vec<FocusHandle> {
        let mut lost = Vec::new();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            let Some(entity) = *entry else {
                continue;
            };
            let held = world.is_alive(entity)
                && world
                    .position(entity)
                    .is_some_and(|p| controller.is_within_range(world, p));
            if !held {
                *entry = None;
                lost.push(FocusHandle(index as u32));
            }
        }
        lost
    }

    /// Release every focused object and empty the table.
    pub fn release_all(&mut self, world: &mut EnergyWorld, release: Release) {
        for entity in self.entries.drain(..).flatten() {
            if !world.is_alive(entity) {
                continue;
            }
            match release {
                Release::Dispose => world.dispose(entity),
                Release::Disown => {
                    world.set_owner(entity, None, true);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Spell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellKind {
    /// Does all its work when cast.
    Instant,
    /// Runs every step until it finishes or is cancelled.
    Continuous,
    /// Runs while switched on.
    Toggle,
    /// Runs through a fixed number of stages.
    Staged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellState {
    Ready,
    Active,
    Finished,
    Cancelled,
}

impl SpellState {
    pub fn is_terminated(self) -> bool {
        matches!(self, SpellState::Finished | SpellState::Cancelled)
    }
}

/// What a spell reports after one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellStep {
    /// Keep running. A result that is not a tolerant success cancels the
    /// spell.
    Continue(ActionResult),
    /// Move to the next stage.
    NextStage,
    Finish,
}

/// Everything a spell may touch during one call.
pub struct SpellContext<'a> {
    pub world: &'a mut EnergyWorld,
    pub controller: &'a EnergyController,
    pub focus: &'a mut FocusTable,
    pub dt: f32,
}

impl SpellContext<'_> {
    /// Resolve a focus handle.
    pub fn focused(&self, handle: FocusHandle) -> Option<EntityId> {
        self.focus.get(handle)
    }
}

/// Gameplay logic of one spell.
pub trait Spell {
    fn kind(&self) -> SpellKind;

    /// Number of stages of a [`SpellKind::Staged`] spell.
    fn stages(&self) -> usize {
        1
    }

    /// How focused manifestations are let go when the spell ends.
    fn release(&self) -> Release {
        Release::Dispose
    }

    /// Called once when cast. A result that is not a tolerant success
    /// cancels the spell.
    fn begin(&mut self, ctx: &mut SpellContext<'_>) -> ActionResult;

    /// Called every fixed step while active. `stage` counts from zero.
    fn update(&mut self, _ctx: &mut SpellContext<'_>, _stage: usize) -> SpellStep {
        SpellStep::Finish
    }

    fn on_focus_lost(&mut self, _handle: FocusHandle) {}
}

/// Runs one spell for one caster.
pub struct SpellHost {
    spell: Box<dyn Spell>,
    controller: EnergyController,
    focus: FocusTable,
    state: SpellState,
    stage: usize,
}

impl SpellHost {
    pub fn new(spell: impl Spell + 'static, controller: EnergyController) -> Self {
        Self {
            spell: Box::new(spell),
            controller,
            focus: FocusTable::new(),
            state: SpellState::Ready,
            stage: 0,
        }
    }

    pub fn state(&self) -> SpellState {
        self.state
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn kind(&self) -> SpellKind {
        self.spell.kind()
    }

    pub fn controller(&self) -> &EnergyController {
        &self.controller
    }

    pub fn focus(&self) -> &FocusTable {
        &self.focus
    }

    /// Start the spell. Casting a spell that is already active is redundant.
    pub fn cast(&mut self, world: &mut EnergyWorld) -> ActionResult {
        if self.state == SpellState::Active {
            return ActionResult::RedundantAction;
        }
        self.state = SpellState::Active;
        self.stage = 0;
        let result = {
            let mut ctx = SpellContext {
                world: &mut *world,
                controller: &self.controller,
                focus: &mut self.focus,
                dt: 0.0,
            };
            self.spell.begin(&mut ctx)
        };
        if !result.try_tolerant() {
            tracing::debug!(caster = %self.controller.caster(), result = %result, "spell failed to start");
            self.terminate(world, SpellState::Cancelled);
        } else if self.spell.kind() == SpellKind::Instant {
            self.terminate(world, SpellState::Finished);
        }
        result
    }

    /// Advance an active spell by one fixed step.
    pub fn update(&mut self, world: &mut EnergyWorld, dt: f32) {
        if self.state != SpellState::Active {
            return;
        }
        let step = {
            let mut ctx = SpellContext {
                world: &mut *world,
                controller: &self.controller,
                focus: &mut self.focus,
                dt,
            };
            self.spell.update(&mut ctx, self.stage)
        };
        match step {
            SpellStep::Continue(result) if !result.try_tolerant() => {
                tracing::debug!(caster = %self.controller.caster(), result = %result, "spell cancelled");
                self.terminate(world, SpellState::Cancelled);
            }
            SpellStep::Continue(_) => {}
            SpellStep::NextStage => {
                self.stage += 1;
                if self.stage >= self.spell.stages() {
                    self.terminate(world, SpellState::Finished);
                }
            }
            SpellStep::Finish => self.terminate(world, SpellState::Finished),
        }
    }

    /// Once-per-frame phase: drop lost focus and tell the spell.
    pub fn late_update(&mut self, world: &EnergyWorld) {
        if self.state != SpellState::Active {
            return;
        }
        for handle in self.focus.refresh(world, &self.controller) {
            self.spell.on_focus_lost(handle);
        }
    }

    /// Switch a toggle spell on or off.
    pub fn toggle(&mut self, world: &mut EnergyWorld) -> ActionResult {
        if self.spell.kind() != SpellKind::Toggle {
            return ActionResult::ForbiddenAction;
        }
        if self.state == SpellState::Active {
            self.terminate(world, SpellState::Finished);
            ActionResult::Success
        } else {
            self.cast(world)
        }
    }

    pub fn cancel(&mut self, world: &mut EnergyWorld) {
        if self.state == SpellState::Active {
            self.terminate(world, SpellState::Cancelled);
        }
    }

    fn terminate(&mut self, world: &mut EnergyWorld, state: SpellState) {
        self.focus.release_all(world, self.spell.release());
        self.state = state;
    }
}

impl std::fmt::Debug for SpellHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpellHost")
            .field("kind", &self.spell.kind())
            .field("state", &self.state)
            .field("stage", &self.stage)
            .field("focus", &self.focus.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::physics::Vec3;
    use aether_core::cost::{ForceMode, FreeEnergyCost};
    use aether_core::element::{Element, EnergyRegistry, Shape};

    struct Bolt {
        kind: SpellKind,
        release: Release,
        amount: u64,
        target: Vec3,
        orb: Option<FocusHandle>,
        steps: usize,
    }

    impl Bolt {
        fn new(kind: SpellKind) -> Self {
            Self {
                kind,
                release: Release::Dispose,
                amount: 100,
                target: Vec3::new(5.0, 0.0, 0.0),
                orb: None,
                steps: 0,
            }
        }
    }

    impl Spell for Bolt {
        fn kind(&self) -> SpellKind {
            self.kind
        }

        fn stages(&self) -> usize {
            2
        }

        fn release(&self) -> Release {
            self.release
        }

        fn begin(&mut self, ctx: &mut SpellContext<'_>) -> ActionResult {
            let (result, orb) =
                ctx.controller
                    .manifest_energy(ctx.world, self.amount, Element::Fire, Shape::Sphere, self.target, Vec3::zeros());
            if let Some(orb) = orb {
                self.orb = Some(ctx.focus.focus(orb));
            }
            result
        }

        fn update(&mut self, ctx: &mut SpellContext<'_>, _stage: usize) -> SpellStep {
            self.steps += 1;
            let Some(orb) = self.orb.and_then(|h| ctx.focused(h)) else {
                return SpellStep::Continue(ActionResult::InvalidManifestation);
            };
            match self.kind {
                SpellKind::Staged => SpellStep::NextStage,
                _ => SpellStep::Continue(ctx.controller.apply_force(
                    ctx.world,
                    orb,
                    Vec3::new(1.0, 0.0, 0.0),
                    ForceMode::Impulse,
                )),
            }
        }
    }

    fn setup(energy: u64) -> (EnergyWorld, EnergyController) {
        let mut world = EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default().weightless());
        let caster = world.spawn_unit(0, Vec3::zeros(), energy, 100);
        (world, EnergyController::new(caster, 50.0, FreeEnergyCost))
    }

    #[test]
    fn focus_loss_is_reported_once() {
        let (mut w, c) = setup(1000);
        let (_, orb) = c.manifest_energy(&mut w, 100, Element::Fire, Shape::Sphere, Vec3::new(5.0, 0.0, 0.0), Vec3::zeros());
        let mut table = FocusTable::new();
        let handle = table.focus(orb.unwrap());
        assert!(table.refresh(&w, &c).is_empty());

        w.dispose(orb.unwrap());
        assert_eq!(table.refresh(&w, &c), vec![handle]);
        assert!(table.refresh(&w, &c).is_empty());
        assert_eq!(table.get(handle), None);
    }

    #[test]
    fn leaving_range_loses_focus() {
        let (mut w, c) = setup(1000);
        let (_, orb) = c.manifest_energy(&mut w, 100, Element::Earth, Shape::Cube, Vec3::new(5.0, 0.0, 0.0), Vec3::zeros());
        let orb = orb.unwrap();
        let mut table = FocusTable::new();
        let handle = table.focus(orb);
        w.physics.teleport(orb, Vec3::new(80.0, 0.0, 0.0));
        assert_eq!(table.refresh(&w, &c), vec![handle]);
        assert!(w.is_alive(orb));
    }

    #[test]
    fn instant_spell_disowns_on_finish() {
        let (mut w, c) = setup(1000);
        let mut bolt = Bolt::new(SpellKind::Instant);
        bolt.release = Release::Disown;
        let mut host = SpellHost::new(bolt, c);
        assert_eq!(host.cast(&mut w), ActionResult::Success);
        assert_eq!(host.state(), SpellState::Finished);
        assert!(host.focus().is_empty());

        let orb = w.manifestation_ids()[0];
        assert_eq!(w.resolve_owner(orb), orb);
        assert_eq!(w.energy(orb), 100);
    }

    #[test]
    fn failed_begin_cancels() {
        let (mut w, c) = setup(50);
        let mut host = SpellHost::new(Bolt::new(SpellKind::Continuous), c);
        assert_eq!(host.cast(&mut w), ActionResult::NotEnoughEnergy);
        assert_eq!(host.state(), SpellState::Cancelled);
        assert!(w.manifestation_ids().is_empty());
    }

    #[test]
    fn strict_failure_in_update_cancels_and_disposes() {
        let (mut w, c) = setup(100);
        let mut host = SpellHost::new(Bolt::new(SpellKind::Continuous), c);
        assert_eq!(host.cast(&mut w), ActionResult::Success);
        // All energy went into the orb: the force surcharge is free, so it succeeds.
        host.update(&mut w, 1.0 / 60.0);
        assert_eq!(host.state(), SpellState::Active);

        let orb = w.manifestation_ids()[0];
        w.physics.teleport(orb, Vec3::new(80.0, 0.0, 0.0));
        host.update(&mut w, 1.0 / 60.0);
        assert_eq!(host.state(), SpellState::Cancelled);
        assert!(!w.is_alive(orb));
    }

    #[test]
    fn staged_spell_finishes_after_last_stage() {
        let (mut w, c) = setup(1000);
        let mut host = SpellHost::new(Bolt::new(SpellKind::Staged), c);
        host.cast(&mut w);
        host.update(&mut w, 1.0 / 60.0);
        assert_eq!(host.stage(), 1);
        assert_eq!(host.state(), SpellState::Active);
        host.update(&mut w, 1.0 / 60.0);
        assert_eq!(host.state(), SpellState::Finished);
        assert!(w.manifestation_ids().is_empty());
    }

    #[test]
    fn toggle_switches_on_and_off() {
        let (mut w, c) = setup(1000);
        let mut host = SpellHost::new(Bolt::new(SpellKind::Toggle), c);
        assert_eq!(host.toggle(&mut w), ActionResult::Success);
        assert_eq!(host.state(), SpellState::Active);
        assert_eq!(host.cast(&mut w), ActionResult::RedundantAction);
        assert_eq!(host.toggle(&mut w), ActionResult::Success);
        assert_eq!(host.state(), SpellState::Finished);
        assert!(w.manifestation_ids().is_empty());
        assert_eq!(w.energy(host.controller().caster()), 900);
    }

    #[test]
    fn cancel_releases_focus() {
        let (mut w, c) = setup(1000);
        let mut host = SpellHost::new(Bolt::new(SpellKind::Continuous), c);
        host.cast(&mut w);
        assert_eq!(host.focus().len(), 1);
        host.cancel(&mut w);
        assert_eq!(host.state(), SpellState::Cancelled);
        assert!(host.focus().is_empty());
        assert!(w.manifestation_ids().is_empty());
    }
}
