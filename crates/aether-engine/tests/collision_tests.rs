//! Contact resolution and upkeep, driven through the full simulation loop.

use std::cell::Cell;
use std::rc::Rc;

use aether_engine::prelude::*;

fn weightless() -> EnergyWorld {
    EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default().weightless())
}

fn at(x: f32) -> Vec3 {
    Vec3::new(x, 0.0, 0.0)
}

fn stay(a: EntityId, b: EntityId, depth: f32) -> ContactEvent {
    ContactEvent {
        phase: ContactPhase::Stay,
        a: a.min(b),
        b: a.max(b),
        sensor: true,
        depth,
        relative_velocity: Vec3::zeros(),
        normal: Vec3::x(),
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Two fire orbs burning the same enemy while one of them also grinds against
/// a hostile water orb.
fn skirmish() -> (EnergyWorld, Vec<ContactEvent>) {
    let mut w = weightless();
    let target = w.spawn_unit(1, Vec3::zeros(), 0, 1_000_000);
    let red = w.spawn_unit(0, at(-20.0), 0, 100);
    let blue = w.spawn_unit(1, at(40.0), 0, 100);
    let a = w.spawn_manifestation(Element::Fire, Shape::Sphere, 5000, at(1.48), Vec3::zeros(), Some(red));
    let d = w.spawn_manifestation(Element::Fire, Shape::Sphere, 5000, at(-1.48), Vec3::zeros(), Some(red));
    let b = w.spawn_manifestation(Element::Water, Shape::Sphere, 5000, at(3.624), Vec3::zeros(), Some(blue));
    w.commit_frame();
    let contacts = vec![stay(a, target, 0.05), stay(d, target, 0.05), stay(a, b, 0.05)];
    (w, contacts)
}

#[test]
fn contact_order_does_not_change_outcome() {
    let dt = 1.0 / 60.0;
    let (mut forward, contacts) = skirmish();
    forward.resolve_contacts(&contacts, dt);

    let (mut reversed, mut contacts) = skirmish();
    contacts.reverse();
    reversed.resolve_contacts(&contacts, dt);

    let digest = WorldDigest::capture(&forward, 1);
    assert_eq!(digest, WorldDigest::capture(&reversed, 1));
    // Something actually happened.
    let (untouched, _) = skirmish();
    assert_ne!(digest, WorldDigest::capture(&untouched, 1));
}

// ---------------------------------------------------------------------------
// Full loop
// ---------------------------------------------------------------------------

#[test]
fn fast_ice_shatters_on_a_wall() {
    let mut w = weightless();
    w.events_mut().set_recording(true);
    w.spawn_static(Vec3::zeros(), [0.5, 5.0, 5.0]);
    let shard = w.spawn_manifestation(Element::Ice, Shape::Cube, 100, at(-2.0), at(15.0), None);

    let mut sim = Simulation::new(w);
    sim.run_steps(30);
    assert!(!sim.world().is_alive(shard));
    let events = sim.world_mut().events_mut().take_recorded();
    assert!(events.contains(&EnergyEvent::Smashed { entity: shard }));
}

#[test]
fn same_owner_orbs_pass_through_each_other() {
    let mut w = weightless();
    let caster = w.spawn_unit(0, at(-10.0), 0, 100);
    let fire = w.spawn_manifestation(Element::Fire, Shape::Sphere, 300, Vec3::zeros(), Vec3::zeros(), Some(caster));
    let water = w.spawn_manifestation(Element::Water, Shape::Sphere, 300, at(0.2), Vec3::zeros(), Some(caster));

    let mut sim = Simulation::new(w);
    sim.run_steps(30);
    assert_eq!(sim.world().energy(fire), 300);
    assert_eq!(sim.world().energy(water), 300);
}

#[test]
fn ownerless_orb_decays_away() {
    let mut w = weightless();
    let orb = w.spawn_manifestation(Element::Air, Shape::Sphere, 20, Vec3::zeros(), Vec3::zeros(), None);
    let mut sim = Simulation::new(w);
    sim.run_steps(60);
    // One decay tick removes max(1, 5%).
    assert_eq!(sim.world().energy(orb), 19);
    sim.run_steps(60 * 30);
    assert!(!sim.world().is_alive(orb));
}

#[test]
fn barrier_aura_runs_out() {
    let mut w = weightless();
    w.events_mut().set_recording(true);
    let caster = w.spawn_unit(0, Vec3::zeros(), 1000, 100);
    let ally = w.spawn_unit(0, at(10.0), 0, 100);
    let controller = EnergyController::new(caster, 50.0, FreeEnergyCost);
    let (_, orb) = controller.manifest_energy(&mut w, 100, Element::Pure, Shape::Sphere, at(10.3), Vec3::zeros());
    let orb = orb.unwrap();
    let (result, aura) = controller.apply_aura(&mut w, orb, ally, AuraKind::Barrier, 12);
    assert_eq!(result, ActionResult::Success);
    let aura = aura.unwrap();

    let mut sim = Simulation::new(w);
    sim.run_steps(300);
    let world = sim.world();
    assert!(!world.is_alive(aura));
    assert_eq!(world.unit(ally).unwrap().barrier(), 12);
    assert_eq!(world.unit(ally).unwrap().aura(AuraKind::Barrier), None);
    // The allied orb never hurt the ally.
    assert_eq!(world.energy(orb), 88);
    let events = sim.world_mut().events_mut().take_recorded();
    assert!(events.contains(&EnergyEvent::AuraExpired {
        aura,
        target: ally,
        kind: AuraKind::Barrier,
    }));
}

// ---------------------------------------------------------------------------
// Spells in the loop
// ---------------------------------------------------------------------------

/// Launches one orb and keeps it focused.
struct Launch {
    orb: Option<FocusHandle>,
    lost: Rc<Cell<u32>>,
}

impl Spell for Launch {
    fn kind(&self) -> SpellKind {
        SpellKind::Continuous
    }

    fn begin(&mut self, ctx: &mut SpellContext<'_>) -> ActionResult {
        let (result, orb) = ctx
            .controller
            .manifest_energy(ctx.world, 100, Element::Air, Shape::Sphere, at(45.0), at(20.0));
        if let Some(orb) = orb {
            self.orb = Some(ctx.focus.focus(orb));
        }
        result
    }

    fn update(&mut self, _ctx: &mut SpellContext<'_>, _stage: usize) -> SpellStep {
        SpellStep::Continue(ActionResult::Success)
    }

    fn on_focus_lost(&mut self, handle: FocusHandle) {
        if Some(handle) == self.orb {
            self.lost.set(self.lost.get() + 1);
        }
    }
}

#[test]
fn focus_is_lost_once_when_orb_flies_off() {
    let mut w = weightless();
    let caster = w.spawn_unit(0, Vec3::zeros(), 1000, 100);
    let lost = Rc::new(Cell::new(0));
    let spell = Launch {
        orb: None,
        lost: Rc::clone(&lost),
    };
    let mut sim = Simulation::new(w);
    let id = sim.add_spell(SpellHost::new(spell, EnergyController::new(caster, 50.0, FreeEnergyCost)));
    {
        let (host, world) = sim.spell_mut(id).unwrap();
        assert_eq!(host.cast(world), ActionResult::Success);
    }

    for _ in 0..120 {
        sim.step();
        sim.late_update();
    }
    assert_eq!(lost.get(), 1);
    let host = sim.spell(id).unwrap();
    assert_eq!(host.state(), SpellState::Active);
    assert!(host.focus().is_empty());
}

#[test]
fn identical_scripts_stay_in_lockstep() {
    fn run() -> Vec<WorldDigest> {
        let mut w = EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default());
        w.spawn_static(Vec3::new(0.0, -1.0, 0.0), [30.0, 0.5, 30.0]);
        let red = w.spawn_unit(0, Vec3::new(-6.0, 0.5, 0.0), 2000, 500);
        let blue = w.spawn_unit(1, Vec3::new(6.0, 0.5, 0.0), 2000, 500);
        let red_hand = EnergyController::with_defaults(&w, red);
        let blue_hand = EnergyController::with_defaults(&w, blue);
        red_hand.manifest_energy(&mut w, 300, Element::Fire, Shape::Sphere, Vec3::new(-4.0, 0.5, 0.0), at(6.0));
        blue_hand.manifest_energy(&mut w, 300, Element::Water, Shape::Sphere, Vec3::new(4.0, 0.5, 0.0), at(-6.0));
        blue_hand.manifest_energy(&mut w, 200, Element::Earth, Shape::Cube, Vec3::new(2.0, 3.0, 0.0), Vec3::zeros());

        let mut sim = Simulation::new(w);
        (0..6)
            .map(|_| {
                sim.run_steps(30);
                sim.digest()
            })
            .collect()
    }
    assert_eq!(run(), run());
}
