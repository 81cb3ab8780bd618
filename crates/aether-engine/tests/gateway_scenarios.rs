//! Gateway scenarios: one caster, one controller, one world.

use aether_engine::prelude::*;

fn world() -> EnergyWorld {
    EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default().weightless())
}

fn at(x: f32) -> Vec3 {
    Vec3::new(x, 0.0, 0.0)
}

/// A caster at the origin holding `energy`, with a 50 m range and stock pricing.
fn caster(world: &mut EnergyWorld, energy: u64) -> EnergyController {
    let id = world.spawn_unit(0, Vec3::zeros(), energy, 100);
    EnergyController::new(id, 50.0, DefaultEnergyCost::default())
}

fn manifest(world: &mut EnergyWorld, c: &EnergyController, amount: u64, element: Element, position: Vec3) -> EntityId {
    let (result, id) = c.manifest_energy(world, amount, element, Shape::Sphere, position, Vec3::zeros());
    assert_eq!(result, ActionResult::Success);
    id.expect("manifested")
}

fn balances(world: &EnergyWorld) -> Vec<(EntityId, u64)> {
    world
        .ledgers()
        .ids()
        .into_iter()
        .map(|id| (id, world.energy(id)))
        .collect()
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[test]
fn manifest_and_charge() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let (result, orb) = c.manifest_energy(&mut w, 100, Element::Fire, Shape::Sphere, at(10.0), Vec3::zeros());
    assert_eq!(result, ActionResult::Success);
    let orb = orb.unwrap();
    assert_eq!(c.energy(&w), 900);
    assert_eq!(w.energy(orb), 100);
    assert_eq!(w.resolve_owner(orb), c.caster());
}

#[test]
fn out_of_range() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let (result, orb) = c.manifest_energy(&mut w, 100, Element::Fire, Shape::Sphere, at(60.0), Vec3::zeros());
    assert_eq!(result, ActionResult::OutsideRange);
    assert!(orb.is_none());
    assert_eq!(c.energy(&w), 1000);
    assert!(w.manifestation_ids().is_empty());
}

#[test]
fn insufficient_funds() {
    let mut w = world();
    let c = caster(&mut w, 50);
    let (result, orb) = c.manifest_energy(&mut w, 100, Element::Fire, Shape::Sphere, at(10.0), Vec3::zeros());
    assert_eq!(result, ActionResult::NotEnoughEnergy);
    assert!(orb.is_none());
    assert_eq!(c.energy(&w), 50);
}

#[test]
fn charge_moves_face_value() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let orb = manifest(&mut w, &c, 100, Element::Water, at(10.0));
    assert_eq!(c.charge(&mut w, orb, 250), ActionResult::Success);
    assert_eq!(w.energy(orb), 350);
    assert_eq!(c.energy(&w), 650);
    assert_eq!(c.charge(&mut w, orb, 651), ActionResult::NotEnoughEnergy);
    assert_eq!(w.energy(orb), 350);
}

#[test]
fn merge() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let a = manifest(&mut w, &c, 30, Element::Fire, at(10.0));
    let b = manifest(&mut w, &c, 20, Element::Fire, at(10.1));
    assert_eq!(c.merge(&mut w, a, b), ActionResult::Success);
    assert_eq!(w.energy(a), 50);
    assert!(!w.is_alive(b));
    assert_eq!(c.energy(&w), 950);
}

#[test]
fn merge_requires_contact_and_element() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let a = manifest(&mut w, &c, 30, Element::Fire, at(10.0));
    let far = manifest(&mut w, &c, 20, Element::Fire, at(20.0));
    let water = manifest(&mut w, &c, 20, Element::Water, at(10.1));
    let before = balances(&w);
    assert_eq!(c.merge(&mut w, a, far), ActionResult::NoContact);
    assert_eq!(c.merge(&mut w, a, water), ActionResult::ForbiddenAction);
    assert_eq!(c.merge(&mut w, a, a), ActionResult::RedundantAction);
    assert_eq!(balances(&w), before);
}

#[test]
fn merge_checks_range_of_both_sides() {
    let mut w = world();
    let mut c = caster(&mut w, 1000);
    let near = manifest(&mut w, &c, 30, Element::Fire, at(10.0));
    let beyond = manifest(&mut w, &c, 20, Element::Fire, at(10.1));
    c.set_control_range(10.05);
    let before = balances(&w);
    assert_eq!(c.merge(&mut w, near, beyond), ActionResult::OutsideRange);
    assert_eq!(balances(&w), before);
    assert!(w.is_alive(beyond));
}

#[test]
fn separate_underflow_guard() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let orb = manifest(&mut w, &c, 5, Element::Fire, at(10.0));
    let before = balances(&w);
    let (result, sibling) = c.separate(&mut w, orb, 10, at(1.0), ForceMode::Impulse);
    assert_eq!(result, ActionResult::ExtractingTooMuch);
    assert!(sibling.is_none());
    assert_eq!(balances(&w), before);
}

// ---------------------------------------------------------------------------
// Vector inputs
// ---------------------------------------------------------------------------

#[test]
fn non_finite_vectors_are_forbidden() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let rock = manifest(&mut w, &c, 100, Element::Earth, at(10.0));
    let before = balances(&w);

    // A finite push the caster cannot afford stays unaffordable when it grows.
    assert_eq!(c.apply_force(&mut w, rock, at(1.0e4), ForceMode::Impulse), ActionResult::NotEnoughEnergy);
    assert_eq!(c.apply_force(&mut w, rock, at(f32::INFINITY), ForceMode::Impulse), ActionResult::ForbiddenAction);
    assert_eq!(c.apply_torque(&mut w, rock, at(f32::NAN), ForceMode::Impulse), ActionResult::ForbiddenAction);
    assert_eq!(c.orient_towards(&mut w, rock, at(f32::INFINITY)), ActionResult::ForbiddenAction);
    assert_eq!(
        c.separate(&mut w, rock, 10, Vec3::new(0.0, f32::NAN, 0.0), ForceMode::Impulse).0,
        ActionResult::ForbiddenAction
    );
    assert_eq!(
        c.manifest_energy(&mut w, 10, Element::Fire, Shape::Sphere, at(5.0), at(f32::NEG_INFINITY)).0,
        ActionResult::ForbiddenAction
    );
    assert_eq!(c.probe_point(&mut w, at(f32::NAN)).0, ActionResult::ForbiddenAction);
    assert_eq!(balances(&w), before);

    w.step_physics(1.0 / 60.0);
    let position = w.position(rock).unwrap();
    assert!(position.iter().all(|v| v.is_finite()), "position {position:?}");
}

#[test]
fn separate_splits_charge() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let orb = manifest(&mut w, &c, 300, Element::Air, at(10.0));
    let (result, sibling) = c.separate(&mut w, orb, 100, at(2.0), ForceMode::Impulse);
    assert_eq!(result, ActionResult::Success);
    let sibling = sibling.unwrap();
    assert_eq!(w.energy(orb), 200);
    assert_eq!(w.energy(sibling), 100);
    assert_eq!(w.resolve_owner(sibling), c.caster());
    // Splitting is free under the stock pricing.
    assert_eq!(c.energy(&w), 700);
}

// ---------------------------------------------------------------------------
// Sealed manifestations
// ---------------------------------------------------------------------------

/// A committed Ritual manifestation next to an ally, plus a second Ritual in
/// contact with it.
fn sealed_setup() -> (EnergyWorld, EnergyController, EntityId, EntityId, EntityId) {
    let mut w = world();
    let c = caster(&mut w, 10_000);
    let ally = w.spawn_unit(0, at(9.0), 0, 100);
    let ritual = manifest(&mut w, &c, 500, Element::Pure, at(10.0));
    let other = manifest(&mut w, &c, 500, Element::Pure, at(10.2));
    assert_eq!(c.change_element(&mut w, ritual, Element::Ritual), ActionResult::Success);
    assert_eq!(c.change_element(&mut w, other, Element::Ritual), ActionResult::Success);
    w.commit_frame();
    assert!(w.is_sealed(ritual));
    (w, c, ritual, other, ally)
}

#[test]
fn sealed_manifestation_rejects_manipulation() {
    let (mut w, c, ritual, other, ally) = sealed_setup();
    let before = balances(&w);
    let results = [
        c.discharge(&mut w, ritual, 10),
        c.merge(&mut w, ritual, other),
        c.separate(&mut w, ritual, 10, at(1.0), ForceMode::Impulse).0,
        c.apply_force(&mut w, ritual, at(1.0), ForceMode::Impulse),
        c.apply_torque(&mut w, ritual, at(1.0), ForceMode::Impulse),
        c.change_element(&mut w, ritual, Element::Fire),
        c.change_shape(&mut w, ritual, Shape::Cube),
        c.apply_aura(&mut w, ritual, ally, AuraKind::Barrier, 10).0,
        c.deform(&mut w, ritual, at(1.0)),
    ];
    for result in results {
        assert_eq!(result, ActionResult::ForbiddenAction);
    }
    assert_eq!(balances(&w), before);
}

#[test]
fn redundancy_is_reported_before_sealing() {
    let (mut w, c, ritual, _, _) = sealed_setup();
    assert_eq!(c.change_element(&mut w, ritual, Element::Ritual), ActionResult::RedundantAction);
    assert_eq!(c.apply_force(&mut w, ritual, Vec3::zeros(), ForceMode::Impulse), ActionResult::RedundantAction);
    assert_eq!(c.change_element(&mut w, ritual, Element::Fire), ActionResult::ForbiddenAction);
}

#[test]
fn sealed_manifestation_accepts_charge() {
    let (mut w, c, ritual, _, _) = sealed_setup();
    assert_eq!(c.charge(&mut w, ritual, 100), ActionResult::Success);
    assert_eq!(w.energy(ritual), 600);
}

// ---------------------------------------------------------------------------
// Auras, substitution, summoning
// ---------------------------------------------------------------------------

#[test]
fn aura_needs_contact() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let ally = w.spawn_unit(0, at(10.0), 0, 100);
    let far = manifest(&mut w, &c, 100, Element::Pure, at(20.0));
    let near = manifest(&mut w, &c, 100, Element::Pure, at(10.3));
    assert_eq!(c.apply_aura(&mut w, far, ally, AuraKind::Regeneration, 20).0, ActionResult::NoContact);
    assert_eq!(c.apply_aura(&mut w, near, ally, AuraKind::Regeneration, 200).0, ActionResult::ExtractingTooMuch);

    let (result, aura) = c.apply_aura(&mut w, near, ally, AuraKind::Regeneration, 20);
    assert_eq!(result, ActionResult::Success);
    let aura = aura.unwrap();
    assert_eq!(w.energy(aura), 20);
    assert_eq!(w.energy(near), 80);
    assert_eq!(w.resolve_owner(aura), c.caster());
    // 10% surcharge on top of the two manifestations.
    assert_eq!(c.energy(&w), 798);

    let (result, _) = c.apply_aura(&mut w, near, ally, AuraKind::Regeneration, 20);
    assert_eq!(result, ActionResult::RedundantAction);
}

#[test]
fn substitute_swaps_caster_and_crate() {
    let mut w = world();
    let c = EnergyController::new(w.spawn_unit(0, Vec3::zeros(), 1000, 100), 50.0, FreeEnergyCost);
    let crate_box = w.spawn_solid(at(10.0), [0.5, 0.5, 0.5], 1.0);
    let wall = w.spawn_static(at(-10.0), [0.5, 0.5, 0.5]);
    w.step_physics(1.0 / 60.0);
    let orb = manifest(&mut w, &c, 10, Element::Earth, at(5.0));

    assert_eq!(c.substitute(&mut w, orb, c.caster(), wall), ActionResult::ForbiddenAction);
    assert_eq!(c.substitute(&mut w, orb, crate_box, crate_box), ActionResult::RedundantAction);
    assert_eq!(c.substitute(&mut w, orb, c.caster(), crate_box), ActionResult::Success);
    assert!((w.position(c.caster()).unwrap().x - 10.0).abs() < 0.1);
    assert!(w.position(crate_box).unwrap().x.abs() < 0.1);
    assert!(!w.is_alive(orb));
}

#[test]
fn substitute_needs_a_body_that_can_collide() {
    let mut w = world();
    let c = EnergyController::new(w.spawn_unit(0, Vec3::zeros(), 1000, 100), 50.0, FreeEnergyCost);
    let crate_box = w.spawn_solid(at(10.0), [0.5, 0.5, 0.5], 1.0);
    w.step_physics(1.0 / 60.0);
    // Pure energy passes through solid bodies.
    let orb = manifest(&mut w, &c, 10, Element::Pure, at(5.0));
    let before = balances(&w);
    assert_eq!(c.substitute(&mut w, orb, c.caster(), crate_box), ActionResult::ForbiddenAction);
    assert_eq!(balances(&w), before);
    assert!(w.is_alive(orb));

    assert_eq!(c.change_element(&mut w, orb, Element::Earth), ActionResult::Success);
    w.commit_frame();
    assert_eq!(c.substitute(&mut w, orb, c.caster(), crate_box), ActionResult::Success);
    assert!(!w.is_alive(orb));
}

#[test]
fn summon_from_ritual() {
    let (mut w, c, ritual, _, _) = sealed_setup();
    let (result, unit) = c.summon(&mut w, ritual);
    assert_eq!(result, ActionResult::Success);
    let unit = unit.unwrap();
    assert_eq!(w.unit(unit).unwrap().health(), 500);
    assert_eq!(w.resolve_owner(unit), c.caster());
    assert!(!w.is_alive(ritual));
}

#[test]
fn foreign_caster_cannot_control() {
    let mut w = world();
    let c = caster(&mut w, 1000);
    let rival = EnergyController::new(w.spawn_unit(1, at(5.0), 1000, 100), 50.0, FreeEnergyCost);
    let orb = manifest(&mut w, &c, 100, Element::Fire, at(10.0));
    assert_eq!(rival.apply_force(&mut w, orb, at(1.0), ForceMode::Impulse), ActionResult::ForbiddenAction);
    assert_eq!(rival.summon(&mut w, orb).0, ActionResult::ForbiddenAction);
    assert_eq!(rival.charge(&mut w, orb, 10), ActionResult::Success);
}
