//! Headless duel: a fire mage throws fireballs at a water mage who hides
//! behind a barrier.
//!
//! Run with:
//!   cargo run --example duel -p aether-engine
//!
//! Set `RUST_LOG=aether_engine=debug` to watch every gateway call.

use anyhow::Context;
use aether_engine::prelude::*;

/// Seconds simulated.
const DURATION: u64 = 8;

// ---------------------------------------------------------------------------
// Spells
// ---------------------------------------------------------------------------

/// Manifests one fireball next to the caster and keeps pushing it at the
/// target until it is gone, then throws the next one.
struct Fireball {
    target: EntityId,
    orb: Option<FocusHandle>,
}

impl Fireball {
    fn throw(&mut self, ctx: &mut SpellContext<'_>) -> ActionResult {
        let Some(origin) = ctx.world.position(ctx.controller.caster()) else {
            return ActionResult::InvalidObject;
        };
        let (result, orb) = ctx.controller.manifest_energy(
            ctx.world,
            400,
            Element::Fire,
            Shape::Sphere,
            origin + Vec3::new(1.5, 0.0, 0.0),
            Vec3::zeros(),
        );
        if let Some(orb) = orb {
            self.orb = Some(ctx.focus.focus(orb));
        }
        result
    }
}

impl Spell for Fireball {
    fn kind(&self) -> SpellKind {
        SpellKind::Continuous
    }

    fn begin(&mut self, ctx: &mut SpellContext<'_>) -> ActionResult {
        self.throw(ctx)
    }

    fn update(&mut self, ctx: &mut SpellContext<'_>, _stage: usize) -> SpellStep {
        let Some(target) = ctx.world.position(self.target) else {
            return SpellStep::Finish;
        };
        let orb = self.orb.and_then(|handle| ctx.focused(handle));
        let Some(orb) = orb.filter(|&orb| ctx.world.is_alive(orb)) else {
            return SpellStep::Continue(self.throw(ctx));
        };
        let Some(position) = ctx.world.position(orb) else {
            return SpellStep::Continue(ActionResult::InvalidObject);
        };
        let Some(direction) = (target - position).try_normalize(1.0e-6) else {
            return SpellStep::Continue(ActionResult::RedundantAction);
        };
        let result = ctx
            .controller
            .apply_force(ctx.world, orb, direction * 0.5, ForceMode::VelocityChange);
        SpellStep::Continue(result)
    }

    fn on_focus_lost(&mut self, handle: FocusHandle) {
        if self.orb == Some(handle) {
            self.orb = None;
        }
    }
}

/// Raises a barrier aura on its own caster through a pure shield.
struct Ward;

impl Spell for Ward {
    fn kind(&self) -> SpellKind {
        SpellKind::Instant
    }

    fn release(&self) -> Release {
        Release::Disown
    }

    fn begin(&mut self, ctx: &mut SpellContext<'_>) -> ActionResult {
        let caster = ctx.controller.caster();
        let Some(origin) = ctx.world.position(caster) else {
            return ActionResult::InvalidObject;
        };
        let (result, shield) =
            ctx.controller
                .manifest_energy(ctx.world, 600, Element::Pure, Shape::Sphere, origin, Vec3::zeros());
        let Some(shield) = shield else {
            return result;
        };
        ctx.focus.focus(shield);
        ctx.controller
            .apply_aura(ctx.world, shield, caster, AuraKind::Barrier, 400)
            .0
    }
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // Round-trip the stock tables through JSON, the way a game would load them.
    let registry = EnergyRegistry::default().to_json_string()?;
    let config = serde_json::to_string(&EngineConfig::default().weightless())?;
    let mut world = EnergyWorld::from_json_str(&registry, &config).context("loading energy tables")?;

    let pyro = world.spawn_unit(0, Vec3::new(-8.0, 0.0, 0.0), 20_000, 2_000);
    let hydro = world.spawn_unit(1, Vec3::new(8.0, 0.0, 0.0), 20_000, 2_000);

    let mut sim = Simulation::new(world);
    let attack = sim.add_spell(SpellHost::new(
        Fireball {
            target: hydro,
            orb: None,
        },
        EnergyController::try_new(sim.world(), pyro, 30.0, DefaultEnergyCost::default())?,
    ));
    let ward = sim.add_spell(SpellHost::new(
        Ward,
        EnergyController::try_new(sim.world(), hydro, 30.0, DefaultEnergyCost::default())?,
    ));
    for id in [ward, attack] {
        if let Some((host, world)) = sim.spell_mut(id) {
            let result = host.cast(world);
            tracing::info!(?id, %result, "cast");
        }
    }

    let steps_per_second = (1.0 / sim.fixed_dt()).round() as u64;
    for second in 1..=DURATION {
        for _ in 0..steps_per_second {
            sim.step();
            sim.late_update();
        }
        let world = sim.world();
        let health = |id| world.unit(id).map_or(0, |u| u.health());
        let barrier = world.unit(hydro).map_or(0, |u| u.barrier());
        println!(
            "t={second}s pyro: {} energy, {} hp | hydro: {} energy, {} hp, {} barrier | {}",
            world.energy(pyro),
            health(pyro),
            world.energy(hydro),
            health(hydro),
            barrier,
            sim.digest(),
        );
    }

    if let Some(host) = sim.spell(attack) {
        println!("attack spell state: {:?}", host.state());
    }
    Ok(())
}
