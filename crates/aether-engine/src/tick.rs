//! Fixed-timestep simulation loop.
//!
//! The [`Simulation`] drives an [`EnergyWorld`] forward. Each step:
//!
//! 1. Active spells update, in the order they were added.
//! 2. Frame boundary: pending element/shape changes commit and every
//!    manifestation takes the snapshot collision resolution will read.
//! 3. The physics world steps.
//! 4. The step's contacts are resolved.
//! 5. Status effects, auras and ownerless decay tick.
//! 6. The tick counter advances.
//!
//! Given the same initial world, the same spells and the same calls, two
//! simulations produce identical [`WorldDigest`]s.
//!
//! # Example
//!
//! ```
//! use aether_engine::prelude::*;
//!
//! let world = EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default());
//! let mut sim = Simulation::new(world);
//! sim.run_steps(10);
//!
//! assert_eq!(sim.tick_count(), 10);
//! assert!((sim.sim_time() - 10.0 / 60.0).abs() < 1e-9);
//! ```

use std::time::{Duration, Instant};

use crate::snapshot::WorldDigest;
use crate::spell::SpellHost;
use crate::world::EnergyWorld;

// ---------------------------------------------------------------------------
// IntervalTimer
// ---------------------------------------------------------------------------

/// Elapsed-time accumulator that fires once per whole interval.
///
/// Fractions of an interval carry over; an interval is never credited
/// partially.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalTimer {
    elapsed: f32,
}

impl IntervalTimer {
    /// Absorbs float error from summing many small steps.
    const EPSILON: f32 = 1.0e-4;

    /// Add `dt` and return how many whole intervals completed.
    pub fn advance(&mut self, dt: f32, interval: f32) -> u32 {
        self.elapsed += dt;
        if interval <= 0.0 {
            return 0;
        }
        let completed = ((self.elapsed + Self::EPSILON) / interval).floor();
        self.elapsed = (self.elapsed - completed * interval).max(0.0);
        completed as u32
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

// ---------------------------------------------------------------------------
// StepDiagnostics
// ---------------------------------------------------------------------------

/// Wall-clock timing of the last step.
#[derive(Debug, Clone, Default)]
pub struct StepDiagnostics {
    pub total: Duration,
    pub spells: Duration,
    pub commit: Duration,
    pub physics: Duration,
    pub collision: Duration,
    /// Status effects, auras and decay.
    pub upkeep: Duration,
    /// Contact events resolved this step.
    pub contact_events: usize,
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Index of a spell added with [`Simulation::add_spell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpellId(usize);

pub struct Simulation {
    world: EnergyWorld,
    hosts: Vec<SpellHost>,
    tick_counter: u64,
    fixed_dt: f32,
    last_diagnostics: StepDiagnostics,
}

impl Simulation {
    /// Wrap `world`, stepping at its configured `fixed_dt`.
    ///
    /// # Panics
    ///
    /// Panics if `fixed_dt` is not positive and finite.
    pub fn new(world: EnergyWorld) -> Self {
        let fixed_dt = world.config().fixed_dt;
        assert!(
            fixed_dt > 0.0 && fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {fixed_dt}"
        );
        Self {
            world,
            hosts: Vec::new(),
            tick_counter: 0,
            fixed_dt,
            last_diagnostics: StepDiagnostics::default(),
        }
    }

    /// Register a spell host. It is updated every step while active.
    pub fn add_spell(&mut self, host: SpellHost) -> SpellId {
        self.hosts.push(host);
        SpellId(self.hosts.len() - 1)
    }

    pub fn spell(&self, id: SpellId) -> Option<&SpellHost> {
        self.hosts.get(id.0)
    }

    /// Borrow a spell host together with the world it acts on.
    pub fn spell_mut(&mut self, id: SpellId) -> Option<(&mut SpellHost, &mut EnergyWorld)> {
        let host = self.hosts.get_mut(id.0)?;
        Some((host, &mut self.world))
    }

    /// Execute one fixed step.
    pub fn step(&mut self) {
        let dt = self.fixed_dt;
        let step_start = Instant::now();

        let start = Instant::now();
        for host in &mut self.hosts {
            host.update(&mut self.world, dt);
        }
        let spells = start.elapsed();

        let start = Instant::now();
        self.world.commit_frame();
        let commit = start.elapsed();

        let start = Instant::now();
        let contacts = self.world.step_physics(dt);
        let physics = start.elapsed();

        let start = Instant::now();
        self.world.resolve_contacts(&contacts, dt);
        let collision = start.elapsed();

        let start = Instant::now();
        self.world.tick_status(dt);
        self.world.tick_auras(dt);
        self.world.tick_decay(dt);
        let upkeep = start.elapsed();

        self.tick_counter += 1;
        self.last_diagnostics = StepDiagnostics {
            total: step_start.elapsed(),
            spells,
            commit,
            physics,
            collision,
            upkeep,
            contact_events: contacts.len(),
        };
        tracing::trace!(tick = self.tick_counter, contacts = contacts.len(), "step complete");
    }

    pub fn run_steps(&mut self, count: u64) {
        for _ in 0..count {
            self.step();
        }
    }

    /// Once-per-rendered-frame phase: refresh every spell's focus table.
    pub fn late_update(&mut self) {
        for host in &mut self.hosts {
            host.late_update(&self.world);
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Computed as `tick_count * fixed_dt`, never accumulated.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * f64::from(self.fixed_dt)
    }

    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    pub fn world(&self) -> &EnergyWorld {
        &self.world
    }

    /// Direct world access, for setup and tests.
    pub fn world_mut(&mut self) -> &mut EnergyWorld {
        &mut self.world
    }

    pub fn diagnostics(&self) -> &StepDiagnostics {
        &self.last_diagnostics
    }

    pub fn digest(&self) -> WorldDigest {
        WorldDigest::capture(&self.world, self.tick_counter)
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick_counter", &self.tick_counter)
            .field("fixed_dt", &self.fixed_dt)
            .field("spells", &self.hosts.len())
            .field("world", &self.world)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
