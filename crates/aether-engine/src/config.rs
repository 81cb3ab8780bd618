//! Engine configuration.
//!
//! [`EngineConfig`] collects every tunable of the simulation that is not part
//! of the element/shape table. All fields have defaults, so a JSON document
//! only needs to name what it overrides.

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// What happens to the absorbed body's momentum when two manifestations merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMomentum {
    /// The survivor keeps its own velocity; the absorbed momentum is lost.
    #[default]
    Discard,
    /// The survivor moves at the mass-weighted mean velocity of both bodies.
    Conserve,
}

/// Tunables of the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed time step in seconds per step. Must be positive and finite.
    pub fixed_dt: f32,
    pub gravity: [f32; 3],
    /// Relativistic speed cap. Overrides the registry's value when set.
    pub speed_limit: Option<f32>,
    /// Seconds between aura activations.
    pub aura_interval: f32,
    /// Seconds between decay ticks of ownerless manifestations.
    pub decay_interval: f32,
    /// Fraction of the charge lost per decay tick (at least one unit).
    pub decay_fraction: f32,
    pub merge_momentum: MergeMomentum,
    /// Control range given to controllers built with defaults.
    pub default_control_range: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            gravity: [0.0, -9.81, 0.0],
            speed_limit: None,
            aura_interval: 1.0,
            decay_interval: 1.0,
            decay_fraction: 0.05,
            merge_momentum: MergeMomentum::Discard,
            default_control_range: 50.0,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        fn positive(name: &str, value: f32) -> Result<(), EngineError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(EngineError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        }
        positive("fixed_dt", self.fixed_dt)?;
        positive("aura_interval", self.aura_interval)?;
        positive("decay_interval", self.decay_interval)?;
        positive("default_control_range", self.default_control_range)?;
        if let Some(limit) = self.speed_limit {
            positive("speed_limit", limit)?;
        }
        if !(0.0..=1.0).contains(&self.decay_fraction) {
            return Err(EngineError::InvalidConfig(format!(
                "decay_fraction must be within [0, 1], got {}",
                self.decay_fraction
            )));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(EngineError::InvalidConfig("gravity must be finite".into()));
        }
        Ok(())
    }

    /// Same configuration without gravity. Handy for tests and space scenes.
    pub fn weightless(mut self) -> Self {
        self.gravity = [0.0; 3];
        self
    }
}
