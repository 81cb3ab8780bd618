//! Element and shape definitions.
//!
//! The [`EnergyRegistry`] is the single source of truth for per-element and
//! per-shape constants. It is built once, either from the built-in table
//! ([`EnergyRegistry::default`]) or from JSON, and then passed by reference to
//! everything that needs it: the world, the gateway and cost policies. There
//! is no process-wide instance.
//!
//! ```
//! use aether_core::prelude::*;
//!
//! let registry = EnergyRegistry::default();
//! assert!(registry.element(Element::Ritual).sealed);
//! assert!(registry.element(Element::Fire).pass_through);
//! assert_eq!(registry.energy_scale(), ENERGY_SCALE);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formula;
use crate::status::StatusEffectKind;
use crate::{EnergyError, ENERGY_SCALE};

// ---------------------------------------------------------------------------
// Element / Shape
// ---------------------------------------------------------------------------

/// Categorical tag driving mass, collision mode, gravity, smash threshold and
/// sealing of a manifestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Element {
    Pure,
    Fire,
    Water,
    Earth,
    Air,
    Lightning,
    Ice,
    /// Sealed: accepts energy, refuses almost every other manipulation.
    Ritual,
}

impl Element {
    pub const ALL: [Element; 8] = [
        Element::Pure,
        Element::Fire,
        Element::Water,
        Element::Earth,
        Element::Air,
        Element::Lightning,
        Element::Ice,
        Element::Ritual,
    ];
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Categorical tag selecting collider and mesh. Has no other effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Shape {
    Sphere,
    Cube,
    Cylinder,
    Capsule,
}

impl Shape {
    pub const ALL: [Shape; 4] = [Shape::Sphere, Shape::Cube, Shape::Cylinder, Shape::Capsule];
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Constants for one [`Element`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDefinition {
    /// Mass of one scaled unit of charge at rest.
    pub mass_per_unit: f32,
    /// Volume of an empty manifestation.
    pub base_volume: f32,
    /// Volume added per scaled unit of charge.
    pub volume_per_unit: f32,
    /// Elasticity constant `k` of the stress/deformation relation.
    pub elasticity: f32,
    /// Velocity change per unit mass above which a contact smashes the body.
    pub smash_impulse: f32,
    /// Contact drains energy instead of producing a rigid response.
    pub pass_through: bool,
    /// Affected by gravity.
    pub gravity: bool,
    /// Refuses discharge, merge, separate, force, aura and reshaping.
    #[serde(default)]
    pub sealed: bool,
    /// Status effect applied to units touched by this element.
    #[serde(default)]
    pub status_effect: Option<StatusEffectKind>,
    /// Opaque visual asset key (material/particle set). Never interpreted.
    #[serde(default)]
    pub asset: Option<String>,
}

/// Which collider a shape is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColliderKind {
    Ball,
    Cuboid,
    Cylinder,
    Capsule,
}

/// Constants for one [`Shape`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDefinition {
    pub collider: ColliderKind,
    /// Opaque mesh asset key. Never interpreted.
    #[serde(default)]
    pub mesh: Option<String>,
}

// ---------------------------------------------------------------------------
// EnergyRegistry
// ---------------------------------------------------------------------------

/// Read-only table of element and shape definitions plus the global scaling
/// constants.
///
/// Every [`Element`] and [`Shape`] is guaranteed to have a definition: both
/// constructors check completeness, so lookups are infallible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyRegistry {
    energy_scale: u64,
    speed_limit: f32,
    elements: BTreeMap<Element, ElementDefinition>,
    shapes: BTreeMap<Shape, ShapeDefinition>,
}

impl EnergyRegistry {
    /// Parse a registry from JSON and check that it is complete.
    pub fn from_json_str(json: &str) -> Result<Self, EnergyError> {
        let registry: EnergyRegistry = serde_json::from_str(json)?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn to_json_string(&self) -> Result<String, EnergyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), EnergyError> {
        if self.energy_scale == 0 {
            return Err(EnergyError::InvalidConstant {
                name: "energy_scale",
                value: 0.0,
            });
        }
        if !(self.speed_limit > 0.0 && self.speed_limit.is_finite()) {
            return Err(EnergyError::InvalidConstant {
                name: "speed_limit",
                value: self.speed_limit as f64,
            });
        }
        for element in Element::ALL {
            let def = self
                .elements
                .get(&element)
                .ok_or(EnergyError::MissingElement { element })?;
            if def.elasticity <= 0.0 || def.mass_per_unit <= 0.0 {
                return Err(EnergyError::InvalidConstant {
                    name: "elasticity/mass_per_unit",
                    value: def.elasticity.min(def.mass_per_unit) as f64,
                });
            }
        }
        for shape in Shape::ALL {
            if !self.shapes.contains_key(&shape) {
                return Err(EnergyError::MissingShape { shape });
            }
        }
        Ok(())
    }

    /// Definition for `element`.
    pub fn element(&self, element: Element) -> &ElementDefinition {
        &self.elements[&element]
    }

    /// Definition for `shape`.
    pub fn shape(&self, shape: Shape) -> &ShapeDefinition {
        &self.shapes[&shape]
    }

    /// Factor converting raw charge into user-facing units.
    pub fn energy_scale(&self) -> u64 {
        self.energy_scale
    }

    /// Global relativistic speed cap.
    pub fn speed_limit(&self) -> f32 {
        self.speed_limit
    }

    /// Builder-style override of the speed cap.
    pub fn with_speed_limit(mut self, speed_limit: f32) -> Self {
        assert!(
            speed_limit > 0.0 && speed_limit.is_finite(),
            "speed_limit must be positive and finite, got {speed_limit}"
        );
        self.speed_limit = speed_limit;
        self
    }

    /// Builder-style override of a single element definition.
    pub fn with_element(mut self, element: Element, definition: ElementDefinition) -> Self {
        self.elements.insert(element, definition);
        self
    }

    pub fn scaled(&self, charge: u64) -> f32 {
        charge as f32 / self.energy_scale as f32
    }

    pub fn lorentz_factor(&self, speed: f32) -> f32 {
        formula::lorentz_factor(speed, self.speed_limit)
    }

    /// Mass of `charge` units of `element` moving at `speed`.
    pub fn mass(&self, element: Element, charge: u64, speed: f32) -> f32 {
        formula::mass(
            self.element(element).mass_per_unit,
            self.scaled(charge),
            self.lorentz_factor(speed),
        )
    }

    /// Undeformed volume of `charge` units of `element`.
    pub fn volume(&self, element: Element, charge: u64) -> f32 {
        let def = self.element(element);
        formula::volume(def.base_volume, def.volume_per_unit, self.scaled(charge))
    }
}

impl Default for EnergyRegistry {
    /// The built-in element table.
    fn default() -> Self {
        fn def(
            mass_per_unit: f32,
            volume_per_unit: f32,
            elasticity: f32,
            smash_impulse: f32,
            pass_through: bool,
            gravity: bool,
            status_effect: Option<StatusEffectKind>,
        ) -> ElementDefinition {
            ElementDefinition {
                mass_per_unit,
                base_volume: 0.05,
                volume_per_unit,
                elasticity,
                smash_impulse,
                pass_through,
                gravity,
                sealed: false,
                status_effect,
                asset: None,
            }
        }

        use StatusEffectKind::*;
        let mut elements = BTreeMap::new();
        elements.insert(Element::Pure, def(0.2, 0.10, 5.0, 40.0, true, false, None));
        elements.insert(Element::Fire, def(0.1, 0.12, 3.0, 50.0, true, false, Some(Burning)));
        elements.insert(Element::Water, def(1.0, 0.10, 2.0, 25.0, true, true, Some(Soaked)));
        elements.insert(Element::Earth, def(2.5, 0.08, 50.0, 30.0, false, true, None));
        elements.insert(Element::Air, def(0.01, 0.20, 1.0, 100.0, true, false, None));
        elements.insert(Element::Lightning, def(0.05, 0.08, 10.0, 200.0, true, false, Some(Shocked)));
        elements.insert(Element::Ice, def(0.9, 0.11, 30.0, 20.0, false, true, Some(Chilled)));
        elements.insert(
            Element::Ritual,
            ElementDefinition {
                base_volume: 0.1,
                sealed: true,
                ..def(1.5, 0.05, 80.0, 1.0e6, false, false, None)
            },
        );
        for (element, definition) in elements.iter_mut() {
            definition.asset = Some(format!("materials/{}", element.to_string().to_lowercase()));
        }

        let shapes = [
            (Shape::Sphere, ColliderKind::Ball),
            (Shape::Cube, ColliderKind::Cuboid),
            (Shape::Cylinder, ColliderKind::Cylinder),
            (Shape::Capsule, ColliderKind::Capsule),
        ]
        .into_iter()
        .map(|(shape, collider)| {
            let mesh = Some(format!("meshes/{}", shape.to_string().to_lowercase()));
            (shape, ShapeDefinition { collider, mesh })
        })
        .collect();

        Self {
            energy_scale: ENERGY_SCALE,
            speed_limit: 200.0,
            elements,
            shapes,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
