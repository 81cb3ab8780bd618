//! State of one manifested energy body.
//!
//! A [`Manifestation`] separates what the body *is* this frame from what it
//! is about to become. Element and shape changes are recorded as future
//! values and committed at the next frame boundary; until then collision
//! resolution keeps reading [`FrameProperties`] captured at the start of the
//! step. Charge is not stored here: it is the energy of the body's ledger.

use std::collections::BTreeSet;

use aether_core::element::{Element, EnergyRegistry, Shape};
use aether_core::entity::EntityId;
use aether_core::formula;
use serde::Serialize;

use crate::physics::{ColliderShape, Vec3};
use crate::tick::IntervalTimer;

// ---------------------------------------------------------------------------
// FrameProperties
// ---------------------------------------------------------------------------

/// Physical properties frozen at a frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameProperties {
    pub element: Element,
    pub shape: Shape,
    pub charge: u64,
    pub mass: f32,
    /// Undeformed volume.
    pub volume: f32,
    /// Volume after deformation.
    pub actual_volume: f32,
    pub density: f32,
    pub velocity: [f32; 3],
    pub lorentz: f32,
}

impl FrameProperties {
    pub fn measure(
        registry: &EnergyRegistry,
        element: Element,
        shape: Shape,
        charge: u64,
        velocity: Vec3,
        deformation: [f32; 3],
    ) -> Self {
        let speed = velocity.norm();
        let mass = registry.mass(element, charge, speed);
        let volume = registry.volume(element, charge);
        let actual_volume = formula::actual_volume(volume, deformation);
        let density = if actual_volume > 0.0 { mass / actual_volume } else { 0.0 };
        Self {
            element,
            shape,
            charge,
            mass,
            volume,
            actual_volume,
            density,
            velocity: [velocity.x, velocity.y, velocity.z],
            lorentz: registry.lorentz_factor(speed),
        }
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::new(self.velocity[0], self.velocity[1], self.velocity[2])
    }
}

// ---------------------------------------------------------------------------
// Manifestation
// ---------------------------------------------------------------------------

/// Whether a manifestation has uncommitted element/shape changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Stable,
    PendingChange,
}

/// Element and shape changes applied by [`Manifestation::commit_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommittedChange {
    pub element: Option<(Element, Element)>,
    pub shape: Option<(Shape, Shape)>,
}

#[derive(Debug, Clone)]
pub struct Manifestation {
    element: Element,
    shape: Shape,
    future_element: Element,
    future_shape: Shape,
    /// Total accumulated stress per axis.
    stress: [f32; 3],
    /// Set when `stress` changed since the last commit.
    stress_dirty: bool,
    deformation: [f32; 3],
    mass: f32,
    last_frame: FrameProperties,
    /// Volume the current collider was built for.
    collider_volume: f32,
    contacts: BTreeSet<EntityId>,
    free_rotation: bool,
    pub(crate) decay: IntervalTimer,
}

impl Manifestation {
    pub fn new(registry: &EnergyRegistry, element: Element, shape: Shape, charge: u64, velocity: Vec3) -> Self {
        let deformation = [1.0; 3];
        let last_frame = FrameProperties::measure(registry, element, shape, charge, velocity, deformation);
        Self {
            element,
            shape,
            future_element: element,
            future_shape: shape,
            stress: [0.0; 3],
            stress_dirty: false,
            deformation,
            mass: last_frame.mass,
            last_frame,
            collider_volume: last_frame.actual_volume,
            contacts: BTreeSet::new(),
            free_rotation: false,
            decay: IntervalTimer::default(),
        }
    }

    pub fn element(&self) -> Element {
        self.element
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn future_element(&self) -> Element {
        self.future_element
    }

    pub fn future_shape(&self) -> Shape {
        self.future_shape
    }

    pub fn state(&self) -> PendingState {
        if self.future_element == self.element && self.future_shape == self.shape {
            PendingState::Stable
        } else {
            PendingState::PendingChange
        }
    }

    /// Derived from the committed element.
    pub fn is_sealed(&self, registry: &EnergyRegistry) -> bool {
        registry.element(self.element).sealed
    }

    pub fn deformation(&self) -> [f32; 3] {
        self.deformation
    }

    pub fn stress(&self) -> [f32; 3] {
        self.stress
    }

    /// Mass as of the last commit.
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Snapshot used by collision resolution this step.
    pub fn last_frame(&self) -> &FrameProperties {
        &self.last_frame
    }

    pub fn contacts(&self) -> &BTreeSet<EntityId> {
        &self.contacts
    }

    pub fn is_touching(&self, other: EntityId) -> bool {
        self.contacts.contains(&other)
    }

    pub fn free_rotation(&self) -> bool {
        self.free_rotation
    }

    // -- mutation (crate-internal; the world keeps physics in sync) ---------

    pub(crate) fn set_future_element(&mut self, element: Element) -> bool {
        if self.future_element == element {
            return false;
        }
        self.future_element = element;
        true
    }

    pub(crate) fn set_future_shape(&mut self, shape: Shape) -> bool {
        if self.future_shape == shape {
            return false;
        }
        self.future_shape = shape;
        true
    }

    pub(crate) fn add_stress(&mut self, stress: Vec3) {
        self.stress[0] += stress.x;
        self.stress[1] += stress.y;
        self.stress[2] += stress.z;
        self.stress_dirty = true;
    }

    /// Resolve accumulated stress into deformation using the committed
    /// element's elasticity. Returns whether deformation changed.
    pub(crate) fn resolve_stress(&mut self, registry: &EnergyRegistry) -> bool {
        let elasticity = registry.element(self.element).elasticity;
        let deformation = formula::deformation_vector(self.stress, elasticity);
        let changed = self.stress_dirty || deformation != self.deformation;
        self.deformation = deformation;
        self.stress_dirty = false;
        changed
    }

    pub(crate) fn commit_pending(&mut self) -> CommittedChange {
        let mut change = CommittedChange::default();
        if self.future_element != self.element {
            change.element = Some((self.element, self.future_element));
            self.element = self.future_element;
        }
        if self.future_shape != self.shape {
            change.shape = Some((self.shape, self.future_shape));
            self.shape = self.future_shape;
        }
        change
    }

    pub(crate) fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
    }

    pub(crate) fn set_last_frame(&mut self, frame: FrameProperties) {
        self.last_frame = frame;
    }

    /// Collider geometry for the future element/shape at `charge`, with the
    /// deformed volume it encloses.
    pub(crate) fn future_collider(&self, registry: &EnergyRegistry, charge: u64) -> (ColliderShape, f32) {
        let volume = registry.volume(self.future_element, charge);
        let kind = registry.shape(self.future_shape).collider;
        (
            ColliderShape::for_volume(kind, volume, self.deformation),
            formula::actual_volume(volume, self.deformation),
        )
    }

    /// Whether a collider built for `volume` is more than 1% off.
    pub(crate) fn collider_drifted(&self, volume: f32) -> bool {
        let base = self.collider_volume.max(f32::EPSILON);
        ((volume - self.collider_volume) / base).abs() > 0.01
    }

    pub(crate) fn set_collider_volume(&mut self, volume: f32) {
        self.collider_volume = volume;
    }

    pub(crate) fn set_free_rotation(&mut self, free: bool) {
        self.free_rotation = free;
    }

    pub(crate) fn touch(&mut self, other: EntityId) -> bool {
        self.contacts.insert(other)
    }

    pub(crate) fn untouch(&mut self, other: EntityId) -> bool {
        self.contacts.remove(&other)
    }
}
