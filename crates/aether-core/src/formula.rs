//! Closed-form game physics.
//!
//! Pure functions, no state. The relativistic correction is game physics, not
//! real relativity: it only keeps effective mass finite and growing as a body
//! approaches the configured speed limit.

/// Ratio of the speed limit at which the Lorentz factor stops growing.
pub const MAX_SPEED_RATIO: f32 = 0.999;

/// Smallest per-axis deformation. Bodies never collapse to zero volume.
pub const MIN_DEFORMATION: f32 = 1.0e-3;

/// `1 / sqrt(1 - v²/c²)`, with `v` clamped just below `speed_limit`.
pub fn lorentz_factor(speed: f32, speed_limit: f32) -> f32 {
    let ratio = (speed.abs() / speed_limit).min(MAX_SPEED_RATIO);
    1.0 / (1.0 - ratio * ratio).sqrt()
}

/// `massPerUnit * scaledCharge * lorentzFactor`.
pub fn mass(mass_per_unit: f32, scaled_charge: f32, lorentz: f32) -> f32 {
    mass_per_unit * scaled_charge * lorentz
}

/// `baseVolume + volumePerUnit * scaledCharge`.
pub fn volume(base_volume: f32, volume_per_unit: f32, scaled_charge: f32) -> f32 {
    base_volume + volume_per_unit * scaled_charge
}

/// Resolve accumulated stress along one axis into a scale factor.
///
/// Compressive stress (`s >= 0`) shrinks: `k / (s + k)`.
/// Tensile stress (`s < 0`) stretches: `(2/3)·ln(-s/k + 1) + 1`.
/// Both branches give exactly `1` at `s == 0`.
pub fn deformation_from_stress(stress: f32, elasticity: f32) -> f32 {
    let d = if stress >= 0.0 {
        elasticity / (stress + elasticity)
    } else {
        (2.0 / 3.0) * (-stress / elasticity + 1.0).ln() + 1.0
    };
    d.max(MIN_DEFORMATION)
}

/// Inverse of [`deformation_from_stress`]: the stress that yields `deformation`.
pub fn stress_for_deformation(deformation: f32, elasticity: f32) -> f32 {
    let d = deformation.max(MIN_DEFORMATION);
    if d <= 1.0 {
        elasticity / d - elasticity
    } else {
        -elasticity * ((1.5 * (d - 1.0)).exp() - 1.0)
    }
}

/// Per-axis [`deformation_from_stress`].
pub fn deformation_vector(stress: [f32; 3], elasticity: f32) -> [f32; 3] {
    stress.map(|s| deformation_from_stress(s, elasticity))
}

/// `originalVolume * dx * dy * dz`.
pub fn actual_volume(original_volume: f32, deformation: [f32; 3]) -> f32 {
    original_volume * deformation[0] * deformation[1] * deformation[2]
}

/// Volume chipped off the smaller body in a contact.
///
/// The smaller body is treated as a cube of equal volume hitting an
/// axis-aligned wall: `penetration` is lost from both faces of the cube along
/// each axis, and whatever no longer fits in the shrunken cube is the
/// intersecting volume.
pub fn intersecting_volume(smaller_volume: f32, penetration: f32) -> f32 {
    if smaller_volume <= 0.0 || penetration <= 0.0 {
        return 0.0;
    }
    let width = (smaller_volume.cbrt() - 2.0 * penetration).max(0.0);
    smaller_volume - (width * width * width).clamp(0.0, smaller_volume)
}

/// Charge equivalent of a volume of matter at `density`.
///
/// `volume * density * scale / (massPerUnit * lorentzFactor)`.
pub fn energy_for_volume(
    volume: f32,
    density: f32,
    energy_scale: u64,
    mass_per_unit: f32,
    lorentz: f32,
) -> f32 {
    volume * density * energy_scale as f32 / (mass_per_unit * lorentz)
}

/// Velocity of body 1 after a perfectly elastic collision with body 2.
///
/// `other_mass == None` means an immovable partner, which reflects `v1`
/// about `v2`.
pub fn elastic_velocity(mass: f32, velocity: [f32; 3], other_mass: Option<f32>, other_velocity: [f32; 3]) -> [f32; 3] {
    match other_mass {
        Some(m2) if m2.is_finite() && mass + m2 > 0.0 => {
            let m1 = mass;
            std::array::from_fn(|i| {
                ((m1 - m2) * velocity[i] + 2.0 * m2 * other_velocity[i]) / (m1 + m2)
            })
        }
        _ => std::array::from_fn(|i| 2.0 * other_velocity[i] - velocity[i]),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
