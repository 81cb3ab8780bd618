//! Categorical tags for lingering effects: elemental status effects on units
//! and ledger-backed auras.

use serde::{Deserialize, Serialize};

/// A status effect an element leaves on a unit it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusEffectKind {
    /// Deals its drained charge as damage.
    Burning,
    Soaked,
    Shocked,
    Chilled,
}

/// The kind of an aura. A unit carries at most one aura of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuraKind {
    /// Heals the target by the amount paid each activation.
    Regeneration,
    /// Damages the target by the amount paid each activation.
    Burning,
    /// Grants barrier points equal to the amount paid each activation.
    Barrier,
}
