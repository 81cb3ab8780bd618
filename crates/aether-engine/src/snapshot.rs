//! BLAKE3 digest of the deterministic world state.
//!
//! A [`WorldDigest`] hashes a canonical JSON rendering of everything the
//! energy model decides: ledger balances and ownership, committed element and
//! shape of each manifestation, unit health and barrier, and running auras.
//! Physics poses are not part of it.
//!
//! ```
//! use aether_engine::prelude::*;
//!
//! let mut a = EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default());
//! let mut b = EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default());
//! a.spawn_unit(0, Vec3::zeros(), 500, 100);
//! b.spawn_unit(0, Vec3::zeros(), 500, 100);
//!
//! let digest = WorldDigest::capture(&a, 0);
//! assert_eq!(digest, WorldDigest::capture(&b, 0));
//! assert_eq!(digest.hash.len(), 64); // BLAKE3 hex digest
//! ```

use aether_core::element::{Element, Shape};
use aether_core::status::AuraKind;
use serde::{Deserialize, Serialize};

use crate::world::EnergyWorld;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldDigest {
    pub tick: u64,
    /// 64 lowercase hex characters.
    pub hash: String,
}

#[derive(Serialize)]
struct LedgerEntry {
    id: u64,
    energy: u64,
    owner: Option<u64>,
}

#[derive(Serialize)]
struct ManifestationEntry {
    id: u64,
    element: Element,
    shape: Shape,
}

#[derive(Serialize)]
struct UnitEntry {
    id: u64,
    team: u32,
    health: u64,
    barrier: u64,
}

#[derive(Serialize)]
struct AuraEntry {
    id: u64,
    kind: AuraKind,
    target: u64,
}

#[derive(Serialize)]
struct HashableState {
    tick: u64,
    ledgers: Vec<LedgerEntry>,
    manifestations: Vec<ManifestationEntry>,
    units: Vec<UnitEntry>,
    auras: Vec<AuraEntry>,
}

impl WorldDigest {
    pub fn capture(world: &EnergyWorld, tick: u64) -> Self {
        // Every table is keyed by a BTreeMap, so iteration is already sorted.
        let ledgers = world
            .ledgers()
            .ids()
            .into_iter()
            .map(|id| LedgerEntry {
                id: id.to_raw(),
                energy: world.ledgers().energy(id),
                owner: world.ledgers().owner(id).map(|o| o.to_raw()),
            })
            .collect();
        let manifestations = world
            .manifestations
            .iter()
            .map(|(id, m)| ManifestationEntry {
                id: id.to_raw(),
                element: m.element(),
                shape: m.shape(),
            })
            .collect();
        let units = world
            .units
            .iter()
            .map(|(id, u)| UnitEntry {
                id: id.to_raw(),
                team: u.team(),
                health: u.health(),
                barrier: u.barrier(),
            })
            .collect();
        let auras = world
            .auras
            .iter()
            .map(|(id, a)| AuraEntry {
                id: id.to_raw(),
                kind: a.kind(),
                target: a.target().to_raw(),
            })
            .collect();

        let state = HashableState {
            tick,
            ledgers,
            manifestations,
            units,
            auras,
        };
        let json_bytes = serde_json::to_vec(&state).expect("digest state should always be JSON-serializable");
        Self {
            tick,
            hash: blake3::hash(&json_bytes).to_hex().to_string(),
        }
    }
}

impl std::fmt::Display for WorldDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", &self.hash[..16.min(self.hash.len())], self.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::physics::Vec3;
    use aether_core::element::EnergyRegistry;

    fn world() -> EnergyWorld {
        EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default().weightless())
    }

    #[test]
    fn digest_tracks_energy() {
        let mut w = world();
        let unit = w.spawn_unit(0, Vec3::zeros(), 100, 100);
        let before = WorldDigest::capture(&w, 0);
        w.credit(unit, 1);
        assert_ne!(before, WorldDigest::capture(&w, 0));
    }

    #[test]
    fn digest_ignores_pending_element() {
        let mut w = world();
        let orb = w.spawn_manifestation(Element::Fire, Shape::Sphere, 100, Vec3::zeros(), Vec3::zeros(), None);
        let before = WorldDigest::capture(&w, 0);
        w.change_element_later(orb, Element::Water);
        assert_eq!(before, WorldDigest::capture(&w, 0));
        w.commit_frame();
        assert_ne!(before, WorldDigest::capture(&w, 0));
    }

    #[test]
    fn digest_includes_tick() {
        let w = world();
        assert_ne!(WorldDigest::capture(&w, 1), WorldDigest::capture(&w, 2));
    }

    #[test]
    fn display_is_short_hash_and_tick() {
        let digest = WorldDigest::capture(&world(), 7);
        let text = digest.to_string();
        assert!(text.ends_with("@7"));
        assert_eq!(text.len(), 18);
    }
}
