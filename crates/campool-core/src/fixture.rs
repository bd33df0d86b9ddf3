//! Fixture model: the reference data a dispatch context is seeded from.
//!
//! A [`Fixture`] bundles the campus hotspots, the riders and drivers that
//! `seed` loads, the palette that names and colors created pools, and the
//! corridors that shape trip routes between stops. Fixtures come from the
//! built-in set in [`crate::campus`] or from a YAML file.
//!
//! Fixtures loaded through [`Fixture::from_file`] or [`Fixture::parse`] are
//! validated. A fixture built in code is not, so the store still checks
//! hotspot references when it groups riders.

use std::collections::BTreeSet;
use std::path::Path;

use campool_types::{DriverId, Hotspot, HotspotId, PoolId, Position, RiderId};
use serde::{Deserialize, Serialize};

/// Errors that can occur when loading or validating a fixture.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// Failed to read the fixture file from disk.
    #[error("failed to read fixture file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse fixture YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// Two entries of the same kind share an id.
    #[error("duplicate {kind} id: {id}")]
    DuplicateId {
        /// Entry kind (`hotspot`, `rider`, `driver`, `pool`).
        kind: &'static str,
        /// The repeated id.
        id: String,
    },

    /// An entry references a hotspot the fixture does not define.
    #[error("{owner} references unknown hotspot {hotspot}")]
    DanglingHotspot {
        /// The referencing entry.
        owner: String,
        /// The unresolved hotspot id.
        hotspot: HotspotId,
    },

    /// A corridor starts at something that is neither a driver nor a hotspot.
    #[error("corridor to {to} starts at unknown endpoint {from}")]
    DanglingCorridor {
        /// The unresolved start endpoint.
        from: String,
        /// The corridor's destination.
        to: HotspotId,
    },

    /// No built-in fixture has the requested name.
    #[error("unknown built-in fixture: {name}")]
    UnknownBuiltin {
        /// The requested name.
        name: String,
    },
}

impl From<serde_yml::Error> for FixtureError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// A rider as loaded by `seed`, before any lifecycle state is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiderSeed {
    /// Rider identifier.
    pub id: RiderId,
    /// Display name.
    pub name: String,
    /// External roll number.
    pub roll: String,
    /// Hostel the rider lives in.
    pub hostel: String,
    /// Requested pickup hotspot.
    pub pickup: HotspotId,
    /// Requested drop hotspot.
    pub drop: HotspotId,
}

/// A driver as loaded by `seed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSeed {
    /// Driver identifier.
    pub id: DriverId,
    /// Display name.
    pub name: String,
    /// Vehicle plate.
    pub plate: String,
    /// Starting position.
    pub position: Position,
}

/// Identity given to the n-th pool created in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    /// Pool id.
    pub id: PoolId,
    /// Color tag applied to the pool and its riders.
    pub color: String,
    /// Fixed verification code. Generated when absent.
    #[serde(default)]
    pub code: Option<String>,
}

/// Shaping waypoints for the leg from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corridor {
    /// Start of the leg: a driver id or a hotspot id.
    pub from: String,
    /// Destination hotspot.
    pub to: HotspotId,
    /// Intermediate points, excluding both endpoints.
    #[serde(default)]
    pub via: Vec<Position>,
}

/// Reference data for one simulation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Fixture name, used in logs.
    pub name: String,
    /// Pickup and drop points.
    pub hotspots: Vec<Hotspot>,
    /// Riders loaded by `seed`, in seed order.
    pub riders: Vec<RiderSeed>,
    /// Drivers loaded by `seed`, in seed order.
    pub drivers: Vec<DriverSeed>,
    /// Pool identities in creation order.
    #[serde(default)]
    pub palette: Vec<PaletteEntry>,
    /// Route-shaping corridors.
    #[serde(default)]
    pub corridors: Vec<Corridor>,
}

impl Fixture {
    /// Load and validate a fixture from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Io`] if the file cannot be read,
    /// [`FixtureError::Yaml`] if it is not a valid fixture, or a validation
    /// error from [`Fixture::validate`].
    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a fixture from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Yaml`] or a validation error.
    pub fn parse(yaml: &str) -> Result<Self, FixtureError> {
        let fixture: Self = serde_yml::from_str(yaml)?;
        fixture.validate()?;
        Ok(fixture)
    }

    /// Check id uniqueness and that every hotspot reference resolves.
    ///
    /// # Errors
    ///
    /// Returns the first [`FixtureError::DuplicateId`],
    /// [`FixtureError::DanglingHotspot`], or
    /// [`FixtureError::DanglingCorridor`] found.
    pub fn validate(&self) -> Result<(), FixtureError> {
        ensure_unique("hotspot", self.hotspots.iter().map(|h| h.id.as_str()))?;
        ensure_unique("rider", self.riders.iter().map(|r| r.id.as_str()))?;
        ensure_unique("driver", self.drivers.iter().map(|d| d.id.as_str()))?;
        ensure_unique("pool", self.palette.iter().map(|p| p.id.as_str()))?;

        for rider in &self.riders {
            for hotspot in [&rider.pickup, &rider.drop] {
                if self.hotspot(hotspot).is_none() {
                    return Err(FixtureError::DanglingHotspot {
                        owner: format!("rider {}", rider.id),
                        hotspot: hotspot.clone(),
                    });
                }
            }
        }

        for corridor in &self.corridors {
            if self.hotspot(&corridor.to).is_none() {
                return Err(FixtureError::DanglingHotspot {
                    owner: format!("corridor from {}", corridor.from),
                    hotspot: corridor.to.clone(),
                });
            }
            let from_known = self.hotspots.iter().any(|h| h.id.as_str() == corridor.from)
                || self.drivers.iter().any(|d| d.id.as_str() == corridor.from);
            if !from_known {
                return Err(FixtureError::DanglingCorridor {
                    from: corridor.from.clone(),
                    to: corridor.to.clone(),
                });
            }
        }
        Ok(())
    }

    /// Look up a hotspot by id.
    pub fn hotspot(&self, id: &HotspotId) -> Option<&Hotspot> {
        self.hotspots.iter().find(|h| h.id == *id)
    }

    /// Via-points for the leg from `from` to `to`, empty when no corridor
    /// is defined.
    pub fn corridor(&self, from: &str, to: &HotspotId) -> &[Position] {
        self.corridors
            .iter()
            .find(|c| c.from == from && c.to == *to)
            .map(|c| c.via.as_slice())
            .unwrap_or_default()
    }
}

fn ensure_unique<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), FixtureError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(FixtureError::DuplicateId {
                kind,
                id: id.to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
name: minimal
hotspots:
  - { id: north, name: North Gate, position: { lat: 30.0, lng: 76.0 } }
  - { id: south, name: South Gate, position: { lat: 30.1, lng: 76.0 } }
riders:
  - { id: r1, name: Asha, roll: '1', hostel: A, pickup: north, drop: south }
drivers:
  - { id: d1, name: Bala, plate: PB-1, position: { lat: 29.9, lng: 76.0 } }
corridors:
  - from: d1
    to: north
    via: [{ lat: 29.95, lng: 76.01 }]
";

    #[test]
    fn parses_minimal_yaml() {
        let fixture = Fixture::parse(MINIMAL).unwrap();
        assert_eq!(fixture.name, "minimal");
        assert_eq!(fixture.riders.len(), 1);
        assert!(fixture.palette.is_empty());
        assert_eq!(fixture.corridor("d1", &HotspotId::from("north")).len(), 1);
        assert!(fixture.corridor("north", &HotspotId::from("south")).is_empty());
    }

    #[test]
    fn rejects_unknown_rider_hotspot() {
        let yaml = MINIMAL.replace("drop: south", "drop: library");
        let err = Fixture::parse(&yaml).unwrap_err();
        assert!(matches!(
            err,
            FixtureError::DanglingHotspot { ref hotspot, .. } if hotspot.as_str() == "library"
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let yaml = MINIMAL.replace("id: south", "id: north");
        let err = Fixture::parse(&yaml).unwrap_err();
        assert!(matches!(err, FixtureError::DuplicateId { kind: "hotspot", .. }));
    }

    #[test]
    fn rejects_corridor_from_unknown_endpoint() {
        let yaml = MINIMAL.replace("from: d1", "from: d9");
        let err = Fixture::parse(&yaml).unwrap_err();
        assert!(matches!(err, FixtureError::DanglingCorridor { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let err = Fixture::parse("name: [unterminated").unwrap_err();
        assert!(matches!(err, FixtureError::Yaml { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Fixture::from_file(Path::new("/nonexistent/campool-fixture.yaml")).unwrap_err();
        assert!(matches!(err, FixtureError::Io { .. }));
    }
}
