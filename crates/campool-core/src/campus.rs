//! Built-in campus fixtures.
//!
//! Two scenarios share the same 12-hotspot campus:
//!
//! - `evening_rush`: 12 riders from three halls, 3 drivers, three pools
//!   (red, blue, green). One Agira Hall rider overflows into the Prithvi
//!   Hall pool, giving that trip a second pickup.
//! - `single_pool`: 4 riders from Amritam Hall and the PG Hostel heading to
//!   C Block with one driver and a multi-stop route.
//!
//! Corridors reproduce the road-like waypoints between stops.

use campool_types::{DriverId, Hotspot, HotspotId, PoolId, Position, RiderId};

use crate::fixture::{Corridor, DriverSeed, Fixture, FixtureError, PaletteEntry, RiderSeed};

/// Name of the three-pool scenario.
pub const EVENING_RUSH: &str = "evening_rush";

/// Name of the single multi-stop pool scenario.
pub const SINGLE_POOL: &str = "single_pool";

/// Names of every built-in fixture.
pub const BUILTIN_FIXTURES: [&str; 2] = [EVENING_RUSH, SINGLE_POOL];

/// Look up a built-in fixture by name.
///
/// # Errors
///
/// Returns [`FixtureError::UnknownBuiltin`] for an unrecognized name.
pub fn builtin(name: &str) -> Result<Fixture, FixtureError> {
    match name {
        EVENING_RUSH => Ok(evening_rush()),
        SINGLE_POOL => Ok(single_pool()),
        other => Err(FixtureError::UnknownBuiltin {
            name: other.to_owned(),
        }),
    }
}

fn hotspot(id: &str, name: &str, lat: f64, lng: f64) -> Hotspot {
    Hotspot {
        id: HotspotId::from(id),
        name: name.to_owned(),
        position: Position::new(lat, lng),
    }
}

fn rider(id: &str, name: &str, roll: &str, hostel: &str, pickup: &str, drop: &str) -> RiderSeed {
    RiderSeed {
        id: RiderId::from(id),
        name: name.to_owned(),
        roll: roll.to_owned(),
        hostel: hostel.to_owned(),
        pickup: HotspotId::from(pickup),
        drop: HotspotId::from(drop),
    }
}

fn driver(id: &str, name: &str, plate: &str, lat: f64, lng: f64) -> DriverSeed {
    DriverSeed {
        id: DriverId::from(id),
        name: name.to_owned(),
        plate: plate.to_owned(),
        position: Position::new(lat, lng),
    }
}

fn pool_entry(id: &str, color: &str, code: &str) -> PaletteEntry {
    PaletteEntry {
        id: PoolId::from(id),
        color: color.to_owned(),
        code: Some(code.to_owned()),
    }
}

fn corridor(from: &str, to: &str, via: &[(f64, f64)]) -> Corridor {
    Corridor {
        from: from.to_owned(),
        to: HotspotId::from(to),
        via: via
            .iter()
            .map(|&(lat, lng)| Position::new(lat, lng))
            .collect(),
    }
}

/// The campus hotspots shared by every built-in fixture.
pub fn campus_hotspots() -> Vec<Hotspot> {
    vec![
        hotspot("agira-hall", "Agira Hall", 30.351_606, 76.364_327),
        hotspot("prithvi-hall", "Prithvi Hall", 30.351_227, 76.360_978),
        hotspot("neeram-hall", "Neeram Hall", 30.351_148, 76.359_893),
        hotspot("e-block", "E Block", 30.353_463, 76.372_207),
        hotspot("auditorium", "Auditorium", 30.351_968, 76.370_679),
        hotspot("tan", "TAN Block", 30.353_546, 76.368_576),
        hotspot("amritam-hall", "Amritam Hall", 30.3545, 76.3640),
        hotspot("vyom-hall", "Vyom Hall", 30.3560, 76.3650),
        hotspot("c-block-old", "C Block", 30.3555, 76.3665),
        hotspot("c-block", "C Block", 30.3555, 76.3665),
        hotspot("venture-lab", "Venture Lab", 30.3565, 76.3670),
        hotspot("pg-hostel", "PG Hostel", 30.3553, 76.3719),
    ]
}

/// Three halls, three pools, three drivers.
#[allow(clippy::too_many_lines)]
pub fn evening_rush() -> Fixture {
    let riders = vec![
        rider("s1", "Ishaan Sharma", "102303795", "AGIRA", "agira-hall", "e-block"),
        rider("s2", "Aarav Gupta", "102304001", "AGIRA", "agira-hall", "e-block"),
        rider("s3", "Mehak Arora", "102304002", "AGIRA", "agira-hall", "e-block"),
        rider("s4", "Abhishek Kansal", "102304003", "AGIRA", "agira-hall", "e-block"),
        rider("s5", "Sunita Jogpal", "102304004", "AGIRA", "agira-hall", "auditorium"),
        rider("s6", "Riya Verma", "102304101", "PRITHVI", "prithvi-hall", "auditorium"),
        rider("s7", "Kabir Malhotra", "102304102", "PRITHVI", "prithvi-hall", "auditorium"),
        rider("s8", "Ananya Nanda", "102304103", "PRITHVI", "prithvi-hall", "auditorium"),
        rider("s9", "Arjun Saini", "102304201", "NEERAM", "neeram-hall", "tan"),
        rider("s10", "Priya Gill", "102304202", "NEERAM", "neeram-hall", "tan"),
        rider("s11", "Harsh Vardhan", "102304203", "NEERAM", "neeram-hall", "tan"),
        rider("s12", "Neha Bansal", "102304204", "NEERAM", "neeram-hall", "tan"),
    ];

    let drivers = vec![
        driver("d1", "Sukhdev", "PB11-AC-4411", 30.3509, 76.3628),
        driver("d2", "Rakesh", "PB11-ER-3321", 30.3522, 76.3588),
        driver("d3", "Gopal", "PB11-BR-9910", 30.3523, 76.3668),
    ];

    let palette = vec![
        pool_entry("pool-red", "#ef4444", "111222"),
        pool_entry("pool-blue", "#3b82f6", "333444"),
        pool_entry("pool-green", "#22c55e", "555666"),
    ];

    let corridors = vec![
        // Red: Sukhdev to Agira Hall, then on to E Block.
        corridor("d1", "agira-hall", &[(30.3512, 76.3634), (30.3514, 76.3639)]),
        corridor(
            "agira-hall",
            "e-block",
            &[
                (30.3519, 76.3655),
                (30.3525, 76.3668),
                (30.3529, 76.3685),
                (30.3531, 76.3700),
                (30.3533, 76.3710),
            ],
        ),
        // Blue: Rakesh to Prithvi Hall, the Agira overflow, then Auditorium.
        corridor("d2", "prithvi-hall", &[(30.3519, 76.3594), (30.3516, 76.3601)]),
        corridor(
            "prithvi-hall",
            "agira-hall",
            &[(30.351_35, 76.3623), (30.3515, 76.3633)],
        ),
        corridor(
            "agira-hall",
            "auditorium",
            &[
                (30.3517, 76.3653),
                (30.351_85, 76.3668),
                (30.351_95, 76.3682),
                (30.3522, 76.3696),
            ],
        ),
        // Green: Gopal across to Neeram Hall, then back east to TAN.
        corridor(
            "d3",
            "neeram-hall",
            &[(30.3519, 76.3654), (30.3517, 76.3636), (30.3515, 76.3619)],
        ),
        corridor(
            "neeram-hall",
            "tan",
            &[
                (30.3517, 76.3612),
                (30.3520, 76.3628),
                (30.3523, 76.3645),
                (30.3527, 76.3660),
                (30.3531, 76.3673),
            ],
        ),
    ];

    Fixture {
        name: EVENING_RUSH.to_owned(),
        hotspots: campus_hotspots(),
        riders,
        drivers,
        palette,
        corridors,
    }
}

/// One pool of four with pickups at two hostels.
pub fn single_pool() -> Fixture {
    let riders = vec![
        rider("s1", "Ishaan Sharma", "102303795", "AMRITAM", "amritam-hall", "c-block"),
        rider("s2", "Abhishek Kansal", "102309901", "AMRITAM", "amritam-hall", "c-block"),
        rider("s3", "Sunita Jogpal", "102307777", "PG", "pg-hostel", "c-block"),
        rider("s4", "Mehak Arora", "102303801", "PG", "pg-hostel", "c-block"),
    ];

    let drivers = vec![driver("d1", "Raj Kumar", "PB11-ER-4101", 30.3538, 76.3635)];

    let corridors = vec![
        corridor("d1", "amritam-hall", &[(30.3542, 76.3638)]),
        corridor(
            "amritam-hall",
            "pg-hostel",
            &[(30.3552, 76.3653), (30.3559, 76.3672), (30.3568, 76.3695)],
        ),
        corridor("pg-hostel", "c-block", &[(30.3557, 76.3700), (30.3556, 76.3685)]),
    ];

    Fixture {
        name: SINGLE_POOL.to_owned(),
        hotspots: campus_hotspots(),
        riders,
        drivers,
        palette: vec![pool_entry("pool-1", "#14F4C5", "823614")],
        corridors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_fixtures_validate() {
        for name in BUILTIN_FIXTURES {
            let fixture = builtin(name);
            assert!(fixture.is_ok(), "{name} should exist");
            if let Ok(fixture) = fixture {
                assert!(fixture.validate().is_ok(), "{name} should validate");
                assert_eq!(fixture.name, name);
            }
        }
    }

    #[test]
    fn evening_rush_shape() {
        let fixture = evening_rush();
        assert_eq!(fixture.hotspots.len(), 12);
        assert_eq!(fixture.riders.len(), 12);
        assert_eq!(fixture.drivers.len(), 3);
        let codes: Vec<_> = fixture
            .palette
            .iter()
            .filter_map(|p| p.code.as_deref())
            .collect();
        assert_eq!(codes, ["111222", "333444", "555666"]);
    }

    #[test]
    fn single_pool_has_one_driver_and_four_riders() {
        let fixture = single_pool();
        assert_eq!(fixture.riders.len(), 4);
        assert_eq!(fixture.drivers.len(), 1);
        assert_eq!(fixture.palette.len(), 1);
    }

    #[test]
    fn unknown_builtin_is_rejected() {
        assert!(matches!(
            builtin("morning_rush"),
            Err(FixtureError::UnknownBuiltin { .. })
        ));
    }
}
