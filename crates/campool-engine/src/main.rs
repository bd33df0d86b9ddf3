//! Campool engine binary.
//!
//! Loads configuration and a campus fixture, then drives one complete
//! pooling run: riders are seeded, grouped, matched with drivers, checked
//! in with their pool codes, and carried along their routes until every
//! trip completes. Ctrl-C stops the motion driver early.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `campool-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Create the dispatch context and load its fixture
//! 4. Seed riders and drivers
//! 5. Form pools and assign drivers
//! 6. Verify every pool's code and start trips
//! 7. Run the motion driver until completion or Ctrl-C
//! 8. Log the result

mod error;

use std::path::Path;
use std::sync::Arc;

use campool_core::config::{CampoolConfig, LogFormat, LoggingConfig};
use campool_core::{Dispatch, MotionControl, MotionOutcome, spawn_motion};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const CONFIG_PATH: &str = "campool-config.yaml";

/// Application entry point for the Campool engine.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, a lifecycle
/// operation is rejected, or the motion driver fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, from_file) = load_config(Path::new(CONFIG_PATH))?;

    // 2. Initialize structured logging. RUST_LOG wins over the config level.
    init_tracing(&config.logging);

    info!(
        name = %config.simulation.name,
        fixture = %config.simulation.fixture,
        from_file,
        "campool-engine starting"
    );

    // 3. Create the dispatch context.
    let dispatch = Arc::new(Dispatch::from_config(&config)?);

    // 4. Seed.
    dispatch.seed()?;

    // 5. Pool and assign.
    let pools = dispatch.create_pools()?;
    let assigned = dispatch.assign_drivers()?;
    info!(pools, assigned, "Pools formed and drivers assigned");

    // 6. Every pool checks in with its own code.
    let snapshot = dispatch.snapshot();
    for pool in snapshot.pools.iter() {
        if !dispatch.verify_otp(&pool.id, &pool.code)? {
            return Err(EngineError::Verification {
                pool_id: pool.id.to_string(),
            });
        }
    }
    dispatch.start_trips()?;

    // 7. Drive trips.
    let control = Arc::new(MotionControl::new());
    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping motion driver");
                control.request_stop();
            }
        });
    }
    let handle = spawn_motion(Arc::clone(&dispatch), control, config.motion.clone());
    let outcome = handle.await??;

    // 8. Log results.
    log_outcome(&dispatch, &outcome);

    info!(
        simulation_id = %dispatch.id(),
        outcome = ?outcome,
        "campool-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `config_path`, falling back to defaults when
/// the file does not exist. Returns whether the file was read.
fn load_config(config_path: &Path) -> Result<(CampoolConfig, bool), EngineError> {
    if config_path.exists() {
        Ok((CampoolConfig::from_file(config_path)?, true))
    } else {
        Ok((CampoolConfig::parse("{}")?, false))
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Log a per-trip summary of the final snapshot.
fn log_outcome(dispatch: &Dispatch, outcome: &MotionOutcome) {
    let snapshot = dispatch.snapshot();
    for trip in snapshot.trips.iter() {
        let riders: Vec<&str> = snapshot
            .pool_members(&trip.pool_id)
            .into_iter()
            .map(|r| r.name.as_str())
            .collect();
        info!(
            trip_id = %trip.id,
            pool_id = %trip.pool_id,
            driver_id = %trip.driver_id,
            riders = ?riders,
            status = ?trip.status,
            progress = trip.progress,
            "Trip summary"
        );
    }
    if let MotionOutcome::Cancelled { ticks, reason } = outcome {
        warn!(ticks, reason = ?reason, phase = ?snapshot.phase, "Run ended early");
    }
}
