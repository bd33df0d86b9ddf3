//! Error types for the Campool engine binary.
//!
//! [`EngineError`] wraps every failure mode of a run so `main` can
//! propagate with `?`.

use campool_core::config::ConfigError;
use campool_core::{DispatchError, MotionError};

/// Top-level error for the Campool engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration or fixture loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A lifecycle operation was rejected.
    #[error("dispatch error: {source}")]
    Dispatch {
        /// The underlying dispatch error.
        #[from]
        source: DispatchError,
    },

    /// The motion driver failed.
    #[error("motion error: {source}")]
    Motion {
        /// The underlying motion error.
        #[from]
        source: MotionError,
    },

    /// The motion task panicked or was aborted.
    #[error("motion task failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },

    /// A pool's own verification code was not accepted.
    #[error("verification failed for pool {pool_id}")]
    Verification {
        /// The pool whose code was refused.
        pool_id: String,
    },
}
