//! Error types for simulation setup and control application.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building or driving the simulation.
///
/// Setup paths return these eagerly. The per-tick path never propagates them
/// out of the frame loop; it logs and keeps running.
#[derive(Debug, Error)]
pub enum SimError {
    /// An asset loader reported a failure.
    #[error("Failed to load asset '{asset}': {reason}")]
    AssetLoad {
        /// Asset identifier handed to the loader.
        asset: String,
        /// Loader-provided reason.
        reason: String,
    },

    /// The readiness barrier did not complete in time.
    #[error("Assets not ready after {timeout_ms} ms (pending: {pending:?})")]
    AssetTimeout {
        /// Configured bound.
        timeout_ms: u64,
        /// Assets that were still outstanding.
        pending: Vec<String>,
    },

    /// The loader has no asset under this identifier.
    #[error("Unknown asset '{0}'")]
    UnknownAsset(String),

    /// A named child part was not found in a loaded scene.
    #[error("Asset '{asset}' has no part named '{part}'")]
    MissingPart {
        /// Scene that was searched.
        asset: String,
        /// Part name that was expected.
        part: String,
    },

    /// Material or contact-material coefficients are out of range.
    #[error("Invalid material '{name}': {reason}")]
    InvalidMaterial {
        /// Material (or pair) name.
        name: String,
        /// What was wrong.
        reason: String,
    },

    /// A configuration value is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A per-wheel setter addressed a wheel that does not exist.
    #[error("Wheel index {index} out of range (vehicle has {count} wheels)")]
    WheelIndex {
        /// Requested index.
        index: usize,
        /// Number of wheels on the vehicle.
        count: usize,
    },

    /// A body handle no longer resolves in the physics world.
    #[error("Rigid body is not present in the physics world")]
    MissingBody,

    /// Reading the configuration file failed.
    #[error("Failed to read config {path}: {source}")]
    ConfigIo {
        /// The path that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::config::SimConfig`].
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type for simulation operations.
pub type SimResult<T> = std::result::Result<T, SimError>;
