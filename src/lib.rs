//! Real-time vehicle simulation on rapier3d. Keyboard state drives one of two
//! vehicle designs (motorized hinges or raycast suspension) through a
//! fixed-substep world; poses are mirrored onto visual proxies every frame.

pub mod assets;
pub mod config;
pub mod context;
pub mod control;
pub mod driver;
pub mod error;
pub mod input;
pub mod materials;
pub mod physics;
pub mod sync;
pub mod vehicle;

pub use config::SimConfig;
pub use context::SimulationContext;
pub use error::{SimError, SimResult};
