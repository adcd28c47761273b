//! Vehicle models: motorized-hinge chassis and raycast-suspension chassis.

pub mod hinge;
pub mod raycast;

use std::fmt;

use rapier3d::prelude::*;
use tracing::warn;

use crate::physics::PhysicsWorld;

pub use hinge::{HingeVehicle, HingeWheel};
pub use raycast::{RaycastInfo, RaycastVehicle, WheelInfo, WheelTelemetry};

/// m/s -> km/h
pub const MS_TO_KMH: Real = 3.6;

/// Chassis-local forward axis shared by both models. Right is -X, up is +Y.
#[inline]
pub fn chassis_forward() -> Vector<Real> {
    vector![0.0, 0.0, 1.0]
}

// ============================================
// Wheel identification
// ============================================

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WheelPosition {
    FL,
    FR,
    RL,
    RR,
}

impl WheelPosition {
    /// Index order used by every per-wheel array and controller setter.
    pub const ALL: [WheelPosition; 4] = [
        WheelPosition::FL,
        WheelPosition::FR,
        WheelPosition::RL,
        WheelPosition::RR,
    ];

    pub fn index(&self) -> usize {
        match self {
            WheelPosition::FL => 0,
            WheelPosition::FR => 1,
            WheelPosition::RL => 2,
            WheelPosition::RR => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelPosition::FL => "FL",
            WheelPosition::FR => "FR",
            WheelPosition::RL => "RL",
            WheelPosition::RR => "RR",
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelPosition::FL | WheelPosition::FR)
    }

    pub fn is_rear(&self) -> bool {
        matches!(self, WheelPosition::RL | WheelPosition::RR)
    }
}

impl fmt::Display for WheelPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The vehicle the simulation drives, one of the two designs.
pub enum VehicleModel {
    Hinge(HingeVehicle),
    Raycast(RaycastVehicle),
}

impl VehicleModel {
    pub fn chassis(&self) -> RigidBodyHandle {
        match self {
            VehicleModel::Hinge(v) => v.chassis,
            VehicleModel::Raycast(v) => v.chassis,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VehicleModel::Hinge(_) => "hinge",
            VehicleModel::Raycast(_) => "raycast",
        }
    }

    /// Runs before every physics substep.
    pub fn pre_step(&mut self, world: &mut PhysicsWorld, dt: Real) {
        if let VehicleModel::Raycast(v) = self {
            if let Err(err) = v.update_vehicle(world, dt) {
                warn!(%err, "raycast vehicle update skipped");
            }
        }
    }

    /// Signed chassis speed along its forward axis, km/h.
    pub fn speed_kmh(&self, world: &PhysicsWorld) -> Real {
        match self {
            VehicleModel::Raycast(v) => v.current_speed_kmh(),
            VehicleModel::Hinge(v) => world
                .body(v.chassis)
                .map(|body| {
                    let forward = body.rotation() * chassis_forward();
                    body.linvel().dot(&forward) * MS_TO_KMH
                })
                .unwrap_or(0.0),
        }
    }

    pub fn wheel_telemetry(&self) -> Vec<WheelTelemetry> {
        match self {
            VehicleModel::Raycast(v) => v.telemetry(),
            VehicleModel::Hinge(_) => Vec::new(),
        }
    }
}
