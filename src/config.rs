// src/config.rs

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::control::{HingeControlTuning, RaycastControlTuning};
use crate::error::{SimError, SimResult};
use crate::materials::{ContactMaterialPair, Material};

pub const GROUND_MATERIAL: &str = "ground";
pub const WHEEL_MATERIAL: &str = "wheel";
pub const DEFAULT_MATERIAL: &str = "default";

/// Which vehicle model the context builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VehicleVariant {
    /// Chassis + four wheel bodies on motorized hinges.
    #[default]
    Hinge,
    /// Chassis + raycast suspension controller.
    Raycast,
}

/// Axles whose hinge axis is skewed to steer (hinge variant only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SteeredAxles {
    #[default]
    Front,
    FrontAndRear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: [f32; 3],          // m/s^2
    pub fixed_substep: f32,         // s
    pub max_substeps: usize,        // per frame
    pub default_friction: f32,      // used when no contact pair matches
    pub default_restitution: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.82, 0.0],
            fixed_substep: 1.0 / 60.0,
            max_substeps: 3,
            default_friction: 0.3,
            default_restitution: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub interval_ms: u64, // display refresh stand-in (~60 Hz)
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { interval_ms: 16 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Scene whose bounding box becomes the chassis collision box. The box
    /// size is read as full extents (half extents = size / 2), so a model
    /// exported for a physics layer that took size as half extents gets a
    /// box half as large on each axis here.
    pub chassis_asset: String,
    pub front_left_asset: Option<String>, // separately modelled wheel, if any
    /// Wheel parts in FL, FR, RL, RR order.
    pub wheel_parts: [String; 4],
    pub timeout_ms: u64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            chassis_asset: "prova".to_string(),
            front_left_asset: Some("flwheel".to_string()),
            wheel_parts: [
                "tire_03".to_string(),
                "tire_04".to_string(),
                "tire_01".to_string(),
                "tire_02".to_string(),
            ],
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HingeVehicleConfig {
    pub chassis_mass: f32,          // kg
    pub spawn_height: f32,          // m
    pub wheel_mass: f32,            // kg
    pub front_radius: f32,          // m
    pub rear_radius: f32,           // m
    /// Hinge pivots in chassis-local space, FL, FR, RL, RR.
    pub pivots: [[f32; 3]; 4],
    pub axis: [f32; 3],             // chassis-local rolling axis
    pub motor_max_force: f32,       // N
    /// Velocity motor gain. Large enough that the rear hinges reach the
    /// target speed within a few substeps; `motor_max_force` caps the torque.
    pub motor_factor: f32,
    pub steered_axles: SteeredAxles,
}

impl Default for HingeVehicleConfig {
    fn default() -> Self {
        Self {
            chassis_mass: 50.0,
            spawn_height: 4.0,
            wheel_mass: 5.0,
            front_radius: 0.334,
            rear_radius: 0.35,
            pivots: [
                [0.833, -1.0, 1.19133],
                [-0.833, -1.0, 1.19133],
                [0.8257, -1.0, -1.41825],
                [-0.8257, -1.0, -1.41825],
            ],
            axis: [1.0, 0.0, 0.0],
            motor_max_force: 200.0,
            motor_factor: 100.0,
            steered_axles: SteeredAxles::Front,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaycastVehicleConfig {
    pub chassis_mass: f32,              // kg
    pub spawn_height: f32,              // m
    /// Suspension hard points in chassis-local space, FL, FR, RL, RR.
    pub connection_points: [[f32; 3]; 4],
    pub direction: [f32; 3],            // suspension direction (down)
    pub axle: [f32; 3],                 // wheel spin axis
    pub radius: f32,                    // m
    pub suspension_stiffness: f32,      // per unit chassis mass
    pub suspension_rest_length: f32,    // m
    pub damping_compression: f32,
    pub damping_relaxation: f32,
    pub friction_slip: f32,
    pub side_friction_stiffness: f32,
    pub roll_influence: f32,            // 0 = no roll from side forces
    pub max_suspension_travel: f32,     // m
    pub max_suspension_force: f32,      // N
}

impl Default for RaycastVehicleConfig {
    fn default() -> Self {
        Self {
            chassis_mass: 150.0,
            spawn_height: 4.0,
            connection_points: [
                [0.85, 0.0, 1.2],
                [-0.85, 0.0, 1.2],
                [0.85, 0.0, -1.2],
                [-0.85, 0.0, -1.2],
            ],
            direction: [0.0, -1.0, 0.0],
            axle: [1.0, 0.0, 0.0],
            radius: 0.5,
            suspension_stiffness: 30.0,
            suspension_rest_length: 0.3,
            damping_compression: 4.4,
            damping_relaxation: 2.3,
            friction_slip: 1.4,
            side_friction_stiffness: 1.0,
            roll_influence: 0.01,
            max_suspension_travel: 0.3,
            max_suspension_force: 100_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialsConfig {
    pub materials: Vec<Material>,
    pub contacts: Vec<ContactMaterialPair>,
}

impl Default for MaterialsConfig {
    fn default() -> Self {
        Self {
            materials: vec![
                Material::new(DEFAULT_MATERIAL, None, None),
                Material::new(GROUND_MATERIAL, None, Some(0.0)),
                Material::new(WHEEL_MATERIAL, None, Some(0.4)),
            ],
            contacts: vec![ContactMaterialPair {
                a: GROUND_MATERIAL.to_string(),
                b: WHEEL_MATERIAL.to_string(),
                friction: 0.3,
                restitution: 0.0,
                stiffness: 1.0e7,
            }],
        }
    }
}

/// Top-level simulation configuration.
///
/// Every field defaults to the tuning the simulation was designed around, so
/// a config file only needs to list overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SimConfig {
    pub variant: VehicleVariant,
    pub world: WorldConfig,
    pub frame: FrameConfig,
    pub assets: AssetConfig,
    pub hinge: HingeVehicleConfig,
    pub raycast: RaycastVehicleConfig,
    pub materials: MaterialsConfig,
    pub hinge_control: HingeControlTuning,
    pub raycast_control: RaycastControlTuning,
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SimError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Rejects values the world or vehicles cannot be built from.
    pub fn validate(&self) -> SimResult<()> {
        let w = &self.world;
        if !(w.fixed_substep > 0.0 && w.fixed_substep.is_finite()) {
            return Err(SimError::InvalidConfig(format!(
                "fixed_substep must be > 0 (got {})",
                w.fixed_substep
            )));
        }
        if w.max_substeps == 0 {
            return Err(SimError::InvalidConfig("max_substeps must be >= 1".into()));
        }

        let h = &self.hinge;
        if !(h.chassis_mass >= 0.0 && h.wheel_mass >= 0.0) {
            return Err(SimError::InvalidConfig("hinge masses must be >= 0".into()));
        }
        if !(h.front_radius > 0.0 && h.rear_radius > 0.0) {
            return Err(SimError::InvalidConfig("hinge wheel radii must be > 0".into()));
        }
        if !(h.motor_factor > 0.0 && h.motor_max_force >= 0.0) {
            return Err(SimError::InvalidConfig(
                "hinge motor_factor must be > 0 and motor_max_force >= 0".into(),
            ));
        }
        if h.axis.iter().all(|c| *c == 0.0) {
            return Err(SimError::InvalidConfig("hinge axis must be non-zero".into()));
        }

        let r = &self.raycast;
        if !(r.radius > 0.0 && r.suspension_rest_length >= 0.0 && r.max_suspension_travel >= 0.0) {
            return Err(SimError::InvalidConfig(
                "raycast radius must be > 0 and suspension lengths >= 0".into(),
            ));
        }
        if r.direction.iter().all(|c| *c == 0.0) || r.axle.iter().all(|c| *c == 0.0) {
            return Err(SimError::InvalidConfig(
                "raycast direction and axle must be non-zero".into(),
            ));
        }

        for pair in &self.materials.contacts {
            pair.validate()?;
        }
        Ok(())
    }
}
