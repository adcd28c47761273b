// ==============================================================================
// context.rs — ONE OWNED SIMULATION: WORLD + VEHICLE + CONTROL + INPUT + PROXIES
// ------------------------------------------------------------------------------
// Built once the assets are ready. A tick is:
//   1) step the world (vehicle pre-step on every substep)
//   2) read held keys, run the control law, push its command to the vehicle
//   3) copy simulated poses onto the visual proxies
// Nothing in a tick returns an error; failures are logged and the loop goes on.
// ==============================================================================

use rapier3d::prelude::*;
use tracing::{info, warn};

use crate::assets::LoadedAssets;
use crate::config::{DEFAULT_MATERIAL, SimConfig, VehicleVariant};
use crate::control::{ControlLaw, HingeControl, RaycastControl};
use crate::error::{SimError, SimResult};
use crate::input::{InputTracker, KeyEvent};
use crate::physics::{BodyDesc, BodyShape, GROUP_PROP, PhysicsWorld};
use crate::sync::{FrameSnapshot, ProxySet, ProxySnapshot, ProxySource};
use crate::vehicle::{HingeVehicle, RaycastVehicle, VehicleModel, WheelPosition};

const PROP_MASS: Real = 1.0;

pub struct SimulationContext {
    pub config: SimConfig,
    pub world: PhysicsWorld,
    pub vehicle: VehicleModel,
    pub control: ControlLaw,
    pub input: InputTracker,
    pub proxies: ProxySet,
    props: Vec<RigidBodyHandle>,
    spawned: u64,
    tick: u64,
}

impl SimulationContext {
    pub fn build(config: SimConfig, assets: &LoadedAssets) -> SimResult<Self> {
        config.validate()?;

        let chassis_scene = assets.get(&config.assets.chassis_asset)?;
        let half_extents = chassis_scene.half_extents();
        if half_extents.iter().any(|h| !(*h > 0.0)) {
            return Err(SimError::InvalidConfig(format!(
                "asset '{}' has a degenerate bounding box {:?}",
                chassis_scene.name, chassis_scene.size
            )));
        }

        // Resolve every wheel proxy name up front so a missing part fails here.
        let mut wheel_names = Vec::with_capacity(4);
        for position in WheelPosition::ALL {
            let name = match (&config.assets.front_left_asset, position) {
                (Some(asset), WheelPosition::FL) => assets.get(asset)?.name.clone(),
                _ => {
                    let part = &config.assets.wheel_parts[position.index()];
                    chassis_scene.part(part)?.name.clone()
                }
            };
            wheel_names.push(name);
        }

        let mut world = PhysicsWorld::from_config(&config.world, &config.materials)?;
        let mut proxies = ProxySet::new();

        let (vehicle, control) = match config.variant {
            VehicleVariant::Hinge => {
                let hinge = HingeVehicle::build(&mut world, &config.hinge, half_extents)?;
                proxies.add(chassis_scene.name.clone(), ProxySource::Body(hinge.chassis));
                for (wheel, name) in hinge.wheels.iter().zip(&wheel_names) {
                    proxies.add(name.clone(), ProxySource::Body(wheel.body));
                }
                (
                    VehicleModel::Hinge(hinge),
                    ControlLaw::Hinge(HingeControl::new(config.hinge_control)),
                )
            }
            VehicleVariant::Raycast => {
                let raycast = RaycastVehicle::build(&mut world, &config.raycast, half_extents)?;
                proxies.add(chassis_scene.name.clone(), ProxySource::Body(raycast.chassis));
                for (index, name) in wheel_names.iter().enumerate() {
                    proxies.add(name.clone(), ProxySource::RaycastWheel(index));
                }
                (
                    VehicleModel::Raycast(raycast),
                    ControlLaw::Raycast(RaycastControl::new(config.raycast_control)),
                )
            }
        };

        info!(
            variant = vehicle.kind(),
            proxies = proxies.len(),
            bodies = world.bodies.len(),
            "simulation ready"
        );

        let mut context = Self {
            config,
            world,
            vehicle,
            control,
            input: InputTracker::new(),
            proxies,
            props: Vec::new(),
            spawned: 0,
            tick: 0,
        };
        context.proxies.sync(&context.world, &mut context.vehicle);
        Ok(context)
    }

    pub fn handle_key(&mut self, event: &KeyEvent) {
        self.input.apply(event);
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn speed_kmh(&self) -> Real {
        self.vehicle.speed_kmh(&self.world)
    }

    /// Advances the simulation by `elapsed` seconds of wall time.
    pub fn tick(&mut self, elapsed: Real) -> FrameSnapshot {
        let world_cfg = &self.config.world;
        let vehicle = &mut self.vehicle;
        let substeps = self.world.step_with(
            world_cfg.fixed_substep,
            elapsed,
            world_cfg.max_substeps,
            |world, dt| vehicle.pre_step(world, dt),
        );

        self.apply_controls();
        self.proxies.sync(&self.world, &mut self.vehicle);
        self.tick += 1;

        FrameSnapshot {
            tick: self.tick,
            elapsed,
            substeps,
            alpha: self.world.interpolation_alpha(),
            speed_kmh: self.speed_kmh(),
            proxies: self.proxies.iter().map(ProxySnapshot::from).collect(),
            wheels: self.vehicle.wheel_telemetry(),
        }
    }

    fn apply_controls(&mut self) {
        let held = self.input.driver_input();
        let result = match (&mut self.control, &mut self.vehicle) {
            (ControlLaw::Hinge(law), VehicleModel::Hinge(hinge)) => {
                let command = law.update(&held);
                hinge.apply(&mut self.world, &command)
            }
            (ControlLaw::Raycast(law), VehicleModel::Raycast(raycast)) => {
                let command = law.update(&held, raycast.current_speed_kmh());
                raycast.apply(&command)
            }
            _ => Err(SimError::InvalidConfig("control law does not match vehicle".into())),
        };
        if let Err(err) = result {
            warn!(tick = self.tick, %err, "control not applied");
        }
    }

    /// Drops a dynamic sphere into the scene. Returns its proxy name.
    pub fn spawn_sphere(&mut self, radius: Real, position: [f32; 3]) -> SimResult<String> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(SimError::InvalidConfig(format!("sphere radius must be > 0 (got {radius})")));
        }
        let material = self.world.hooks.table.id(DEFAULT_MATERIAL)?;
        let [x, y, z] = position;
        let handle = self.world.add_body(
            &BodyDesc::dynamic(BodyShape::Ball { radius }, PROP_MASS, vector![x, y, z], material)
                .groups(InteractionGroups::new(GROUP_PROP, Group::ALL)),
        );

        let name = format!("sphere_{}", self.spawned);
        self.spawned += 1;
        self.props.push(handle);
        self.proxies.add(name.clone(), ProxySource::Body(handle));
        info!(%name, radius, ?position, "prop spawned");
        Ok(name)
    }

    pub fn prop_count(&self) -> usize {
        self.props.len()
    }

    /// Removes every spawned prop and its proxy. The vehicle stays.
    pub fn reset_props(&mut self) -> usize {
        let mut removed = 0;
        for handle in self.props.drain(..) {
            self.proxies.remove_body(handle);
            match self.world.remove_body(handle) {
                Ok(()) => removed += 1,
                Err(err) => warn!(?handle, %err, "prop already gone"),
            }
        }
        info!(removed, "props reset");
        removed
    }
}
