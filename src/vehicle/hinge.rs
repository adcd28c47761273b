// ==============================================================================
// hinge.rs — CHASSIS + FOUR BALL WHEELS ON REVOLUTE JOINTS
// ------------------------------------------------------------------------------
// Each wheel is its own dynamic body pinned to the chassis by a revolute joint
// (anchor = chassis-local pivot, axis = chassis-local (1, 0, skew)).
// - rear joints carry a velocity motor: drive = motor target speed
// - steered joints get their axis z-component replaced by the skew each tick
// Positive skew tilts the rolling axis so the car turns right.
// ==============================================================================

use rapier3d::prelude::*;

use crate::config::{DEFAULT_MATERIAL, HingeVehicleConfig, SteeredAxles, WHEEL_MATERIAL};
use crate::control::HingeCommand;
use crate::error::{SimError, SimResult};
use crate::physics::{BodyDesc, BodyShape, GROUP_GROUND, GROUP_PROP, GROUP_VEHICLE, PhysicsWorld};
use crate::vehicle::WheelPosition;

#[derive(Debug, Clone)]
pub struct HingeWheel {
    pub position: WheelPosition,
    pub body: RigidBodyHandle,
    pub joint: ImpulseJointHandle,
    pub radius: Real,
    pub motorized: bool,
    pub steered: bool,
}

pub struct HingeVehicle {
    pub chassis: RigidBodyHandle,
    pub wheels: Vec<HingeWheel>,
    base_axis: Vector<Real>,
    motor_factor: Real,
}

/// Rolling axis with its lateral (z) component replaced by `skew`.
pub fn skewed_axis(base: &Vector<Real>, skew: Real) -> UnitVector<Real> {
    UnitVector::new_normalize(vector![base.x, base.y, skew])
}

impl HingeVehicle {
    /// Spawns the chassis at `spawn_height` above the origin and hangs the
    /// four wheels off it. `half_extents` is the chassis collision box.
    pub fn build(
        world: &mut PhysicsWorld,
        config: &HingeVehicleConfig,
        half_extents: [f32; 3],
    ) -> SimResult<Self> {
        let chassis_material = world.hooks.table.id(DEFAULT_MATERIAL)?;
        let wheel_material = world.hooks.table.id(WHEEL_MATERIAL)?;
        let groups = InteractionGroups::new(GROUP_VEHICLE, GROUP_GROUND | GROUP_PROP);

        let origin = vector![0.0, config.spawn_height, 0.0];
        let chassis = world.add_body(
            &BodyDesc::dynamic(
                BodyShape::Cuboid { half_extents },
                config.chassis_mass,
                origin,
                chassis_material,
            )
            .groups(groups)
            .can_sleep(false),
        );

        let [ax, ay, az] = config.axis;
        let base_axis = vector![ax, ay, az];
        if base_axis.norm() <= f32::EPSILON {
            return Err(SimError::InvalidConfig("hinge axis must be non-zero".into()));
        }

        let mut wheels = Vec::with_capacity(4);
        for position in WheelPosition::ALL {
            let [px, py, pz] = config.pivots[position.index()];
            let pivot = vector![px, py, pz];
            let radius = if position.is_front() { config.front_radius } else { config.rear_radius };

            let body = world.add_body(
                &BodyDesc::dynamic(
                    BodyShape::Ball { radius },
                    config.wheel_mass,
                    origin + pivot,
                    wheel_material,
                )
                .groups(groups)
                .can_sleep(false),
            );

            let motorized = position.is_rear();
            let steered = match config.steered_axles {
                SteeredAxles::Front => position.is_front(),
                SteeredAxles::FrontAndRear => true,
            };

            let mut builder = RevoluteJointBuilder::new(UnitVector::new_normalize(base_axis))
                .local_anchor1(point![px, py, pz])
                .local_anchor2(point![0.0, 0.0, 0.0])
                .contacts_enabled(false);
            if motorized {
                builder = builder
                    .motor_velocity(0.0, config.motor_factor)
                    .motor_max_force(config.motor_max_force);
            }
            let joint = world.joints.insert(chassis, body, builder.build(), true);

            wheels.push(HingeWheel {
                position,
                body,
                joint,
                radius,
                motorized,
                steered,
            });
        }

        Ok(Self {
            chassis,
            wheels,
            base_axis,
            motor_factor: config.motor_factor,
        })
    }

    /// Pushes the tick's command into the joints: motor target speed on
    /// motorized hinges, axis skew on steered ones. Joint edits do not wake
    /// bodies, so the chassis and wheels are woken here.
    pub fn apply(&self, world: &mut PhysicsWorld, command: &HingeCommand) -> SimResult<()> {
        let axis = skewed_axis(&self.base_axis, command.axis_skew);

        for wheel in &self.wheels {
            let joint = world.joints.get_mut(wheel.joint).ok_or(SimError::MissingBody)?;

            if wheel.motorized {
                if let Some(revolute) = joint.data.as_revolute_mut() {
                    revolute.set_motor_velocity(command.motor_speed, self.motor_factor);
                }
            }
            if wheel.steered {
                joint.data.set_local_axis1(axis);
            }
        }

        world.body_mut(self.chassis)?.wake_up(true);
        for wheel in &self.wheels {
            world.body_mut(wheel.body)?.wake_up(true);
        }
        Ok(())
    }

    /// Current chassis-local rolling axis of one wheel's hinge.
    pub fn wheel_axis(&self, world: &PhysicsWorld, position: WheelPosition) -> SimResult<UnitVector<Real>> {
        let wheel = self
            .wheels
            .get(position.index())
            .ok_or(SimError::WheelIndex { index: position.index(), count: self.wheels.len() })?;
        world
            .joints
            .get(wheel.joint)
            .map(|joint| joint.data.local_axis1())
            .ok_or(SimError::MissingBody)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MaterialsConfig, WorldConfig};
    use approx::assert_relative_eq;

    fn spawn() -> (PhysicsWorld, HingeVehicle) {
        let mut world =
            PhysicsWorld::from_config(&WorldConfig::default(), &MaterialsConfig::default()).unwrap();
        let vehicle =
            HingeVehicle::build(&mut world, &HingeVehicleConfig::default(), [0.9, 0.5, 2.2]).unwrap();
        (world, vehicle)
    }

    #[test]
    fn test_build_creates_bodies_and_joints() {
        let (world, vehicle) = spawn();
        assert_eq!(vehicle.wheels.len(), 4);
        assert_eq!(world.joints.len(), 4);
        // ground + chassis + 4 wheels
        assert_eq!(world.bodies.len(), 6);

        let rear: Vec<_> = vehicle.wheels.iter().filter(|w| w.motorized).collect();
        assert_eq!(rear.len(), 2);
        assert!(rear.iter().all(|w| w.position.is_rear()));
        assert_relative_eq!(vehicle.wheels[0].radius, 0.334);
        assert_relative_eq!(vehicle.wheels[3].radius, 0.35);
    }

    #[test]
    fn test_wheels_start_at_pivots() {
        let (world, vehicle) = spawn();
        let chassis = *world.body(vehicle.chassis).unwrap().translation();
        let fl = *world.body(vehicle.wheels[0].body).unwrap().translation();
        assert_relative_eq!(fl - chassis, vector![0.833, -1.0, 1.19133], epsilon = 1e-5);
    }

    #[test]
    fn test_apply_skews_front_axes_only() {
        let (mut world, vehicle) = spawn();
        vehicle
            .apply(&mut world, &HingeCommand { motor_speed: 2.0, axis_skew: 0.3 })
            .unwrap();

        let expected = skewed_axis(&vector![1.0, 0.0, 0.0], 0.3);
        let fl = vehicle.wheel_axis(&world, WheelPosition::FL).unwrap();
        assert_relative_eq!(fl.into_inner(), expected.into_inner(), epsilon = 1e-6);

        let rl = vehicle.wheel_axis(&world, WheelPosition::RL).unwrap();
        assert_relative_eq!(rl.into_inner(), vector![1.0, 0.0, 0.0], epsilon = 1e-6);
    }

    #[test]
    fn test_front_and_rear_steering() {
        let mut world =
            PhysicsWorld::from_config(&WorldConfig::default(), &MaterialsConfig::default()).unwrap();
        let config = HingeVehicleConfig {
            steered_axles: SteeredAxles::FrontAndRear,
            ..HingeVehicleConfig::default()
        };
        let vehicle = HingeVehicle::build(&mut world, &config, [0.9, 0.5, 2.2]).unwrap();
        vehicle
            .apply(&mut world, &HingeCommand { motor_speed: 0.0, axis_skew: -0.2 })
            .unwrap();
        let rr = vehicle.wheel_axis(&world, WheelPosition::RR).unwrap();
        assert!(rr.z < 0.0);
    }

    fn relative_spin(world: &PhysicsWorld, vehicle: &HingeVehicle, position: WheelPosition) -> Real {
        let chassis = world.body(vehicle.chassis).unwrap();
        let wheel = world.body(vehicle.wheels[position.index()].body).unwrap();
        let axis = chassis.rotation() * vehicle.wheel_axis(world, position).unwrap().into_inner();
        (wheel.angvel() - chassis.angvel()).dot(&axis)
    }

    #[test]
    fn test_rear_motors_track_target_speed() {
        let (mut world, vehicle) = spawn();
        for _ in 0..120 {
            world.step(1.0 / 60.0, 1.0 / 60.0, 3);
        }
        let command = HingeCommand { motor_speed: 6.0, axis_skew: 0.0 };
        for _ in 0..90 {
            vehicle.apply(&mut world, &command).unwrap();
            world.step(1.0 / 60.0, 1.0 / 60.0, 3);
        }
        for position in [WheelPosition::RL, WheelPosition::RR] {
            let spin = relative_spin(&world, &vehicle, position);
            assert_relative_eq!(spin, 6.0, max_relative = 0.15);
        }
        let chassis = world.body(vehicle.chassis).unwrap();
        assert!(chassis.linvel().z > 1.0);
    }

    #[test]
    fn test_vehicle_bodies_never_sleep() {
        let (mut world, vehicle) = spawn();
        let idle = HingeCommand { motor_speed: 0.0, axis_skew: 0.0 };
        for _ in 0..300 {
            vehicle.apply(&mut world, &idle).unwrap();
            world.step(1.0 / 60.0, 1.0 / 60.0, 3);
        }
        let mut bodies = vec![vehicle.chassis];
        bodies.extend(vehicle.wheels.iter().map(|w| w.body));
        for handle in &bodies {
            assert!(!world.body(*handle).unwrap().is_sleeping());
        }

        // a parked car still responds to throttle
        let start_z = world.body(vehicle.chassis).unwrap().translation().z;
        let drive = HingeCommand { motor_speed: 8.0, axis_skew: 0.0 };
        for _ in 0..120 {
            vehicle.apply(&mut world, &drive).unwrap();
            world.step(1.0 / 60.0, 1.0 / 60.0, 3);
        }
        assert!(world.body(vehicle.chassis).unwrap().translation().z > start_z + 1.0);
    }

    #[test]
    fn test_car_settles_on_ground() {
        let (mut world, vehicle) = spawn();
        for _ in 0..240 {
            world.step(1.0 / 60.0, 1.0 / 60.0, 3);
        }
        let chassis = world.body(vehicle.chassis).unwrap();
        assert!(chassis.translation().y > 0.0);
        assert!(chassis.translation().y < 4.0);
        assert!(chassis.linvel().y.abs() < 1.0);
    }
}
