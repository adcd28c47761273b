// ==============================================================================
// raycast.rs — SINGLE-BODY CHASSIS WITH RAYCAST SUSPENSION
// ------------------------------------------------------------------------------
// Wheels have no bodies. Every substep, per wheel:
//   1) ray from the hard point along the suspension direction
//      length = rest + max_travel + radius
//   2) spring/damper along the contact normal
//      F = (k * (rest - len) - c * v_rel) * chassis_mass, clamped [0, max_force]
//   3) tire impulses at the contact point
//      forward = engine_force * dt (+ brake as a clamped stopping impulse)
//      side    = -v_lat * mass_share * side_stiffness
//      both scaled down together when they exceed friction_slip * F * dt
//   4) wheel spin from the contact-point velocity, coasting (x0.99) in the air
// All impulses are computed from the pre-step state and applied at the end.
// ==============================================================================

use rapier3d::na::{Translation3, UnitQuaternion};
use rapier3d::prelude::*;
use serde::Serialize;

use crate::config::{DEFAULT_MATERIAL, RaycastVehicleConfig};
use crate::control::RaycastCommand;
use crate::error::{SimError, SimResult};
use crate::physics::{BodyDesc, BodyShape, GROUP_GROUND, GROUP_PROP, GROUP_VEHICLE, PhysicsWorld};
use crate::vehicle::{MS_TO_KMH, WheelPosition, chassis_forward};

const SPIN_DAMPING: Real = 0.99; // per substep, airborne wheels

#[inline]
fn vec3(v: [f32; 3]) -> Vector<Real> {
    vector![v[0], v[1], v[2]]
}

/// Result of the last suspension ray of one wheel.
#[derive(Debug, Clone, Copy)]
pub struct RaycastInfo {
    pub in_contact: bool,
    pub contact_point_ws: Point<Real>,
    pub contact_normal_ws: Vector<Real>,
    pub hard_point_ws: Point<Real>,
    pub direction_ws: Vector<Real>,
    pub axle_ws: Vector<Real>,
    pub suspension_length: Real,
    pub ground: Option<ColliderHandle>,
}

impl RaycastInfo {
    fn new(rest_length: Real) -> Self {
        Self {
            in_contact: false,
            contact_point_ws: point![0.0, 0.0, 0.0],
            contact_normal_ws: vector![0.0, 1.0, 0.0],
            hard_point_ws: point![0.0, 0.0, 0.0],
            direction_ws: vector![0.0, -1.0, 0.0],
            axle_ws: vector![1.0, 0.0, 0.0],
            suspension_length: rest_length,
            ground: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WheelInfo {
    pub position: WheelPosition,

    // --- chassis-local geometry ---
    pub connection_point_cs: Point<Real>,
    pub direction_cs: Vector<Real>,
    pub axle_cs: Vector<Real>,
    pub radius: Real,

    // --- suspension ---
    pub suspension_stiffness: Real,
    pub suspension_rest_length: Real,
    pub max_suspension_travel: Real,
    pub max_suspension_force: Real,
    pub damping_compression: Real,
    pub damping_relaxation: Real,

    // --- tire ---
    pub friction_slip: Real,
    pub side_friction_stiffness: Real,
    pub roll_influence: Real,

    // --- per-tick inputs ---
    pub engine_force: Real,
    pub steering: Real,
    pub brake: Real,

    // --- runtime state ---
    pub raycast: RaycastInfo,
    pub suspension_relative_velocity: Real,
    pub clipped_inv_contact_dot_suspension: Real,
    pub suspension_force: Real,
    pub skid: Real,
    pub rotation: Real,
    pub delta_rotation: Real,
    pub world_transform: Isometry<Real>,
}

impl WheelInfo {
    pub fn new(position: WheelPosition, config: &RaycastVehicleConfig) -> Self {
        let [cx, cy, cz] = config.connection_points[position.index()];
        Self {
            position,
            connection_point_cs: point![cx, cy, cz],
            direction_cs: vec3(config.direction).normalize(),
            axle_cs: vec3(config.axle).normalize(),
            radius: config.radius,
            suspension_stiffness: config.suspension_stiffness,
            suspension_rest_length: config.suspension_rest_length,
            max_suspension_travel: config.max_suspension_travel,
            max_suspension_force: config.max_suspension_force,
            damping_compression: config.damping_compression,
            damping_relaxation: config.damping_relaxation,
            friction_slip: config.friction_slip,
            side_friction_stiffness: config.side_friction_stiffness,
            roll_influence: config.roll_influence,
            engine_force: 0.0,
            steering: 0.0,
            brake: 0.0,
            raycast: RaycastInfo::new(config.suspension_rest_length),
            suspension_relative_velocity: 0.0,
            clipped_inv_contact_dot_suspension: 1.0,
            suspension_force: 0.0,
            skid: 1.0,
            rotation: 0.0,
            delta_rotation: 0.0,
            world_transform: Isometry::identity(),
        }
    }

    /// Hard point, suspension direction and steered axle in world space.
    fn update_frame(&mut self, chassis: &Isometry<Real>) {
        let up_cs = -self.direction_cs;
        let steer = UnitQuaternion::from_axis_angle(&UnitVector::new_normalize(up_cs), self.steering);

        self.raycast.hard_point_ws = chassis * self.connection_point_cs;
        self.raycast.direction_ws = chassis.rotation * self.direction_cs;
        self.raycast.axle_ws = chassis.rotation * (steer * self.axle_cs);
    }

    /// Rolling direction on the contact plane: axle x normal.
    fn forward_ws(&self) -> Vector<Real> {
        self.raycast
            .axle_ws
            .cross(&self.raycast.contact_normal_ws)
            .try_normalize(1.0e-6)
            .unwrap_or_else(Vector::zeros)
    }

    fn suspension_travel_bounds(&self) -> (Real, Real) {
        (
            self.suspension_rest_length - self.max_suspension_travel,
            self.suspension_rest_length + self.max_suspension_travel,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelTelemetry {
    pub wheel: &'static str,
    pub in_contact: bool,
    pub suspension_length: f32,
    pub suspension_force: f32,
    pub skid: f32,
    pub rotation: f32,
}

pub struct RaycastVehicle {
    pub chassis: RigidBodyHandle,
    pub wheels: Vec<WheelInfo>,
    current_speed_kmh: Real,
}

impl RaycastVehicle {
    pub fn new(chassis: RigidBodyHandle) -> Self {
        Self {
            chassis,
            wheels: Vec::new(),
            current_speed_kmh: 0.0,
        }
    }

    /// Spawns the chassis box at `spawn_height` and registers the four wheels.
    pub fn build(
        world: &mut PhysicsWorld,
        config: &RaycastVehicleConfig,
        half_extents: [f32; 3],
    ) -> SimResult<Self> {
        let material = world.hooks.table.id(DEFAULT_MATERIAL)?;
        let chassis = world.add_body(
            &BodyDesc::dynamic(
                BodyShape::Cuboid { half_extents },
                config.chassis_mass,
                vector![0.0, config.spawn_height, 0.0],
                material,
            )
            .groups(InteractionGroups::new(GROUP_VEHICLE, GROUP_GROUND | GROUP_PROP))
            .ccd(true)
            .can_sleep(false),
        );

        let mut vehicle = Self::new(chassis);
        for position in WheelPosition::ALL {
            vehicle.add_wheel(WheelInfo::new(position, config));
        }
        // wheel proxies are valid before the first step
        for i in 0..vehicle.wheels.len() {
            vehicle.update_wheel_transform(world, i)?;
        }
        Ok(vehicle)
    }

    pub fn add_wheel(&mut self, wheel: WheelInfo) -> usize {
        self.wheels.push(wheel);
        self.wheels.len() - 1
    }

    fn wheel_mut(&mut self, index: usize) -> SimResult<&mut WheelInfo> {
        let count = self.wheels.len();
        self.wheels
            .get_mut(index)
            .ok_or(SimError::WheelIndex { index, count })
    }

    pub fn apply_engine_force(&mut self, force: Real, index: usize) -> SimResult<()> {
        self.wheel_mut(index)?.engine_force = force;
        Ok(())
    }

    pub fn set_steering_value(&mut self, angle: Real, index: usize) -> SimResult<()> {
        self.wheel_mut(index)?.steering = angle;
        Ok(())
    }

    pub fn set_brake(&mut self, brake: Real, index: usize) -> SimResult<()> {
        self.wheel_mut(index)?.brake = brake;
        Ok(())
    }

    /// Routes one tick's command to the driven, steered and braked wheels.
    pub fn apply(&mut self, command: &RaycastCommand) -> SimResult<()> {
        for i in RaycastCommand::DRIVEN_WHEELS {
            self.apply_engine_force(command.engine_force, i)?;
        }
        for i in RaycastCommand::STEERED_WHEELS {
            self.set_steering_value(command.steering, i)?;
        }
        for i in RaycastCommand::BRAKED_WHEELS {
            self.set_brake(command.brake, i)?;
        }
        Ok(())
    }

    /// Signed chassis speed, km/h. Negative while rolling backwards.
    pub fn current_speed_kmh(&self) -> Real {
        self.current_speed_kmh
    }

    /// One substep of suspension, tire forces and wheel spin.
    pub fn update_vehicle(&mut self, world: &mut PhysicsWorld, dt: Real) -> SimResult<()> {
        world.query_pipeline.update(&world.colliders);

        let chassis = world.body(self.chassis)?;
        let pose = *chassis.position();
        let linvel = *chassis.linvel();
        let mass = chassis.mass();
        let com = *chassis.center_of_mass();
        let up_ws = pose.rotation * vector![0.0, 1.0, 0.0];

        // signed speed
        let forward_ws = pose.rotation * chassis_forward();
        let mut speed = linvel.norm();
        if forward_ws.dot(&linvel) < 0.0 {
            speed = -speed;
        }
        self.current_speed_kmh = speed * MS_TO_KMH;

        // 1) rays + 2) suspension
        let filter = QueryFilter::default().exclude_rigid_body(self.chassis);
        for wheel in &mut self.wheels {
            wheel.update_frame(&pose);
            cast_suspension_ray(wheel, world, chassis, filter);
            update_suspension_force(wheel, mass);
        }

        let mut impulses: Vec<(Vector<Real>, Point<Real>)> = Vec::with_capacity(self.wheels.len() * 3);
        for wheel in &self.wheels {
            if wheel.raycast.in_contact && wheel.suspension_force > 0.0 {
                impulses.push((
                    wheel.raycast.contact_normal_ws * wheel.suspension_force * dt,
                    wheel.raycast.contact_point_ws,
                ));
            }
        }

        // 3) tire impulses
        let grounded = self.wheels.iter().filter(|w| w.raycast.in_contact).count();
        let mass_share = if grounded > 0 { mass / grounded as Real } else { 0.0 };

        for wheel in &mut self.wheels {
            wheel.skid = 1.0;
            if !wheel.raycast.in_contact {
                continue;
            }
            let contact = wheel.raycast.contact_point_ws;
            let normal = wheel.raycast.contact_normal_ws;
            let forward = wheel.forward_ws();
            let side = normal.cross(&forward);

            let v = chassis.velocity_at_point(&contact);
            let v_long = v.dot(&forward);
            let v_lat = v.dot(&side);

            let mut long = wheel.engine_force * dt;
            if wheel.brake > 0.0 {
                long += (-v_long * mass_share).clamp(-wheel.brake, wheel.brake);
            }
            let mut lat = -v_lat * mass_share * wheel.side_friction_stiffness;

            // combined slip limit
            let max_impulse = wheel.suspension_force * dt * wheel.friction_slip;
            let demand = (long * long + lat * lat).sqrt();
            if demand > max_impulse && demand > 0.0 {
                wheel.skid = max_impulse / demand;
                long *= wheel.skid;
                lat *= wheel.skid;
            }

            if long != 0.0 {
                impulses.push((forward * long, contact));
            }
            if lat != 0.0 {
                // lift the application point toward the center of mass
                let rel = contact - com;
                let height = rel.dot(&up_ws);
                let point = contact - up_ws * height * (1.0 - wheel.roll_influence);
                impulses.push((side * lat, point));
            }
        }

        // 4) wheel spin
        for wheel in &mut self.wheels {
            if wheel.raycast.in_contact {
                let v = chassis.velocity_at_point(&wheel.raycast.hard_point_ws);
                wheel.delta_rotation = wheel.forward_ws().dot(&v) * dt / wheel.radius;
            }
            wheel.rotation += wheel.delta_rotation;
            wheel.delta_rotation *= SPIN_DAMPING;
        }

        let chassis = world.body_mut(self.chassis)?;
        for (impulse, point) in impulses {
            chassis.apply_impulse_at_point(impulse, point, true);
        }
        Ok(())
    }

    /// Recomputes wheel `index`'s world transform from the current chassis
    /// pose, steering and spin. Works with or without ground contact.
    pub fn update_wheel_transform(&mut self, world: &PhysicsWorld, index: usize) -> SimResult<Isometry<Real>> {
        let pose = *world.body(self.chassis)?.position();
        let wheel = self.wheel_mut(index)?;
        wheel.update_frame(&pose);

        let length = if wheel.raycast.in_contact {
            wheel.raycast.suspension_length
        } else {
            wheel.suspension_rest_length
        };
        let center = wheel.raycast.hard_point_ws + wheel.raycast.direction_ws * length;

        let steer = UnitQuaternion::from_axis_angle(&UnitVector::new_normalize(-wheel.direction_cs), wheel.steering);
        let spin = UnitQuaternion::from_axis_angle(&UnitVector::new_normalize(wheel.axle_cs), wheel.rotation);

        wheel.world_transform = Isometry::from_parts(Translation3::from(center.coords), pose.rotation * steer * spin);
        Ok(wheel.world_transform)
    }

    pub fn telemetry(&self) -> Vec<WheelTelemetry> {
        self.wheels
            .iter()
            .map(|w| WheelTelemetry {
                wheel: w.position.as_str(),
                in_contact: w.raycast.in_contact,
                suspension_length: w.raycast.suspension_length,
                suspension_force: w.suspension_force,
                skid: w.skid,
                rotation: w.rotation,
            })
            .collect()
    }
}

fn cast_suspension_ray(wheel: &mut WheelInfo, world: &PhysicsWorld, chassis: &RigidBody, filter: QueryFilter) {
    let (min_len, max_len) = wheel.suspension_travel_bounds();
    let max_toi = wheel.suspension_rest_length + wheel.max_suspension_travel + wheel.radius;
    let info = &mut wheel.raycast;
    let ray = Ray::new(info.hard_point_ws, info.direction_ws);

    let hit = world
        .query_pipeline
        .cast_ray(&world.bodies, &world.colliders, &ray, max_toi, true, filter);

    match hit {
        Some((collider, toi)) => {
            info.in_contact = true;
            info.ground = Some(collider);
            info.contact_point_ws = ray.point_at(toi);
            info.contact_normal_ws = -info.direction_ws; // flat ground
            info.suspension_length = (toi - wheel.radius).clamp(min_len, max_len);

            let denominator = info.contact_normal_ws.dot(&info.direction_ws);
            let projected_vel = info.contact_normal_ws.dot(&chassis.velocity_at_point(&info.contact_point_ws));
            if denominator >= -0.1 {
                wheel.suspension_relative_velocity = 0.0;
                wheel.clipped_inv_contact_dot_suspension = 1.0 / 0.1;
            } else {
                let inv = -1.0 / denominator;
                wheel.suspension_relative_velocity = projected_vel * inv;
                wheel.clipped_inv_contact_dot_suspension = inv;
            }
        }
        None => {
            info.in_contact = false;
            info.ground = None;
            info.suspension_length = wheel.suspension_rest_length;
            info.contact_normal_ws = -info.direction_ws;
            info.contact_point_ws = info.hard_point_ws + info.direction_ws * max_toi;
            wheel.suspension_relative_velocity = 0.0;
            wheel.clipped_inv_contact_dot_suspension = 1.0;
        }
    }
}

fn update_suspension_force(wheel: &mut WheelInfo, chassis_mass: Real) {
    if !wheel.raycast.in_contact {
        wheel.suspension_force = 0.0;
        return;
    }

    let compression = wheel.suspension_rest_length - wheel.raycast.suspension_length;
    let spring = wheel.suspension_stiffness * compression * wheel.clipped_inv_contact_dot_suspension;

    let rel_vel = wheel.suspension_relative_velocity;
    let damping = if rel_vel < 0.0 { wheel.damping_compression } else { wheel.damping_relaxation };

    wheel.suspension_force = ((spring - damping * rel_vel) * chassis_mass).clamp(0.0, wheel.max_suspension_force);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MaterialsConfig, WorldConfig};
    use approx::assert_relative_eq;

    const DT: f32 = 1.0 / 60.0;

    fn spawn(spawn_height: f32) -> (PhysicsWorld, RaycastVehicle) {
        let mut world =
            PhysicsWorld::from_config(&WorldConfig::default(), &MaterialsConfig::default()).unwrap();
        let config = RaycastVehicleConfig { spawn_height, ..RaycastVehicleConfig::default() };
        let vehicle = RaycastVehicle::build(&mut world, &config, [0.9, 0.5, 2.2]).unwrap();
        (world, vehicle)
    }

    fn run(world: &mut PhysicsWorld, vehicle: &mut RaycastVehicle, substeps: usize) {
        for _ in 0..substeps {
            world.step_with(DT, DT, 1, |w, dt| vehicle.update_vehicle(w, dt).unwrap());
        }
    }

    #[test]
    fn test_setters_reject_bad_index() {
        let (_, mut vehicle) = spawn(4.0);
        assert!(vehicle.apply_engine_force(100.0, 3).is_ok());
        assert!(matches!(
            vehicle.set_brake(1.0, 4),
            Err(SimError::WheelIndex { index: 4, count: 4 })
        ));
        assert!(vehicle.set_steering_value(0.1, 7).is_err());
    }

    #[test]
    fn test_command_routing() {
        let (_, mut vehicle) = spawn(4.0);
        vehicle
            .apply(&RaycastCommand { engine_force: 590.0, steering: 0.2, brake: 17.0 })
            .unwrap();
        let w = &vehicle.wheels;
        assert_eq!((w[0].engine_force, w[2].engine_force), (0.0, 590.0));
        assert_eq!((w[0].steering, w[3].steering), (0.2, 0.0));
        assert_eq!((w[1].brake, w[3].brake), (0.0, 17.0));
    }

    #[test]
    fn test_settles_on_suspension() {
        let (mut world, mut vehicle) = spawn(1.2);
        run(&mut world, &mut vehicle, 300);

        assert!(vehicle.wheels.iter().all(|w| w.raycast.in_contact));
        for w in &vehicle.wheels {
            let (min_len, max_len) = w.suspension_travel_bounds();
            assert!(w.raycast.suspension_length >= min_len && w.raycast.suspension_length <= max_len);
            assert!(w.suspension_force >= 0.0 && w.suspension_force <= w.max_suspension_force);
        }
        let chassis = world.body(vehicle.chassis).unwrap();
        assert!(chassis.linvel().norm() < 0.5);
        assert!(vehicle.current_speed_kmh().abs() < 2.0);
    }

    #[test]
    fn test_engine_force_moves_forward() {
        let (mut world, mut vehicle) = spawn(1.2);
        run(&mut world, &mut vehicle, 120);
        for i in RaycastCommand::DRIVEN_WHEELS {
            vehicle.apply_engine_force(590.0, i).unwrap();
        }
        run(&mut world, &mut vehicle, 120);
        assert!(vehicle.current_speed_kmh() > 1.0);
        assert!(world.body(vehicle.chassis).unwrap().translation().z > 0.1);
        assert!(vehicle.wheels[2].rotation > 0.0);
    }

    #[test]
    fn test_airborne_wheels_keep_extrapolating() {
        let (mut world, mut vehicle) = spawn(50.0);
        vehicle.wheels[0].delta_rotation = 0.1;
        let y0 = world.body(vehicle.chassis).unwrap().translation().y;

        run(&mut world, &mut vehicle, 10);

        assert!(vehicle.wheels.iter().all(|w| !w.raycast.in_contact));
        assert!(vehicle.wheels.iter().all(|w| w.suspension_force == 0.0));
        let chassis = world.body(vehicle.chassis).unwrap();
        assert!(chassis.translation().y < y0);
        assert!(chassis.linvel().y < 0.0);

        // 0.1 * (1 + 0.99 + ... + 0.99^9)
        let expected: f32 = (0..10).map(|k| 0.1 * 0.99f32.powi(k)).sum();
        assert_relative_eq!(vehicle.wheels[0].rotation, expected, epsilon = 1e-5);

        let iso = vehicle.update_wheel_transform(&world, 0).unwrap();
        let chassis = world.body(vehicle.chassis).unwrap();
        let hard_point = chassis.position() * point![0.85, 0.0, 1.2];
        let expected_center = hard_point + vector![0.0, -1.0, 0.0] * 0.3;
        assert_relative_eq!(iso.translation.vector, expected_center.coords, epsilon = 1e-4);
    }

    #[test]
    fn test_wheel_transform_follows_steering() {
        let (world, mut vehicle) = spawn(4.0);
        vehicle.set_steering_value(0.5, 0).unwrap();
        let iso = vehicle.update_wheel_transform(&world, 0).unwrap();
        let axle = iso.rotation * vector![1.0, 0.0, 0.0];
        // steering left swings the axle's +X end backwards
        assert!(axle.z < 0.0);
        assert_relative_eq!(axle.norm(), 1.0, epsilon = 1e-5);
        assert!(vehicle.update_wheel_transform(&world, 9).is_err());
    }
}
