// src/physics.rs

use rapier3d::prelude::*;
use tracing::{info, warn};

use crate::config::{GROUND_MATERIAL, MaterialsConfig, WorldConfig};
use crate::error::{SimError, SimResult};
use crate::materials::{ContactMaterialTable, MaterialHooks, MaterialId};

pub const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_VEHICLE: Group = Group::from_bits_truncate(0b0010);
pub const GROUP_PROP: Group = Group::from_bits_truncate(0b0100);

const RUNAWAY_LIMIT: Real = 100_000.0; // m from origin
const RESET_HEIGHT: Real = 4.0;        // m, where runaway groups are put back

/// Shape of a body's single collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyShape {
    Cuboid { half_extents: [f32; 3] },
    Ball { radius: f32 },
    /// Infinite floor through the body origin, normal +Y.
    HalfSpace,
}

/// Everything needed to create one rigid body with one collider.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub position: Vector<Real>,
    pub rotation: Option<Rotation<Real>>,
    pub mass: Real, // 0 = fixed
    pub shape: BodyShape,
    pub material: MaterialId,
    pub groups: InteractionGroups,
    pub ccd: bool,
    pub can_sleep: bool,
}

impl BodyDesc {
    pub fn dynamic(shape: BodyShape, mass: Real, position: Vector<Real>, material: MaterialId) -> Self {
        Self {
            position,
            rotation: None,
            mass,
            shape,
            material,
            groups: InteractionGroups::all(),
            ccd: false,
            can_sleep: true,
        }
    }

    pub fn groups(mut self, groups: InteractionGroups) -> Self {
        self.groups = groups;
        self
    }

    pub fn ccd(mut self, enabled: bool) -> Self {
        self.ccd = enabled;
        self
    }

    /// Vehicle bodies stay awake: joint motor and axis edits do not wake them.
    pub fn can_sleep(mut self, enabled: bool) -> Self {
        self.can_sleep = enabled;
        self
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,                   // gravity vector
    pub pipeline: PhysicsPipeline,               // physics pipeline
    pub integration: IntegrationParameters,      // dt is overwritten per substep
    pub island_manager: IslandManager,           // manages islands of bodies
    pub broad_phase: DefaultBroadPhase,          // sweep-and-prune pairs
    pub narrow_phase: NarrowPhase,               // contact generation
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,                 // hinges
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,           // raycasts
    pub hooks: MaterialHooks,                    // pairwise contact materials
    pub ground: RigidBodyHandle,
    accumulator: Real,                           // unconsumed time debt (s)
    last_fixed: Real,
}

impl PhysicsWorld {
    pub fn new(config: &WorldConfig, materials: ContactMaterialTable) -> SimResult<Self> {
        let [gx, gy, gz] = config.gravity;
        let ground_material = materials.id(GROUND_MATERIAL)?;

        let mut world = Self {
            gravity: vector![gx, gy, gz],
            pipeline: PhysicsPipeline::new(),
            integration: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            hooks: MaterialHooks { table: materials },
            ground: RigidBodyHandle::invalid(),
            accumulator: 0.0,
            last_fixed: config.fixed_substep,
        };

        // Static infinite floor at y = 0.
        world.ground = world.add_body(&BodyDesc {
            position: vector![0.0, 0.0, 0.0],
            rotation: None,
            mass: 0.0,
            shape: BodyShape::HalfSpace,
            material: ground_material,
            groups: InteractionGroups::new(GROUP_GROUND, GROUP_VEHICLE | GROUP_PROP),
            ccd: false,
            can_sleep: true,
        });
        world.query_pipeline.update(&world.colliders);

        info!(
            bodies = world.bodies.len(),
            colliders = world.colliders.len(),
            "physics world created"
        );
        Ok(world)
    }

    /// Builds the material table from config, then the world.
    pub fn from_config(config: &WorldConfig, materials: &MaterialsConfig) -> SimResult<Self> {
        let table = ContactMaterialTable::from_config(
            materials,
            config.default_friction,
            config.default_restitution,
        )?;
        Self::new(config, table)
    }

    /// Inserts a body with a single collider tagged with its material.
    pub fn add_body(&mut self, desc: &BodyDesc) -> RigidBodyHandle {
        let mut builder = if desc.mass > 0.0 {
            RigidBodyBuilder::dynamic()
                .ccd_enabled(desc.ccd)
                .can_sleep(desc.can_sleep)
        } else {
            RigidBodyBuilder::fixed()
        };
        builder = builder.translation(desc.position);
        if let Some(rot) = desc.rotation {
            builder = builder.rotation(rot.scaled_axis());
        }
        let handle = self.bodies.insert(builder.build());

        let collider = match desc.shape {
            BodyShape::Cuboid { half_extents: [hx, hy, hz] } => ColliderBuilder::cuboid(hx, hy, hz),
            BodyShape::Ball { radius } => ColliderBuilder::ball(radius),
            BodyShape::HalfSpace => ColliderBuilder::halfspace(Vector::y_axis()),
        };
        let mut collider = collider
            .collision_groups(desc.groups)
            .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
            .user_data(desc.material.to_user_data());
        if desc.mass > 0.0 {
            collider = collider.mass(desc.mass);
        }
        self.colliders.insert_with_parent(collider.build(), handle, &mut self.bodies);
        handle
    }

    /// Removes a body, its colliders and any joint attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> SimResult<()> {
        self.bodies
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.joints,
                &mut self.multibody_joints,
                true,
            )
            .map(|_| ())
            .ok_or(SimError::MissingBody)
    }

    pub fn body(&self, handle: RigidBodyHandle) -> SimResult<&RigidBody> {
        self.bodies.get(handle).ok_or(SimError::MissingBody)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> SimResult<&mut RigidBody> {
        self.bodies.get_mut(handle).ok_or(SimError::MissingBody)
    }

    /// Fraction of a substep left in the accumulator after the last `step`.
    pub fn interpolation_alpha(&self) -> Real {
        if self.last_fixed > 0.0 { self.accumulator / self.last_fixed } else { 0.0 }
    }

    pub fn time_debt(&self) -> Real {
        self.accumulator
    }

    pub fn step(&mut self, fixed_substep: Real, elapsed: Real, max_substeps: usize) -> usize {
        self.step_with(fixed_substep, elapsed, max_substeps, |_, _| {})
    }

    /// Accumulates `elapsed` and consumes it in `fixed_substep` units, at most
    /// `max_substeps` times. `pre_step` runs before every substep (vehicle
    /// controllers push their impulses there). Debt the cap could not consume
    /// is dropped down to less than one substep. Returns substeps taken.
    pub fn step_with<F>(
        &mut self,
        fixed_substep: Real,
        elapsed: Real,
        max_substeps: usize,
        mut pre_step: F,
    ) -> usize
    where
        F: FnMut(&mut PhysicsWorld, Real),
    {
        if !(fixed_substep > 0.0 && fixed_substep.is_finite()) || !elapsed.is_finite() {
            warn!(fixed_substep, elapsed, "rejected step parameters");
            return 0;
        }
        if elapsed < 0.0 {
            warn!(elapsed, "negative elapsed time ignored");
            return 0;
        }

        self.last_fixed = fixed_substep;
        self.accumulator += elapsed;

        let mut substeps = 0;
        while self.accumulator >= fixed_substep && substeps < max_substeps {
            pre_step(self, fixed_substep);
            self.integrate(fixed_substep);
            self.accumulator -= fixed_substep;
            substeps += 1;
        }

        if self.accumulator >= fixed_substep {
            warn!(
                debt = self.accumulator,
                max_substeps, "substep cap reached, dropping time debt"
            );
        }
        self.accumulator %= fixed_substep;

        if substeps > 0 {
            self.reset_runaway_bodies();
        }
        substeps
    }

    /// One fixed integration step.
    pub fn integrate(&mut self, dt: Real) {
        self.integration.dt = dt;
        let events = ();

        self.pipeline.step(
            &self.gravity,
            &self.integration,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &self.hooks,
            &events,
        );
    }

    /// Prevent bodies from exploding to insane coordinates. Bodies tied
    /// together by joints are put back as one group so the joints hold.
    fn reset_runaway_bodies(&mut self) {
        let runaway: Vec<RigidBodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, body)| is_runaway(body.translation()))
            .map(|(handle, _)| handle)
            .collect();

        let mut handled: Vec<RigidBodyHandle> = Vec::new();
        for handle in runaway {
            if handled.contains(&handle) {
                continue;
            }
            let group = self.joint_group(handle);
            self.reset_group(&group);
            handled.extend(group);
        }
    }

    /// Bodies reachable from `start` through impulse joints, `start` first.
    pub fn joint_group(&self, start: RigidBodyHandle) -> Vec<RigidBodyHandle> {
        let mut group = vec![start];
        let mut next = 0;
        while next < group.len() {
            let current = group[next];
            for (_, joint) in self.joints.iter() {
                let other = if joint.body1 == current {
                    joint.body2
                } else if joint.body2 == current {
                    joint.body1
                } else {
                    continue;
                };
                if !group.contains(&other) {
                    group.push(other);
                }
            }
            next += 1;
        }
        group
    }

    /// Moves a joint group back above the origin, upright. The root (a body
    /// that only ever appears as the first body of its joints, e.g. a chassis)
    /// goes to the reset point; every other member goes to its anchor on it.
    fn reset_group(&mut self, group: &[RigidBodyHandle]) {
        let Some(&first) = group.first() else { return };
        let root = group
            .iter()
            .copied()
            .find(|h| {
                self.joints.iter().any(|(_, j)| j.body1 == *h)
                    && !self.joints.iter().any(|(_, j)| j.body2 == *h)
            })
            .unwrap_or(first);

        let safe = vector![0.0, RESET_HEIGHT, 0.0];

        let targets: Vec<(RigidBodyHandle, Vector<Real>)> = group
            .iter()
            .map(|&handle| {
                let anchor = self
                    .joints
                    .iter()
                    .find(|(_, j)| j.body1 == root && j.body2 == handle)
                    .map(|(_, j)| j.data.local_anchor1().coords)
                    .unwrap_or_else(Vector::zeros);
                (handle, safe + anchor)
            })
            .collect();

        for (handle, target) in targets {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.set_translation(target, true);
                body.set_rotation(Rotation::identity(), true);
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(Vector::zeros(), true);
            }
        }
        warn!(?root, bodies = group.len(), "reset runaway bodies to {:?}", safe);
    }
}

fn is_runaway(pos: &Vector<Real>) -> bool {
    pos.iter().any(|c| !c.is_finite() || c.abs() > RUNAWAY_LIMIT)
}
