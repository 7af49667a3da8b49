use nalgebra::{Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

pub type BodyHandle = RigidBodyHandle;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: f32,
    pub fixed_dt: f32,
    pub max_substeps: u32,
    pub ground_height: f32,
    pub ground_half_extent: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            gravity: -10.0,
            fixed_dt: 1.0 / 60.0,
            max_substeps: 10,
            ground_height: -0.25,
            ground_half_extent: 5000.0,
        }
    }
}

/// Surface tag stored in each collider's `user_data`.
///
/// Friction combines with `Min` so an untagged (`Default`) surface never
/// grips, which keeps sliding chassis and props from snagging on the ground.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Material {
    Default,
    Ground,
    Wheel,
    Prop,
}

impl Material {
    pub fn friction(self) -> f32 {
        match self {
            Material::Default => 0.0,
            Material::Ground | Material::Wheel => 0.6,
            Material::Prop => 0.5,
        }
    }

    pub fn restitution(self) -> f32 {
        match self {
            Material::Default => 0.0,
            Material::Ground | Material::Wheel | Material::Prop => 0.1,
        }
    }

    fn tag(self) -> u128 {
        match self {
            Material::Default => 0,
            Material::Ground => 1,
            Material::Wheel => 2,
            Material::Prop => 3,
        }
    }

    fn from_tag(tag: u128) -> Self {
        match tag {
            1 => Material::Ground,
            2 => Material::Wheel,
            3 => Material::Prop,
            _ => Material::Default,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Cuboid(Vector3<f32>),
    Ball(f32),
    Cylinder { half_height: f32, radius: f32 },
    Cone { half_height: f32, radius: f32 },
}

#[derive(Clone, Debug)]
pub struct ColliderSpec {
    pub shape: Shape,
    pub offset: Vector3<f32>,
    pub material: Material,
    pub trigger: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BodyKind {
    Fixed,
    Dynamic { mass: f32 },
    Kinematic,
}

#[derive(Clone, Debug)]
pub struct BodySpec {
    pub kind: BodyKind,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub colliders: Vec<ColliderSpec>,
}

impl BodySpec {
    fn new(kind: BodyKind, position: Vector3<f32>) -> Self {
        BodySpec {
            kind,
            position,
            rotation: UnitQuaternion::identity(),
            linear_damping: 0.0,
            angular_damping: 0.0,
            colliders: Vec::new(),
        }
    }

    pub fn fixed(position: Vector3<f32>) -> Self {
        Self::new(BodyKind::Fixed, position)
    }

    pub fn dynamic(mass: f32, position: Vector3<f32>) -> Self {
        Self::new(BodyKind::Dynamic { mass }, position)
    }

    pub fn kinematic(position: Vector3<f32>) -> Self {
        Self::new(BodyKind::Kinematic, position)
    }

    pub fn with_rotation(mut self, rotation: UnitQuaternion<f32>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_collider(self, shape: Shape, material: Material) -> Self {
        self.with_collider_at(shape, Vector3::zeros(), material)
    }

    pub fn with_collider_at(mut self, shape: Shape, offset: Vector3<f32>, material: Material) -> Self {
        self.colliders.push(ColliderSpec { shape, offset, material, trigger: false });
        self
    }

    /// Adds a sensor: it is reported by overlap logic but never pushes back.
    pub fn with_trigger(mut self, shape: Shape) -> Self {
        self.colliders.push(ColliderSpec {
            shape,
            offset: Vector3::zeros(),
            material: Material::Default,
            trigger: true,
        });
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    pub body: Option<BodyHandle>,
    pub point: Point3<f32>,
    pub normal: Vector3<f32>,
    pub distance: f32,
    pub material: Material,
}

pub struct PhysicsWorld {
    pub gravity: Vector3<f32>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    accumulator: f32,
    fixed_dt: f32,
    steps: u64,
}

impl PhysicsWorld {
    pub fn new(config: &PhysicsConfig) -> Self {
        PhysicsWorld {
            gravity: Vector3::new(0.0, config.gravity, 0.0),
            params: IntegrationParameters {
                dt: config.fixed_dt,
                ..IntegrationParameters::default()
            },
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            accumulator: 0.0,
            fixed_dt: config.fixed_dt,
            steps: 0,
        }
    }

    /// A wide, thin fixed slab whose top face sits at `height`.
    pub fn add_ground(&mut self, height: f32, half_extent: f32) -> BodyHandle {
        let thickness = 0.25;
        self.add_body(
            BodySpec::fixed(Vector3::new(0.0, height - thickness, 0.0)).with_collider(
                Shape::Cuboid(Vector3::new(half_extent, thickness, half_extent)),
                Material::Ground,
            ),
        )
    }

    pub fn add_body(&mut self, spec: BodySpec) -> BodyHandle {
        let builder = match spec.kind {
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
            BodyKind::Dynamic { .. } => RigidBodyBuilder::dynamic(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        };
        let body = builder
            .translation(spec.position)
            .rotation(spec.rotation.scaled_axis())
            .linear_damping(spec.linear_damping)
            .angular_damping(spec.angular_damping)
            .build();
        let handle = self.bodies.insert(body);

        let solid_count = spec.colliders.iter().filter(|c| !c.trigger).count().max(1);
        for collider in spec.colliders {
            let mut builder = match collider.shape {
                Shape::Cuboid(half) => ColliderBuilder::cuboid(half.x, half.y, half.z),
                Shape::Ball(radius) => ColliderBuilder::ball(radius),
                Shape::Cylinder { half_height, radius } => ColliderBuilder::cylinder(half_height, radius),
                Shape::Cone { half_height, radius } => ColliderBuilder::cone(half_height, radius),
            }
            .translation(collider.offset)
            .friction(collider.material.friction())
            .friction_combine_rule(CoefficientCombineRule::Min)
            .restitution(collider.material.restitution())
            .user_data(collider.material.tag());

            if collider.trigger {
                builder = builder.sensor(true).density(0.0);
            } else if let BodyKind::Dynamic { mass } = spec.kind {
                // Spread the requested mass over the solid parts.
                builder = builder.mass(mass / solid_count as f32);
            }
            self.colliders.insert_with_parent(builder.build(), handle, &mut self.bodies);
        }
        handle
    }

    /// Removes the body and every collider attached to it. Unknown handles are ignored.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Advances by whole `fixed_dt` steps covering `real_dt`, at most `max_substeps` of them.
    ///
    /// `pre_step` runs before every substep with the substep length. Time
    /// beyond the cap is dropped; only the remainder below one step carries
    /// over to the next call. Returns the number of substeps taken.
    pub fn step<F>(&mut self, fixed_dt: f32, real_dt: f32, max_substeps: u32, mut pre_step: F) -> u32
    where
        F: FnMut(&mut PhysicsWorld, f32),
    {
        if fixed_dt <= 0.0 {
            return 0;
        }
        self.fixed_dt = fixed_dt;
        self.accumulator += real_dt.max(0.0);

        let mut substeps = 0;
        while self.accumulator >= fixed_dt && substeps < max_substeps {
            pre_step(self, fixed_dt);
            self.internal_step(fixed_dt);
            self.accumulator -= fixed_dt;
            substeps += 1;
        }
        self.accumulator %= fixed_dt;
        substeps
    }

    /// Fraction of a fixed step left in the accumulator, for render interpolation.
    pub fn interpolation_alpha(&self) -> f32 {
        if self.fixed_dt > 0.0 {
            self.accumulator / self.fixed_dt
        } else {
            0.0
        }
    }

    fn internal_step(&mut self, dt: f32) {
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &(),
            &(),
        );
        self.steps += 1;
    }

    pub fn position(&self, handle: BodyHandle) -> Option<Vector3<f32>> {
        self.bodies.get(handle).map(|b| *b.translation())
    }

    pub fn rotation(&self, handle: BodyHandle) -> Option<UnitQuaternion<f32>> {
        self.bodies.get(handle).map(|b| *b.rotation())
    }

    pub fn pose(&self, handle: BodyHandle) -> Option<(Vector3<f32>, UnitQuaternion<f32>)> {
        self.bodies.get(handle).map(|b| (*b.translation(), *b.rotation()))
    }

    pub fn linvel(&self, handle: BodyHandle) -> Option<Vector3<f32>> {
        self.bodies.get(handle).map(|b| *b.linvel())
    }

    pub fn angvel(&self, handle: BodyHandle) -> Option<Vector3<f32>> {
        self.bodies.get(handle).map(|b| *b.angvel())
    }

    pub fn mass(&self, handle: BodyHandle) -> f32 {
        self.bodies.get(handle).map(|b| b.mass()).unwrap_or(0.0)
    }

    pub fn center_of_mass(&self, handle: BodyHandle) -> Option<Point3<f32>> {
        self.bodies.get(handle).map(|b| *b.center_of_mass())
    }

    pub fn velocity_at_point(&self, handle: BodyHandle, point: &Point3<f32>) -> Vector3<f32> {
        self.bodies
            .get(handle)
            .map(|b| b.velocity_at_point(point))
            .unwrap_or_else(Vector3::zeros)
    }

    /// Teleports a body. Works for fixed bodies too, which is how triggers are animated.
    pub fn set_pose(&mut self, handle: BodyHandle, position: Vector3<f32>, rotation: UnitQuaternion<f32>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(position, true);
            body.set_rotation(rotation, true);
        }
    }

    pub fn set_kinematic_pose(&mut self, handle: BodyHandle, position: Vector3<f32>, rotation: UnitQuaternion<f32>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_next_kinematic_translation(position);
            body.set_next_kinematic_rotation(rotation);
        }
    }

    /// Clears velocities and any accumulated force or torque.
    pub fn zero_motion(&mut self, handle: BodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(Vector3::zeros(), true);
            body.set_angvel(Vector3::zeros(), true);
            body.reset_forces(true);
            body.reset_torques(true);
        }
    }

    pub fn apply_impulse_at_point(&mut self, handle: BodyHandle, impulse: Vector3<f32>, point: Point3<f32>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse_at_point(impulse, point, true);
        }
    }

    /// Closest solid hit along the ray. Sensors and `exclude` are skipped.
    pub fn cast_ray(
        &self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        max_distance: f32,
        exclude: Option<BodyHandle>,
    ) -> Option<RayHit> {
        let mut filter = QueryFilter::default().exclude_sensors();
        if let Some(handle) = exclude {
            filter = filter.exclude_rigid_body(handle);
        }
        let query = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        );
        let ray = Ray::new(origin, direction);
        let (collider_handle, hit) = query.cast_ray_and_get_normal(&ray, max_distance, true)?;
        let collider = self.colliders.get(collider_handle)?;

        Some(RayHit {
            body: collider.parent(),
            point: ray.point_at(hit.time_of_impact),
            normal: hit.normal,
            distance: hit.time_of_impact,
            material: Material::from_tag(collider.user_data),
        })
    }

    pub fn is_trigger_body(&self, handle: BodyHandle) -> bool {
        self.bodies
            .get(handle)
            .map(|b| b.colliders().iter().any(|c| self.colliders.get(*c).is_some_and(|c| c.is_sensor())))
            .unwrap_or(false)
    }
}
