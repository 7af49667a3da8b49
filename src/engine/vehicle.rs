use crate::engine::physics::{BodyHandle, BodySpec, Material, PhysicsWorld, Shape};
use crate::engine::visual::{VisualId, Visuals};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const WHEEL_COUNT: usize = 4;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct VehicleConfig {
    pub chassis_half_extents: [f32; 3],
    pub chassis_mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub wheel_radius: f32,
    /// Chassis-local anchors: front left/right first, then rear.
    pub wheel_connections: [[f32; 3]; WHEEL_COUNT],
    pub suspension_rest_length: f32,
    pub suspension_stiffness: f32,
    pub damping_compression: f32,
    pub damping_relaxation: f32,
    pub max_suspension_force: f32,
    pub max_suspension_travel: f32,
    pub friction_slip: f32,
    pub roll_influence: f32,
    pub max_force: f32,
    pub max_steer: f32,
    pub brake_force: f32,
    pub spawn_height: f32,
    pub reset_jitter: f32,
    pub reset_lift: f32,
    pub wheel_model: String,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        VehicleConfig {
            chassis_half_extents: [1.0, 0.5, 2.0],
            chassis_mass: 150.0,
            linear_damping: 0.1,
            angular_damping: 0.4,
            wheel_radius: 0.5,
            wheel_connections: [
                [1.0, 0.0, -1.0],
                [-1.0, 0.0, -1.0],
                [1.0, 0.0, 1.0],
                [-1.0, 0.0, 1.0],
            ],
            suspension_rest_length: 0.3,
            suspension_stiffness: 20.0,
            damping_compression: 5.0,
            damping_relaxation: 3.0,
            max_suspension_force: 100_000.0,
            max_suspension_travel: 0.3,
            friction_slip: 2.0,
            roll_influence: 0.01,
            max_force: 700.0,
            max_steer: 0.5,
            brake_force: 10.0,
            spawn_height: 2.0,
            reset_jitter: 10.0,
            reset_lift: 5.0,
            wheel_model: "wheel".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelContact {
    pub point: Point3<f32>,
    pub normal: Vector3<f32>,
}

#[derive(Clone, Debug)]
pub struct Wheel {
    pub connection: Vector3<f32>,
    pub steering: f32,
    pub engine_force: f32,
    pub brake: f32,
    pub suspension_length: f32,
    /// Rate of change of suspension length along the contact normal; negative while compressing.
    pub suspension_velocity: f32,
    pub suspension_force: f32,
    pub spin: f32,
    pub spin_velocity: f32,
    pub contact: Option<WheelContact>,
    pub visual: VisualId,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelPose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

/// Spring/damper force along the contact normal, before mass scaling.
pub fn suspension_force(stiffness: f32, damping: f32, compression: f32, suspension_velocity: f32) -> f32 {
    stiffness * compression - damping * suspension_velocity
}

/// Raycast vehicle on a single rapier chassis.
///
/// Wheels are not bodies. Each physics substep casts one ray per wheel,
/// turns the hit into a suspension impulse and then into friction and
/// drive impulses, all applied to the chassis.
pub struct Vehicle {
    pub chassis: BodyHandle,
    pub visual: VisualId,
    pub wheels: [Wheel; WHEEL_COUNT],
    config: VehicleConfig,
    forward: i8,
    turn: i8,
}

impl Vehicle {
    pub fn new(
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        config: VehicleConfig,
        model: &str,
        spawn: Vector3<f32>,
    ) -> Self {
        let [hx, hy, hz] = config.chassis_half_extents;
        let chassis = world.add_body(
            BodySpec::dynamic(config.chassis_mass, spawn)
                .with_damping(config.linear_damping, config.angular_damping)
                .with_collider(Shape::Cuboid(Vector3::new(hx, hy, hz)), Material::Default),
        );
        let visual = visuals.request(model);
        visuals.set_transform(visual, spawn, UnitQuaternion::identity());

        let wheels = config.wheel_connections.map(|[x, y, z]| Wheel {
            connection: Vector3::new(x, y, z),
            steering: 0.0,
            engine_force: 0.0,
            brake: 0.0,
            suspension_length: config.suspension_rest_length,
            suspension_velocity: 0.0,
            suspension_force: 0.0,
            spin: 0.0,
            spin_velocity: 0.0,
            contact: None,
            visual: visuals.request(&config.wheel_model),
        });

        log::info!("vehicle spawned at ({:.1}, {:.1}, {:.1})", spawn.x, spawn.y, spawn.z);
        Vehicle { chassis, visual, wheels, config, forward: 0, turn: 0 }
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn drive_intent(&self) -> (i8, i8) {
        (self.forward, self.turn)
    }

    /// Rear wheels push, front wheels steer, brakes hold only while coasting.
    pub fn set_drive_intent(&mut self, forward: i8, turn: i8) {
        self.forward = forward.clamp(-1, 1);
        self.turn = turn.clamp(-1, 1);
        let force = self.config.max_force * self.forward as f32;
        let steer = self.config.max_steer * self.turn as f32;
        let brake = if self.forward == 0 { self.config.brake_force } else { 0.0 };

        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            let front = i < 2;
            wheel.steering = if front { steer } else { 0.0 };
            wheel.engine_force = if front { 0.0 } else { force };
            wheel.brake = brake;
        }
    }

    /// One solver pass. Runs before every physics substep.
    pub fn update(&mut self, world: &mut PhysicsWorld, dt: f32) {
        let Some((position, rotation)) = world.pose(self.chassis) else { return };
        let Some(com) = world.center_of_mass(self.chassis) else { return };
        let mass = world.mass(self.chassis);
        let cfg = &self.config;
        let up = rotation * Vector3::y();
        let down = -up;
        let rest = cfg.suspension_rest_length;
        let ray_length = rest + cfg.wheel_radius;
        let wheel_mass = mass / WHEEL_COUNT as f32;

        let mut impulses: Vec<(Vector3<f32>, Point3<f32>)> = Vec::with_capacity(WHEEL_COUNT * 3);

        for wheel in self.wheels.iter_mut() {
            let origin = Point3::from(position + rotation * wheel.connection);
            let hit = world.cast_ray(origin, down, ray_length, Some(self.chassis));

            let Some(hit) = hit else {
                wheel.contact = None;
                wheel.suspension_length = rest + cfg.max_suspension_travel.min(cfg.wheel_radius);
                wheel.suspension_velocity = 0.0;
                wheel.suspension_force = 0.0;
                wheel.spin_velocity *= 0.99;
                wheel.spin += wheel.spin_velocity * dt;
                continue;
            };

            let length = (hit.distance - cfg.wheel_radius)
                .clamp(rest - cfg.max_suspension_travel, rest + cfg.max_suspension_travel);
            let contact_velocity = world.velocity_at_point(self.chassis, &hit.point);

            // Steep contacts get a clipped lever and no damping.
            let normal_up = hit.normal.dot(&up);
            let (suspension_velocity, clipped_inv) = if normal_up <= 0.1 {
                (0.0, 10.0)
            } else {
                let inv = 1.0 / normal_up;
                (hit.normal.dot(&contact_velocity) * inv, inv)
            };

            let damping = if suspension_velocity < 0.0 {
                cfg.damping_compression
            } else {
                cfg.damping_relaxation
            };
            let compression = (rest - length) * clipped_inv;
            let force = (suspension_force(cfg.suspension_stiffness, damping, compression, suspension_velocity) * mass)
                .clamp(0.0, cfg.max_suspension_force);

            wheel.suspension_length = length;
            wheel.suspension_velocity = suspension_velocity;
            wheel.suspension_force = force;
            wheel.contact = Some(WheelContact { point: hit.point, normal: hit.normal });
            impulses.push((hit.normal * force * dt, hit.point));

            // Contact frame: rolling direction projected onto the ground plane.
            let steer = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), wheel.steering);
            let mut forward = rotation * (steer * -Vector3::z());
            forward -= hit.normal * hit.normal.dot(&forward);
            if forward.norm_squared() < 1e-6 {
                continue;
            }
            forward.normalize_mut();
            let side = hit.normal.cross(&forward);

            let rolling_speed = forward.dot(&contact_velocity);
            let mut forward_impulse = wheel.engine_force * dt;
            if wheel.brake > 0.0 {
                // Brake is an impulse cap per substep, not a force.
                let limit = wheel.brake;
                forward_impulse += (-rolling_speed * wheel_mass).clamp(-limit, limit);
            }
            let mut side_impulse = -side.dot(&contact_velocity) * wheel_mass;

            let max_impulse = cfg.friction_slip * force * dt;
            let total = (forward_impulse * forward_impulse + side_impulse * side_impulse).sqrt();
            if total > max_impulse && total > 0.0 {
                let scale = max_impulse / total;
                forward_impulse *= scale;
                side_impulse *= scale;
            }

            // Side grip acts closer to the centre of mass to limit body roll.
            let lever = hit.point - com;
            let lever = lever - up * (lever.dot(&up) * (1.0 - cfg.roll_influence));
            impulses.push((side * side_impulse, com + lever));
            impulses.push((forward * forward_impulse, hit.point));

            wheel.spin_velocity = rolling_speed / cfg.wheel_radius;
            wheel.spin += wheel.spin_velocity * dt;
        }

        for (impulse, point) in impulses {
            world.apply_impulse_at_point(self.chassis, impulse, point);
        }
    }

    pub fn position(&self, world: &PhysicsWorld) -> Option<Vector3<f32>> {
        world.position(self.chassis)
    }

    /// Horizontal speed in km/h, rounded.
    pub fn speed_kmh(&self, world: &PhysicsWorld) -> f32 {
        world
            .linvel(self.chassis)
            .map(|v| (v.x.hypot(v.z) * 3.6).round())
            .unwrap_or(0.0)
    }

    pub fn forward_direction(&self, world: &PhysicsWorld) -> Vector3<f32> {
        world
            .rotation(self.chassis)
            .map(|r| r * -Vector3::z())
            .unwrap_or_else(|| -Vector3::z())
    }

    /// Wheel centres follow the suspension; only front wheels carry a steering angle.
    pub fn wheel_poses(&self, world: &PhysicsWorld) -> Option<[WheelPose; WHEEL_COUNT]> {
        let (position, rotation) = world.pose(self.chassis)?;
        let down = rotation * -Vector3::y();
        Some(std::array::from_fn(|i| {
            let wheel = &self.wheels[i];
            let steer = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), wheel.steering);
            let spin = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -wheel.spin);
            WheelPose {
                position: position + rotation * wheel.connection + down * wheel.suspension_length,
                rotation: rotation * steer * spin,
            }
        }))
    }

    /// Teleports to `anchor` plus jitter and lift, upright, with every motion state cleared.
    pub fn reset_to_safe_position<R: Rng>(&mut self, world: &mut PhysicsWorld, anchor: Vector3<f32>, rng: &mut R) {
        let jitter = self.config.reset_jitter;
        let target = anchor
            + Vector3::new(
                rng.gen::<f32>() * jitter,
                self.config.reset_lift,
                rng.gen::<f32>() * jitter,
            );
        world.set_pose(self.chassis, target, UnitQuaternion::identity());
        world.zero_motion(self.chassis);

        for wheel in self.wheels.iter_mut() {
            wheel.spin_velocity = 0.0;
            wheel.suspension_velocity = 0.0;
            wheel.suspension_force = 0.0;
            wheel.suspension_length = self.config.suspension_rest_length;
            wheel.contact = None;
        }
        log::debug!("vehicle reset to ({:.1}, {:.1}, {:.1})", target.x, target.y, target.z);
    }

    pub fn sync_visuals(&self, world: &PhysicsWorld, visuals: &mut Visuals, model_offset: &UnitQuaternion<f32>, lift: f32) {
        if let Some((position, rotation)) = world.pose(self.chassis) {
            visuals.set_transform(self.visual, position + Vector3::new(0.0, lift, 0.0), rotation * model_offset);
        }
        if let Some(poses) = self.wheel_poses(world) {
            for (wheel, pose) in self.wheels.iter().zip(poses) {
                visuals.set_transform(wheel.visual, pose.position, pose.rotation);
            }
        }
    }
}
