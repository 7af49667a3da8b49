use crate::engine::physics::{BodySpec, Material, PhysicsWorld, Shape};
use crate::engine::visual::Visuals;
use crate::game::objects::{ObjectKind, PlacedObject};
use crate::game::road::Road;
use crate::game::vegetation::Tree;
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PlacementConfig {
    pub map_size: f32,
    pub houses: usize,
    pub house_min_origin_distance: f32,
    pub house_min_separation: f32,
    pub house_max_attempts: usize,
    pub house_size: [f32; 3],
    pub house_models: Vec<String>,
    pub barriers: usize,
    pub barrier_lateral: f32,
    pub barrier_radius: f32,
    pub barrier_max_attempts: usize,
    pub barrier_recover_below: f32,
    pub grove_trees: usize,
    pub grove_range: f32,
    pub grove_road_buffer: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            map_size: 5000.0,
            houses: 25,
            house_min_origin_distance: 500.0,
            house_min_separation: 80.0,
            house_max_attempts: 500,
            house_size: [15.0, 10.0, 15.0],
            house_models: vec!["house1".to_string(), "house2".to_string(), "house3".to_string()],
            barriers: 50,
            barrier_lateral: 5.0,
            barrier_radius: 1.0,
            barrier_max_attempts: 500,
            barrier_recover_below: -10.0,
            grove_trees: 30,
            grove_range: 100.0,
            grove_road_buffer: 60.0,
        }
    }
}

/// Footprint of something placed once for the life of the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticPlacement {
    pub position: Vector2<f32>,
    pub radius: f32,
}

/// Draws candidates until `count` are accepted or the attempt budget runs out.
#[derive(Clone, Copy, Debug)]
pub struct RejectionSampler {
    pub min_origin_distance: f32,
    pub radius: f32,
    pub max_attempts: usize,
}

impl RejectionSampler {
    /// Accepted candidates are appended to `occupied` as they are found, so
    /// later candidates in the same batch are tested against them too.
    pub fn sample<F>(&self, count: usize, occupied: &mut Vec<StaticPlacement>, mut draw: F) -> Vec<Vector2<f32>>
    where
        F: FnMut() -> Vector2<f32>,
    {
        let mut accepted = Vec::new();
        let mut attempts = 0;
        while accepted.len() < count && attempts < self.max_attempts {
            attempts += 1;
            let candidate = draw();
            if candidate.norm() < self.min_origin_distance {
                continue;
            }
            if occupied.iter().any(|p| (p.position - candidate).norm() < p.radius + self.radius) {
                continue;
            }
            occupied.push(StaticPlacement { position: candidate, radius: self.radius });
            accepted.push(candidate);
        }
        if accepted.len() < count {
            log::warn!("placed {} of {} after {} attempts", accepted.len(), count, attempts);
        }
        accepted
    }
}

/// Houses, traffic cones and the starting grove. Nothing here is streamed.
pub struct StaticWorld {
    config: PlacementConfig,
    pub houses: Vec<PlacedObject>,
    pub barriers: Vec<PlacedObject>,
    pub grove: Vec<PlacedObject>,
    occupied: Vec<StaticPlacement>,
}

impl StaticWorld {
    pub fn new(config: PlacementConfig) -> Self {
        StaticWorld { config, houses: Vec::new(), barriers: Vec::new(), grove: Vec::new(), occupied: Vec::new() }
    }

    pub fn placements(&self) -> &[StaticPlacement] {
        &self.occupied
    }

    pub fn place_houses<R: Rng>(
        &mut self,
        n: usize,
        min_distance_from_origin: f32,
        min_separation: f32,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        rng: &mut R,
    ) -> usize {
        let sampler = RejectionSampler {
            min_origin_distance: min_distance_from_origin,
            radius: min_separation / 2.0,
            max_attempts: self.config.house_max_attempts,
        };
        let map_size = self.config.map_size;
        let spots = sampler.sample(n, &mut self.occupied, || {
            Vector2::new(rng.gen::<f32>() * map_size, rng.gen::<f32>() * map_size)
        });

        let [w, h, d] = self.config.house_size;
        for spot in &spots {
            let model = match self.config.house_models.len() {
                0 => "house",
                len => self.config.house_models[rng.gen_range(0..len)].as_str(),
            };
            let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), rng.gen::<f32>() * TAU);
            let spec = BodySpec::fixed(Vector3::new(spot.x, h / 2.0, spot.y))
                .with_rotation(yaw)
                .with_collider(Shape::Cuboid(Vector3::new(w / 2.0, h / 2.0, d / 2.0)), Material::Default);
            let house = PlacedObject::spawn(ObjectKind::House, model, 1.0, spec, world, visuals);
            // The model's origin sits on the ground, not at the box centre.
            visuals.set_transform(house.visual, Vector3::new(spot.x, 0.0, spot.y), yaw);
            self.houses.push(house);
        }
        log::info!("placed {} houses", spots.len());
        spots.len()
    }

    /// Traffic cones just off the road centre line, on either side.
    pub fn place_barriers<R: Rng>(
        &mut self,
        count: usize,
        road: &Road,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        rng: &mut R,
    ) -> usize {
        let points = road.polyline();
        if points.is_empty() {
            return 0;
        }
        let sampler = RejectionSampler {
            min_origin_distance: 0.0,
            radius: self.config.barrier_radius,
            max_attempts: self.config.barrier_max_attempts,
        };
        let lateral = self.config.barrier_lateral;
        let spots = sampler.sample(count, &mut self.occupied, || {
            let index = rng.gen_range(0..points.len());
            let point = points[index];
            let side = if rng.gen::<f32>() > 0.5 { 1.0 } else { -1.0 };
            let distance = lateral - rng.gen::<f32>();
            let at = point + road.perpendicular_at_index(index) * side * distance;
            Vector2::new(at.x, at.z)
        });

        for spot in &spots {
            let scale = 1.0 + rng.gen::<f32>() * 0.5;
            let spec = BodySpec::dynamic(1.0, Vector3::new(spot.x, 0.4 * scale, spot.y))
                .with_damping(0.8, 0.8)
                .with_collider(Shape::Cone { half_height: 0.4 * scale, radius: 0.3 * scale }, Material::Prop);
            self.barriers.push(PlacedObject::spawn(ObjectKind::TrafficCone, "traffic_cone", scale, spec, world, visuals));
        }
        log::info!("placed {} traffic cones", spots.len());
        spots.len()
    }

    /// Trees scattered around the world origin, skipping spots on the road.
    pub fn place_grove<R: Rng>(
        &mut self,
        count: usize,
        road: &Road,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        rng: &mut R,
    ) -> usize {
        let range = self.config.grove_range;
        let before = self.grove.len();
        for _ in 0..count {
            let x = (rng.gen::<f32>() - 0.5) * range * 2.0;
            let z = (rng.gen::<f32>() - 0.5) * range * 2.0;
            if road.is_on_road(x, z, self.config.grove_road_buffer) {
                continue;
            }
            let tree = Tree::grove(rng);
            self.grove.push(tree.spawn(x, z, world, visuals));
        }
        self.grove.len() - before
    }

    /// Puts fallen cones back on their feet. Returns how many were recovered.
    pub fn update_barriers(&mut self, world: &mut PhysicsWorld) -> usize {
        let floor = self.config.barrier_recover_below;
        let mut recovered = 0;
        for cone in &self.barriers {
            let Some((position, rotation)) = world.pose(cone.body) else { continue };
            if position.y < floor {
                world.set_pose(cone.body, Vector3::new(position.x, 1.0, position.z), rotation);
                world.zero_motion(cone.body);
                recovered += 1;
            }
        }
        recovered
    }

    pub fn sync_visuals(&self, world: &PhysicsWorld, visuals: &mut Visuals) {
        for cone in &self.barriers {
            cone.sync(world, visuals);
        }
    }
}
