use crate::engine::physics::{BodySpec, Material, PhysicsWorld, Shape};
use crate::engine::visual::Visuals;
use crate::game::objects::{ObjectKind, PlacedObject};
use crate::game::road::Road;
use nalgebra::{Vector2, Vector3};
use rand::Rng;
use std::f32::consts::TAU;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tree {
    Pine { height: f32, trunk_radius: f32 },
    Green { height: f32, scale: f32 },
}

impl Tree {
    /// Forest mix: even odds, compact sizes.
    pub fn forest<R: Rng>(rng: &mut R) -> Self {
        if rng.gen::<f32>() < 0.5 {
            Tree::Pine {
                height: rng.gen::<f32>() * 10.0 + 5.0,
                trunk_radius: rng.gen::<f32>() * 0.2 + 0.15,
            }
        } else {
            Tree::Green { height: rng.gen::<f32>() * 8.0 + 7.0, scale: rng.gen::<f32>() * 1.3 + 1.0 }
        }
    }

    /// Grove mix: pine-heavy and a little taller.
    pub fn grove<R: Rng>(rng: &mut R) -> Self {
        if rng.gen::<f32>() < 0.6 {
            Tree::Pine {
                height: rng.gen::<f32>() * 10.0 + 6.0,
                trunk_radius: rng.gen::<f32>() * 0.3 + 0.2,
            }
        } else {
            Tree::Green { height: rng.gen::<f32>() * 8.0 + 8.0, scale: rng.gen::<f32>() * 1.5 + 1.2 }
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Tree::Pine { .. } => ObjectKind::PineTree,
            Tree::Green { .. } => ObjectKind::GreenTree,
        }
    }

    /// Fixed body rooted at ground level. Pines collide on the trunk only,
    /// green trees also on their round canopy.
    pub fn body(&self, x: f32, z: f32) -> BodySpec {
        let root = BodySpec::fixed(Vector3::new(x, 0.0, z));
        match *self {
            Tree::Pine { height, trunk_radius } => {
                let trunk = height * 0.3;
                root.with_collider_at(
                    Shape::Cylinder { half_height: trunk / 2.0, radius: trunk_radius },
                    Vector3::new(0.0, trunk / 2.0, 0.0),
                    Material::Default,
                )
            }
            Tree::Green { height, scale } => {
                let trunk = height * 0.4;
                let canopy = (2.5 * scale).max(3.0);
                root.with_collider_at(
                    Shape::Cylinder { half_height: trunk / 2.0, radius: 0.5 * scale },
                    Vector3::new(0.0, trunk / 2.0, 0.0),
                    Material::Default,
                )
                .with_collider_at(
                    Shape::Ball(canopy),
                    Vector3::new(0.0, trunk + canopy * 0.8, 0.0),
                    Material::Default,
                )
            }
        }
    }

    pub fn spawn(&self, x: f32, z: f32, world: &mut PhysicsWorld, visuals: &mut Visuals) -> PlacedObject {
        let (model, scale) = match *self {
            Tree::Pine { height, .. } => ("pine_tree", height / 10.0),
            Tree::Green { scale, .. } => ("green_tree", scale),
        };
        PlacedObject::spawn(self.kind(), model, scale, self.body(x, z), world, visuals)
    }
}

/// Circular patch of trees kept clear of the road.
#[derive(Clone, Copy, Debug)]
pub struct ForestArea {
    pub center: Vector2<f32>,
    pub radius: f32,
    pub density: usize,
    pub road_buffer: f32,
}

impl ForestArea {
    /// Places up to `density` trees within `density * 3` attempts.
    pub fn populate<R: Rng>(
        &self,
        road: &Road,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        rng: &mut R,
    ) -> Vec<PlacedObject> {
        let mut trees = Vec::new();
        let mut attempts = 0;
        while trees.len() < self.density && attempts < self.density * 3 {
            attempts += 1;
            let angle = rng.gen::<f32>() * TAU;
            let distance = rng.gen::<f32>() * self.radius;
            let x = self.center.x + angle.cos() * distance;
            let z = self.center.y + angle.sin() * distance;
            if road.is_on_road(x, z, self.road_buffer) {
                continue;
            }
            trees.push(Tree::forest(rng).spawn(x, z, world, visuals));
        }
        trees
    }
}
