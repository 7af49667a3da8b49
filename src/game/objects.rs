use crate::engine::physics::{BodyHandle, BodySpec, PhysicsWorld};
use crate::engine::visual::{VisualId, Visuals};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    PineTree,
    GreenTree,
    House,
    TrafficCone,
    Collectible,
    BotCar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(pub u32);

/// Anything placed in the world: one body, one visual.
#[derive(Debug)]
pub struct PlacedObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub body: BodyHandle,
    pub visual: VisualId,
}

impl PlacedObject {
    /// Object ids reuse the visual registry's counter, so they are unique per world.
    pub fn spawn(
        kind: ObjectKind,
        model: &str,
        scale: f32,
        spec: BodySpec,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
    ) -> Self {
        let (position, rotation) = (spec.position, spec.rotation);
        let body = world.add_body(spec);
        let visual = visuals.request(model);
        visuals.set_transform(visual, position, rotation);
        visuals.set_scale(visual, scale);
        PlacedObject { id: ObjectId(visual.0), kind, body, visual }
    }

    /// Copies the body transform onto the visual.
    pub fn sync(&self, world: &PhysicsWorld, visuals: &mut Visuals) {
        if let Some((position, rotation)) = world.pose(self.body) {
            visuals.set_transform(self.visual, position, rotation);
        }
    }

    pub fn dispose(self, world: &mut PhysicsWorld, visuals: &mut Visuals) {
        world.remove_body(self.body);
        visuals.release(self.visual);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::{Material, PhysicsConfig, Shape};
    use nalgebra::Vector3;

    #[test]
    fn dispose_releases_body_and_visual() {
        let mut world = PhysicsWorld::new(&PhysicsConfig::default());
        let mut visuals = Visuals::new();
        let object = PlacedObject::spawn(
            ObjectKind::House,
            "house1",
            1.0,
            BodySpec::fixed(Vector3::new(600.0, 5.0, 600.0))
                .with_collider(Shape::Cuboid(Vector3::new(7.5, 5.0, 7.5)), Material::Default),
            &mut world,
            &mut visuals,
        );
        let (body, visual) = (object.body, object.visual);
        assert!(world.contains(body));
        assert_eq!(visuals.get(visual).map(|v| v.position.x), Some(600.0));

        object.dispose(&mut world, &mut visuals);
        assert!(!world.contains(body));
        assert!(!visuals.is_live(visual));
    }
}
