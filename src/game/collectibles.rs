use crate::engine::physics::{BodySpec, PhysicsWorld, Shape};
use crate::engine::visual::Visuals;
use crate::game::objects::{ObjectKind, PlacedObject};
use crate::game::road::Road;
use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CollectibleConfig {
    pub max_collectibles: usize,
    pub collect_distance: f32,
    pub reward: u32,
    pub milestone: u32,
    pub respawn_delay_ticks: u64,
    pub trigger_radius: f32,
    pub spawn_height: f32,
    pub spawn_spread: f32,
    pub respawn_height: f32,
    pub respawn_spread: f32,
    pub bob_amplitude: f32,
    pub model: String,
}

impl Default for CollectibleConfig {
    fn default() -> Self {
        CollectibleConfig {
            max_collectibles: 50,
            collect_distance: 3.0,
            reward: 10,
            milestone: 100,
            respawn_delay_ticks: 120,
            trigger_radius: 1.2,
            spawn_height: 1.5,
            spawn_spread: 10.0,
            respawn_height: 2.0,
            respawn_spread: 20.0,
            bob_amplitude: 0.5,
            model: "teapot".to_string(),
        }
    }
}

/// Score sink shared by everything that awards points.
#[derive(Clone, Debug)]
pub struct Scoreboard {
    score: u32,
    milestone: u32,
}

impl Scoreboard {
    pub fn new(milestone: u32) -> Self {
        Scoreboard { score: 0, milestone }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    /// Adds `points` and returns how many milestone multiples were crossed.
    pub fn award(&mut self, points: u32) -> u32 {
        let before = self.score;
        self.score = self.score.saturating_add(points);
        if self.milestone == 0 {
            return 0;
        }
        self.score / self.milestone - before / self.milestone
    }
}

#[derive(Debug)]
pub struct Collectible {
    pub position: Vector3<f32>,
    pub object: Option<PlacedObject>,
    pub collected: bool,
    base_height: f32,
    spin: f32,
    spin_speed: f32,
    bob_speed: f32,
}

impl Collectible {
    pub fn is_live(&self) -> bool {
        !self.collected && self.object.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Collection {
    pub index: usize,
    pub position: Vector3<f32>,
    pub milestones: u32,
}

pub struct CollectibleManager {
    config: CollectibleConfig,
    pub items: Vec<Collectible>,
}

impl CollectibleManager {
    pub fn new(config: CollectibleConfig) -> Self {
        CollectibleManager { config, items: Vec::new() }
    }

    pub fn config(&self) -> &CollectibleConfig {
        &self.config
    }

    /// Replaces every slot with `n` fresh collectibles (capped at `max_collectibles`).
    pub fn spawn_all<R: Rng>(
        &mut self,
        n: usize,
        road: &Road,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        rng: &mut R,
    ) {
        self.clear(world, visuals);
        let n = n.min(self.config.max_collectibles);
        for _ in 0..n {
            let item = self.spawn_one(road, world, visuals, rng, self.config.spawn_spread, self.config.spawn_height);
            self.items.push(item);
        }
        log::info!("spawned {} collectibles", self.items.len());
    }

    pub fn clear(&mut self, world: &mut PhysicsWorld, visuals: &mut Visuals) {
        for item in self.items.drain(..) {
            if let Some(object) = item.object {
                object.dispose(world, visuals);
            }
        }
    }

    fn spawn_one<R: Rng>(
        &self,
        road: &Road,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        rng: &mut R,
        spread: f32,
        height: f32,
    ) -> Collectible {
        let t = rng.gen::<f32>();
        let point = road.point(t);
        let tangent = road.tangent(t);
        let perpendicular = Vector3::new(-tangent.z, 0.0, tangent.x);
        let offset = (rng.gen::<f32>() - 0.5) * spread;
        let position = Vector3::new(point.x, height, point.z) + perpendicular * offset;

        let object = PlacedObject::spawn(
            ObjectKind::Collectible,
            &self.config.model,
            1.0,
            BodySpec::fixed(position).with_trigger(Shape::Ball(self.config.trigger_radius)),
            world,
            visuals,
        );
        Collectible {
            position,
            object: Some(object),
            collected: false,
            base_height: height,
            spin: 0.0,
            spin_speed: rng.gen::<f32>() * 0.02 + 0.01,
            bob_speed: rng.gen::<f32>() * 0.003 + 0.002,
        }
    }

    /// Collects every live collectible within reach of `vehicle`.
    pub fn check_collisions(
        &mut self,
        vehicle: Vector3<f32>,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        score: &mut Scoreboard,
    ) -> Vec<Collection> {
        let reach = self.config.collect_distance;
        let hits: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_live() && (item.position - vehicle).norm() < reach)
            .map(|(i, _)| i)
            .collect();
        hits.into_iter()
            .filter_map(|i| self.collect(i, world, visuals, score))
            .collect()
    }

    /// Marks slot `index` collected and awards the reward. A second call on the same slot does nothing.
    ///
    /// The caller schedules the replacement with [`CollectibleManager::respawn`].
    pub fn collect(
        &mut self,
        index: usize,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        score: &mut Scoreboard,
    ) -> Option<Collection> {
        let item = self.items.get_mut(index)?;
        if item.collected {
            return None;
        }
        item.collected = true;
        if let Some(object) = item.object.take() {
            object.dispose(world, visuals);
        }
        let milestones = score.award(self.config.reward);
        log::debug!("collectible {index} taken, score {}", score.score());
        Some(Collection { index, position: item.position, milestones })
    }

    /// Replaces a collected slot in place with a fresh collectible.
    pub fn respawn<R: Rng>(
        &mut self,
        index: usize,
        road: &Road,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        rng: &mut R,
    ) -> bool {
        match self.items.get(index) {
            Some(item) if item.collected => {}
            _ => return false,
        }
        let item = self.spawn_one(road, world, visuals, rng, self.config.respawn_spread, self.config.respawn_height);
        self.items[index] = item;
        true
    }

    /// Spin and bob; the trigger body follows the visual.
    pub fn animate(&mut self, time_ms: f64, world: &mut PhysicsWorld, visuals: &mut Visuals) {
        let amplitude = self.config.bob_amplitude;
        for item in self.items.iter_mut() {
            let Some(object) = item.object.as_ref() else { continue };
            item.spin += item.spin_speed;
            item.position.y = item.base_height + ((time_ms * item.bob_speed as f64).sin() as f32) * amplitude;
            let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), item.spin);
            world.set_pose(object.body, item.position, rotation);
            visuals.set_transform(object.visual, item.position, rotation);
        }
    }

    pub fn live_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_live()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::PhysicsConfig;
    use crate::game::road::RoadConfig;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    struct Fixture {
        road: Road,
        world: PhysicsWorld,
        visuals: Visuals,
        rng: SmallRng,
        score: Scoreboard,
        manager: CollectibleManager,
    }

    fn fixture(n: usize) -> Fixture {
        let mut f = Fixture {
            road: Road::generate(&RoadConfig::default()),
            world: PhysicsWorld::new(&PhysicsConfig::default()),
            visuals: Visuals::new(),
            rng: SmallRng::seed_from_u64(11),
            score: Scoreboard::new(100),
            manager: CollectibleManager::new(CollectibleConfig::default()),
        };
        f.manager.spawn_all(n, &f.road, &mut f.world, &mut f.visuals, &mut f.rng);
        f
    }

    #[test]
    fn spawned_collectibles_sit_beside_the_road() {
        let f = fixture(50);
        assert_eq!(f.manager.items.len(), 50);
        for item in &f.manager.items {
            assert!(f.road.distance_to(item.position.x, item.position.z) < 10.0);
            assert_eq!(item.position.y, 1.5);
            let body = item.object.as_ref().map(|o| o.body);
            assert!(body.is_some_and(|b| f.world.is_trigger_body(b)));
        }
    }

    #[test]
    fn spawn_all_clears_previous_population() {
        let mut f = fixture(10);
        let bodies = f.world.body_count();
        f.manager.spawn_all(5, &f.road, &mut f.world, &mut f.visuals, &mut f.rng);
        assert_eq!(f.manager.items.len(), 5);
        assert_eq!(f.world.body_count(), bodies - 5);

        // Never more than the configured cap.
        f.manager.spawn_all(500, &f.road, &mut f.world, &mut f.visuals, &mut f.rng);
        assert_eq!(f.manager.items.len(), 50);
    }

    #[test]
    fn collect_is_idempotent() {
        let mut f = fixture(3);
        let body = f.manager.items[1].object.as_ref().map(|o| o.body);

        let first = f.manager.collect(1, &mut f.world, &mut f.visuals, &mut f.score);
        let second = f.manager.collect(1, &mut f.world, &mut f.visuals, &mut f.score);
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(f.score.score(), 10);

        // Collected entries hold no live handles.
        assert!(f.manager.items[1].object.is_none());
        assert!(body.is_some_and(|b| !f.world.contains(b)));
        assert!(f.manager.collect(99, &mut f.world, &mut f.visuals, &mut f.score).is_none());
    }

    #[test]
    fn tenth_pickup_crosses_the_first_milestone() {
        let mut f = fixture(10);
        let crossings: Vec<u32> = (0..10)
            .filter_map(|i| f.manager.collect(i, &mut f.world, &mut f.visuals, &mut f.score))
            .map(|c| c.milestones)
            .collect();
        assert_eq!(crossings, vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(f.score.score(), 100);
    }

    #[test]
    fn milestone_counts_crossings_for_any_reward() {
        let mut score = Scoreboard::new(100);
        assert_eq!(score.award(30), 0);
        assert_eq!(score.award(80), 1);
        assert_eq!(score.award(90), 1);
        assert_eq!(score.award(250), 2);
        assert_eq!(score.score(), 450);
        assert_eq!(Scoreboard::new(0).award(500), 0);
    }

    #[test]
    fn check_collisions_uses_straight_line_distance() {
        let mut f = fixture(4);
        let target = f.manager.items[2].position;

        let near = target + Vector3::new(0.0, 2.0, 1.0);
        let hits = f.manager.check_collisions(near, &mut f.world, &mut f.visuals, &mut f.score);
        assert!(hits.iter().any(|c| c.index == 2));
        assert!(f.manager.items[2].collected);

        let far = target + Vector3::new(0.0, 3.5, 0.0);
        f.manager.items[3].position = target;
        let hits = f.manager.check_collisions(far, &mut f.world, &mut f.visuals, &mut f.score);
        assert!(hits.is_empty());
    }

    #[test]
    fn respawn_replaces_only_collected_slots() {
        let mut f = fixture(4);
        assert!(!f.manager.respawn(0, &f.road, &mut f.world, &mut f.visuals, &mut f.rng));

        f.manager.collect(0, &mut f.world, &mut f.visuals, &mut f.score);
        assert_eq!(f.manager.live_count(), 3);
        assert!(f.manager.respawn(0, &f.road, &mut f.world, &mut f.visuals, &mut f.rng));
        assert_eq!(f.manager.live_count(), 4);
        assert_eq!(f.manager.items.len(), 4);
        assert_eq!(f.manager.items[0].position.y, 2.0);
        assert!(f.road.distance_to(f.manager.items[0].position.x, f.manager.items[0].position.z) < 15.0);
    }

    #[test]
    fn animation_moves_trigger_with_the_visual() {
        let mut f = fixture(1);
        f.manager.animate(400.0, &mut f.world, &mut f.visuals);
        let item = &f.manager.items[0];
        let Some(object) = item.object.as_ref() else { panic!("live collectible expected") };
        assert!((item.position.y - 1.5).abs() <= 0.5 + 1e-4);
        assert_eq!(f.world.position(object.body), Some(item.position));
        assert_eq!(f.visuals.get(object.visual).map(|v| v.position), Some(item.position));
    }
}
