use crate::engine::physics::{BodySpec, Material, PhysicsWorld, Shape};
use crate::engine::visual::Visuals;
use crate::game::objects::{ObjectKind, PlacedObject};
use crate::game::road::Road;
use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BotConfig {
    pub count: usize,
    pub models: Vec<String>,
    pub lane_offset: f32,
    pub jitter: f32,
    pub min_speed: f32,
    pub speed_range: f32,
    pub player_radius: f32,
    pub bot_radius: f32,
    pub player_factor: f32,
    pub bot_factor: f32,
    pub player_timer: u32,
    pub bot_timer: u32,
    pub smoothing: f32,
    pub height: f32,
    pub spawn_delay_ticks: u64,
    pub half_extents: [f32; 3],
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            count: 20,
            models: (1..=4).map(|i| format!("agent{}", i)).collect(),
            lane_offset: 7.0,
            jitter: 10.0,
            min_speed: 0.0002,
            speed_range: 0.0003,
            player_radius: 15.0,
            bot_radius: 8.0,
            player_factor: 0.5,
            bot_factor: 0.3,
            player_timer: 60,
            bot_timer: 30,
            smoothing: 0.05,
            height: 0.5,
            spawn_delay_ticks: 60,
            half_extents: [1.0, 1.0, 2.0],
        }
    }
}

/// Road-following traffic. `t` is the arc-length parameter along the loop.
#[derive(Clone, Debug, PartialEq)]
pub struct BotAgent {
    pub t: f32,
    pub direction: f32,
    pub lane: u8,
    pub jitter: f32,
    pub base_speed: f32,
    pub current_speed: f32,
    pub target_speed: f32,
    pub avoidance_timer: u32,
    pub position: Vector3<f32>,
}

impl BotAgent {
    pub fn random<R: Rng>(t: f32, config: &BotConfig, rng: &mut R) -> Self {
        let base_speed = config.min_speed + rng.gen::<f32>() * config.speed_range;
        BotAgent {
            t,
            jitter: (rng.gen::<f32>() - 0.5) * config.jitter,
            direction: if rng.gen::<f32>() > 0.5 { 1.0 } else { -1.0 },
            lane: rng.gen_range(0..2),
            base_speed,
            current_speed: base_speed,
            target_speed: base_speed,
            avoidance_timer: 0,
            position: Vector3::zeros(),
        }
    }

    /// Picks a target speed from the surroundings and eases toward it.
    /// `others` holds every bot position, including this bot's own at `index`.
    pub fn update_ai(&mut self, player: Vector3<f32>, others: &[Vector3<f32>], index: usize, config: &BotConfig) {
        if (player - self.position).norm() < config.player_radius {
            self.target_speed = self.base_speed * config.player_factor;
            self.avoidance_timer = config.player_timer;
        } else if self.avoidance_timer > 0 {
            self.avoidance_timer -= 1;
        } else {
            self.target_speed = self.base_speed;
        }

        for (i, other) in others.iter().enumerate() {
            if i != index && (other - self.position).norm() < config.bot_radius {
                self.target_speed = self.base_speed * config.bot_factor;
                self.avoidance_timer = self.avoidance_timer.max(config.bot_timer);
            }
        }

        self.current_speed += (self.target_speed - self.current_speed) * config.smoothing;
    }

    pub fn advance(&mut self) {
        self.t = (self.t + self.current_speed * self.direction).rem_euclid(1.0);
        // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
        if self.t >= 1.0 {
            self.t = 0.0;
        }
    }

    pub fn lateral_offset(&self, config: &BotConfig) -> f32 {
        let lane = if self.lane == 0 { -config.lane_offset } else { config.lane_offset };
        lane + self.jitter
    }

    /// Pose on the road at the current `t`, facing the direction of travel.
    pub fn pose(&self, road: &Road, config: &BotConfig) -> (Vector3<f32>, UnitQuaternion<f32>) {
        let center = road.point_at(self.t);
        let tangent = road.tangent_at(self.t);
        let mut position = center + road.perpendicular_at(self.t) * self.lateral_offset(config);
        position.y += config.height;

        let heading = Vector3::new(tangent.x, 0.0, tangent.z) * self.direction;
        let rotation = if heading.norm_squared() > 1e-12 {
            UnitQuaternion::face_towards(&heading, &Vector3::y())
        } else {
            UnitQuaternion::identity()
        };
        (position, rotation)
    }
}

pub struct Bot {
    pub agent: BotAgent,
    pub object: PlacedObject,
}

pub struct BotManager {
    config: BotConfig,
    pub bots: Vec<Bot>,
}

impl BotManager {
    pub fn new(config: BotConfig) -> Self {
        BotManager { config, bots: Vec::new() }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn spawn_population<R: Rng>(&mut self, road: &Road, world: &mut PhysicsWorld, visuals: &mut Visuals, rng: &mut R) {
        let count = self.config.count;
        self.refresh(count, road, world, visuals, rng);
    }

    /// Disposes every bot and creates `n` new ones spread evenly along the loop.
    pub fn refresh<R: Rng>(
        &mut self,
        n: usize,
        road: &Road,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
        rng: &mut R,
    ) {
        self.dispose_all(world, visuals);
        let [hx, hy, hz] = self.config.half_extents;
        for i in 0..n {
            let mut agent = BotAgent::random(i as f32 / n as f32, &self.config, rng);
            let (position, rotation) = agent.pose(road, &self.config);
            agent.position = position;

            let model = if self.config.models.is_empty() {
                "agent1"
            } else {
                self.config.models[i % self.config.models.len()].as_str()
            };
            let spec = BodySpec::kinematic(position)
                .with_rotation(rotation)
                .with_collider(Shape::Cuboid(Vector3::new(hx, hy, hz)), Material::Default);
            let object = PlacedObject::spawn(ObjectKind::BotCar, model, 1.0, spec, world, visuals);
            self.bots.push(Bot { agent, object });
        }
        log::info!("spawned {} bot cars", self.bots.len());
    }

    pub fn dispose_all(&mut self, world: &mut PhysicsWorld, visuals: &mut Visuals) {
        for bot in self.bots.drain(..) {
            bot.object.dispose(world, visuals);
        }
    }

    pub fn positions(&self) -> Vec<Vector3<f32>> {
        self.bots.iter().map(|b| b.agent.position).collect()
    }

    /// Runs the AI for every bot against start-of-tick positions, then moves them all.
    pub fn update(&mut self, player: Vector3<f32>, road: &Road, world: &mut PhysicsWorld, visuals: &mut Visuals) {
        let snapshot = self.positions();
        for (i, bot) in self.bots.iter_mut().enumerate() {
            bot.agent.update_ai(player, &snapshot, i, &self.config);
        }
        for bot in self.bots.iter_mut() {
            bot.agent.advance();
            let (position, rotation) = bot.agent.pose(road, &self.config);
            bot.agent.position = position;
            world.set_kinematic_pose(bot.object.body, position, rotation);
            visuals.set_transform(bot.object.visual, position, rotation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::PhysicsConfig;
    use crate::game::road::RoadConfig;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn agent(direction: f32) -> BotAgent {
        BotAgent {
            t: 0.5,
            direction,
            lane: 0,
            jitter: 0.0,
            base_speed: 0.0004,
            current_speed: 0.0004,
            target_speed: 0.0004,
            avoidance_timer: 0,
            position: Vector3::zeros(),
        }
    }

    #[test]
    fn parameter_wraps_in_both_directions() {
        let mut forward = agent(1.0);
        forward.t = 0.9999;
        forward.advance();
        assert!((0.0..1.0).contains(&forward.t));
        assert!(forward.t < 0.001);

        let mut backward = agent(-1.0);
        backward.t = 0.0001;
        backward.advance();
        assert!((0.0..1.0).contains(&backward.t));
        assert!(backward.t > 0.999);

        let mut rng = SmallRng::seed_from_u64(2);
        let mut bot = agent(-1.0);
        for _ in 0..10_000 {
            bot.current_speed = rng.gen::<f32>() * 0.01;
            bot.advance();
            assert!((0.0..1.0).contains(&bot.t));
        }
    }

    #[test]
    fn slows_near_player_and_holds_for_the_timer() {
        let config = BotConfig::default();
        let mut bot = agent(1.0);
        bot.update_ai(Vector3::new(10.0, 0.0, 0.0), &[Vector3::zeros()], 0, &config);
        assert_eq!(bot.target_speed, 0.0002);
        assert_eq!(bot.avoidance_timer, 60);

        let far = Vector3::new(500.0, 0.0, 0.0);
        for remaining in (0..60).rev() {
            bot.update_ai(far, &[Vector3::zeros()], 0, &config);
            assert_eq!(bot.avoidance_timer, remaining);
            assert_eq!(bot.target_speed, 0.0002);
        }
        bot.update_ai(far, &[Vector3::zeros()], 0, &config);
        assert_eq!(bot.target_speed, bot.base_speed);
    }

    #[test]
    fn slows_behind_other_bots_and_ignores_itself() {
        let config = BotConfig::default();
        let far = Vector3::new(500.0, 0.0, 0.0);

        let mut alone = agent(1.0);
        alone.update_ai(far, &[Vector3::zeros()], 0, &config);
        assert_eq!(alone.target_speed, alone.base_speed);

        let mut crowded = agent(1.0);
        crowded.avoidance_timer = 10;
        crowded.update_ai(far, &[Vector3::zeros(), Vector3::new(5.0, 0.0, 0.0)], 0, &config);
        assert!((crowded.target_speed - 0.00012).abs() < 1e-9);
        assert_eq!(crowded.avoidance_timer, 30);
    }

    #[test]
    fn slowest_target_and_longest_timer_win() {
        let config = BotConfig::default();
        let mut bot = agent(1.0);
        let player = Vector3::new(10.0, 0.0, 0.0);
        let others = [Vector3::zeros(), Vector3::new(0.0, 0.0, 5.0)];
        bot.update_ai(player, &others, 0, &config);

        assert!((bot.target_speed - bot.base_speed * 0.3).abs() < 1e-9);
        assert_eq!(bot.avoidance_timer, 60);
    }

    #[test]
    fn speed_eases_toward_target() {
        let config = BotConfig::default();
        let mut bot = agent(1.0);
        bot.update_ai(Vector3::new(1.0, 0.0, 0.0), &[Vector3::zeros()], 0, &config);
        let expected = 0.0004 + (0.0002 - 0.0004) * 0.05;
        assert!((bot.current_speed - expected).abs() < 1e-9);
        assert!(bot.current_speed > bot.target_speed);
    }

    #[test]
    fn pose_sits_in_lane_and_faces_travel() {
        let road = Road::generate(&RoadConfig::default());
        let config = BotConfig::default();
        let bot = agent(-1.0);
        let (position, rotation) = bot.pose(&road, &config);

        let center = road.point_at(0.5);
        let lateral = Vector3::new(position.x - center.x, 0.0, position.z - center.z).norm();
        assert!((lateral - 7.0).abs() < 1e-3);
        assert!((position.y - center.y - 0.5).abs() < 1e-5);

        let tangent = road.tangent_at(0.5);
        let facing = rotation * Vector3::z();
        assert!(facing.dot(&tangent) < -0.99);
    }

    #[test]
    fn refresh_replaces_the_whole_population() {
        let road = Road::generate(&RoadConfig::default());
        let mut world = PhysicsWorld::new(&PhysicsConfig::default());
        let mut visuals = Visuals::new();
        let mut rng = SmallRng::seed_from_u64(4);
        let mut bots = BotManager::new(BotConfig::default());

        bots.spawn_population(&road, &mut world, &mut visuals, &mut rng);
        assert_eq!(bots.bots.len(), 20);
        assert_eq!(world.body_count(), 20);
        let old: Vec<_> = bots.bots.iter().map(|b| b.object.body).collect();
        for (i, bot) in bots.bots.iter().enumerate() {
            assert!((bot.agent.t - i as f32 / 20.0).abs() < 1e-6);
        }

        bots.refresh(5, &road, &mut world, &mut visuals, &mut rng);
        assert_eq!(bots.bots.len(), 5);
        assert_eq!(world.body_count(), 5);
        assert_eq!(visuals.live_count(), 5);
        assert!(old.iter().all(|b| !world.contains(*b)));
    }

    #[test]
    fn update_moves_every_bot_along_the_road() {
        let road = Road::generate(&RoadConfig::default());
        let mut world = PhysicsWorld::new(&PhysicsConfig::default());
        let mut visuals = Visuals::new();
        let mut rng = SmallRng::seed_from_u64(8);
        let mut bots = BotManager::new(BotConfig::default());
        bots.spawn_population(&road, &mut world, &mut visuals, &mut rng);

        let before: Vec<f32> = bots.bots.iter().map(|b| b.agent.t).collect();
        bots.update(Vector3::new(1e4, 0.0, 1e4), &road, &mut world, &mut visuals);
        for (bot, t) in bots.bots.iter().zip(before) {
            assert_ne!(bot.agent.t, t);
            let (expected, _) = bot.agent.pose(&road, bots.config());
            assert_eq!(bot.agent.position, expected);
            assert_eq!(visuals.get(bot.object.visual).map(|v| v.position), Some(expected));
        }
    }
}
