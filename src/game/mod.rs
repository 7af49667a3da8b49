pub mod bots;
pub mod chunks;
pub mod collectibles;
pub mod config;
pub mod fireworks;
pub mod objects;
pub mod placement;
pub mod road;
pub mod schedule;
pub mod vegetation;

use crate::engine::physics::PhysicsWorld;
use crate::engine::vehicle::{Vehicle, WheelPose};
use crate::engine::visual::{AssetRequest, VisualFrame, VisualId, Visuals};
use bots::BotManager;
use chunks::ChunkManager;
use collectibles::{CollectibleManager, Scoreboard};
use config::AppConfig;
use fireworks::{Fireworks, FireworksFrame};
use nalgebra::{UnitQuaternion, Vector3};
use placement::StaticWorld;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use road::Road;
use schedule::Schedule;
use serde::{Deserialize, Serialize};

/// What the player wants this tick. Devices are mapped onto it by the glue.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct InputIntent {
    pub forward: i8,
    pub turn: i8,
    pub reset_requested: bool,
}

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct HudState {
    pub score: u32,
    pub speed_kmh: f32,
}

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl Pose {
    fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        let q = rotation.quaternion();
        Pose { position: [position.x, position.y, position.z], rotation: [q.i, q.j, q.k, q.w] }
    }
}

impl From<WheelPose> for Pose {
    fn from(wheel: WheelPose) -> Self {
        Pose::new(wheel.position, wheel.rotation)
    }
}

/// Everything the presentation layer needs after one tick.
#[derive(Serialize, Clone, Debug, Default)]
pub struct FrameState {
    pub tick: u64,
    pub hud: HudState,
    pub vehicle: Pose,
    pub wheels: Vec<Pose>,
    pub bots: Vec<[f32; 3]>,
    pub fireworks: FireworksFrame,
    pub visuals: Vec<VisualFrame>,
    pub requests: Vec<AssetRequest>,
    pub released: Vec<VisualId>,
    pub interpolation: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GameEvent {
    RespawnCollectible(usize),
    LaunchFirework(Vector3<f32>),
    SpawnBots,
}

pub struct Game {
    pub config: AppConfig,
    pub seed: u64,
    pub world: PhysicsWorld,
    pub visuals: Visuals,
    pub road: Road,
    pub vehicle: Vehicle,
    pub score: Scoreboard,
    pub collectibles: CollectibleManager,
    pub fireworks: Fireworks,
    pub statics: StaticWorld,
    pub chunks: ChunkManager,
    pub bots: BotManager,
    pub schedule: Schedule<GameEvent>,
    pub shows: u32,
    pub resets: u32,
    rng: SmallRng,
    last_time: Option<f64>,
    ticks: u64,
}

impl Game {
    pub fn new(config: AppConfig, seed: u64) -> Self {
        Self::build(config, seed, Visuals::new())
    }

    fn build(config: AppConfig, seed: u64, mut visuals: Visuals) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut world = PhysicsWorld::new(&config.physics);
        world.add_ground(config.physics.ground_height, config.physics.ground_half_extent);

        let road = Road::generate(&config.road);
        let spawn = road.point_at(0.5) + Vector3::new(0.0, config.vehicle.spawn_height, 0.0);
        let vehicle = Vehicle::new(&mut world, &mut visuals, config.vehicle.clone(), &config.car_model.path, spawn);
        visuals.set_scale(vehicle.visual, config.car_model.scale);

        let placement = &config.placement;
        let mut statics = StaticWorld::new(placement.clone());
        statics.place_houses(
            placement.houses,
            placement.house_min_origin_distance,
            placement.house_min_separation,
            &mut world,
            &mut visuals,
            &mut rng,
        );
        statics.place_barriers(placement.barriers, &road, &mut world, &mut visuals, &mut rng);
        statics.place_grove(placement.grove_trees, &road, &mut world, &mut visuals, &mut rng);

        let mut collectibles = CollectibleManager::new(config.collectibles.clone());
        collectibles.spawn_all(
            config.collectibles.max_collectibles,
            &road,
            &mut world,
            &mut visuals,
            &mut rng,
        );

        let mut chunks = ChunkManager::new(config.chunks.clone(), seed);
        chunks.update_chunks(spawn, &road, &mut world, &mut visuals);

        let mut schedule = Schedule::new();
        schedule.schedule(config.bots.spawn_delay_ticks, GameEvent::SpawnBots);

        log::info!("world ready, seed {}", seed);
        Game {
            score: Scoreboard::new(config.collectibles.milestone),
            fireworks: Fireworks::new(config.fireworks.clone()),
            bots: BotManager::new(config.bots.clone()),
            config,
            seed,
            world,
            visuals,
            road,
            vehicle,
            collectibles,
            statics,
            chunks,
            schedule,
            shows: 0,
            resets: 0,
            rng,
            last_time: None,
            ticks: 0,
        }
    }

    /// Tears the world down and builds a fresh one. Visual ids keep counting up
    /// so the presentation layer can tell old handles from new ones.
    pub fn restart(&mut self) {
        let seed = self.rng.gen();
        let mut visuals = std::mem::take(&mut self.visuals);
        visuals.release_all();
        *self = Self::build(self.config.clone(), seed, visuals);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn hud(&self) -> HudState {
        HudState { score: self.score.score(), speed_kmh: self.vehicle.speed_kmh(&self.world) }
    }

    pub fn asset_ready(&mut self, visual: VisualId, handle: u32) -> bool {
        self.visuals.resolve(visual, handle)
    }

    pub fn asset_failed(&mut self, visual: VisualId) {
        self.visuals.fail(visual);
    }

    pub fn road_polyline(&self) -> Vec<[f32; 3]> {
        self.road.polyline().iter().map(|p| [p.x, p.y, p.z]).collect()
    }

    /// One frame of simulation. Never blocks and never fails.
    pub fn tick(&mut self, now_ms: f64, input: InputIntent) -> FrameState {
        let elapsed = match self.last_time {
            Some(last) => ((now_ms - last) / 1000.0).max(0.0) as f32,
            None => 0.0,
        };
        self.last_time = Some(now_ms);
        self.ticks += 1;

        let physics = &self.config.physics;
        let vehicle = &mut self.vehicle;
        self.world
            .step(physics.fixed_dt, elapsed, physics.max_substeps, |world, dt| vehicle.update(world, dt));

        self.vehicle.set_drive_intent(input.forward, input.turn);
        if input.reset_requested {
            let at = self.vehicle.position(&self.world).unwrap_or_else(Vector3::zeros);
            self.reset_vehicle(at);
        }

        for event in self.schedule.advance() {
            self.handle_event(event);
        }
        self.check_collectibles();
        self.collectibles.animate(now_ms, &mut self.world, &mut self.visuals);
        self.fireworks.update(elapsed, &mut self.rng);

        let player = self.vehicle.position(&self.world).unwrap_or_else(Vector3::zeros);
        self.bots.update(player, &self.road, &mut self.world, &mut self.visuals);
        self.chunks.update_chunks(player, &self.road, &mut self.world, &mut self.visuals);
        self.check_bounds(player);

        self.statics.update_barriers(&mut self.world);
        self.statics.sync_visuals(&self.world, &mut self.visuals);
        let model = &self.config.car_model;
        self.vehicle
            .sync_visuals(&self.world, &mut self.visuals, &model.rotation_offset(), model.position_offset_y);

        self.frame()
    }

    fn handle_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::RespawnCollectible(index) => {
                self.collectibles
                    .respawn(index, &self.road, &mut self.world, &mut self.visuals, &mut self.rng);
            }
            GameEvent::LaunchFirework(origin) => self.fireworks.launch(origin, &mut self.rng),
            GameEvent::SpawnBots => {
                self.bots
                    .spawn_population(&self.road, &mut self.world, &mut self.visuals, &mut self.rng);
            }
        }
    }

    fn check_collectibles(&mut self) {
        let Some(position) = self.vehicle.position(&self.world) else { return };
        let taken = self
            .collectibles
            .check_collisions(position, &mut self.world, &mut self.visuals, &mut self.score);
        for collection in taken {
            let delay = self.collectibles.config().respawn_delay_ticks;
            self.schedule.schedule(delay, GameEvent::RespawnCollectible(collection.index));
            for _ in 0..collection.milestones {
                self.start_show(position);
            }
        }
    }

    /// Queues a whole fireworks show in front of the car.
    fn start_show(&mut self, car: Vector3<f32>) {
        let origin = self.fireworks.show_origin(car, self.vehicle.forward_direction(&self.world));
        let cfg = self.fireworks.config();
        for i in 0..cfg.launches as u64 {
            self.schedule.schedule(i * cfg.launch_interval_ticks, GameEvent::LaunchFirework(origin));
        }
        self.shows += 1;
        log::info!("milestone reached at score {}", self.score.score());
    }

    fn check_bounds(&mut self, position: Vector3<f32>) {
        let limit = self.config.map_limit;
        if position.x.abs() <= limit && position.z.abs() <= limit {
            return;
        }
        // Pull the anchor back inside so the jitter cannot push the car out again.
        let inner = (limit - self.vehicle.config().reset_jitter).max(0.0);
        let anchor = Vector3::new(position.x.clamp(-inner, inner), position.y.max(0.0), position.z.clamp(-inner, inner));
        log::warn!("vehicle left the map at ({:.0}, {:.0}), resetting", position.x, position.z);
        self.reset_vehicle(anchor);
    }

    fn reset_vehicle(&mut self, anchor: Vector3<f32>) {
        self.vehicle.reset_to_safe_position(&mut self.world, anchor, &mut self.rng);
        self.resets += 1;
    }

    fn frame(&mut self) -> FrameState {
        let vehicle = self
            .world
            .pose(self.vehicle.chassis)
            .map(|(p, r)| Pose::new(p, r))
            .unwrap_or_default();
        let wheels = self
            .vehicle
            .wheel_poses(&self.world)
            .map(|poses| poses.into_iter().map(Pose::from).collect())
            .unwrap_or_default();
        FrameState {
            tick: self.ticks,
            hud: self.hud(),
            vehicle,
            wheels,
            bots: self.bots.positions().iter().map(|p| [p.x, p.y, p.z]).collect(),
            fireworks: self.fireworks.frame(),
            visuals: self.visuals.take_frame(),
            requests: self.visuals.take_requests(),
            released: self.visuals.take_released(),
            interpolation: self.world.interpolation_alpha(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::visual::AssetState;

    const FRAME_MS: f64 = 1000.0 / 60.0;

    fn game() -> Game {
        Game::new(AppConfig::default(), 7)
    }

    fn run(game: &mut Game, ticks: usize, input: InputIntent) -> FrameState {
        let mut frame = FrameState::default();
        for _ in 0..ticks {
            let now = game.ticks() as f64 * FRAME_MS;
            frame = game.tick(now, input);
        }
        frame
    }

    fn teleport(game: &mut Game, to: Vector3<f32>) {
        game.world.set_pose(game.vehicle.chassis, to, UnitQuaternion::identity());
        game.world.zero_motion(game.vehicle.chassis);
    }

    #[test]
    fn first_tick_does_not_step_physics() {
        let mut game = game();
        let frame = game.tick(123_456.0, InputIntent::default());
        assert_eq!(game.world.steps(), 0);
        assert_eq!(frame.tick, 1);
        assert_eq!(frame.wheels.len(), 4);
        assert!(!frame.requests.is_empty());

        // A clock that runs backwards is treated as no time passing.
        game.tick(100_000.0, InputIntent::default());
        assert_eq!(game.world.steps(), 0);
        game.tick(100_000.0 + FRAME_MS, InputIntent::default());
        assert_eq!(game.world.steps(), 1);
    }

    #[test]
    fn runs_headless_without_any_assets() {
        let mut game = game();
        let inputs = [
            InputIntent { forward: 1, turn: 0, reset_requested: false },
            InputIntent { forward: 1, turn: -1, reset_requested: false },
            InputIntent { forward: 0, turn: 1, reset_requested: false },
            InputIntent { forward: -1, turn: 0, reset_requested: true },
        ];
        for input in inputs {
            let frame = run(&mut game, 60, input);
            assert!(frame.visuals.is_empty());
            assert!(frame.hud.speed_kmh.is_finite());
            assert!(frame.vehicle.position.iter().all(|v| v.is_finite()));
        }
        assert_eq!(game.ticks(), 240);
    }

    #[test]
    fn ready_assets_show_up_in_the_frame() {
        let mut game = game();
        let first = game.tick(0.0, InputIntent::default());
        let car = game.vehicle.visual;
        assert!(first.requests.iter().any(|r| r.visual == car && r.model == "car1"));

        assert!(game.asset_ready(car, 99));
        let frame = game.tick(FRAME_MS, InputIntent::default());
        assert!(frame.visuals.iter().any(|v| v.visual == car && v.handle == 99));

        let wheel = game.vehicle.wheels[0].visual;
        game.asset_failed(wheel);
        assert_eq!(game.visuals.state(wheel), Some(AssetState::Failed));
    }

    #[test]
    fn car_model_scale_reaches_its_visual() {
        let mut config = AppConfig::default();
        config.car_model.scale = 2.5;
        let mut game = Game::new(config, 7);
        let car = game.vehicle.visual;
        assert!(game.asset_ready(car, 1));
        let frame = game.tick(0.0, InputIntent::default());
        let scale = frame.visuals.iter().find(|v| v.visual == car).map(|v| v.scale);
        assert_eq!(scale, Some(2.5));
    }

    #[test]
    fn bots_arrive_after_the_spawn_delay() {
        let mut game = game();
        run(&mut game, 59, InputIntent::default());
        assert!(game.bots.bots.is_empty());
        let frame = run(&mut game, 1, InputIntent::default());
        assert_eq!(game.bots.bots.len(), 20);
        assert_eq!(frame.bots.len(), 20);
    }

    #[test]
    fn collecting_everything_scores_and_fires_every_milestone() {
        let mut game = game();
        run(&mut game, 1, InputIntent::default());

        for index in 0..game.collectibles.items.len() {
            if !game.collectibles.items[index].is_live() {
                continue;
            }
            let at = game.collectibles.items[index].position;
            teleport(&mut game, at);
            run(&mut game, 1, InputIntent::default());
            assert!(game.collectibles.items[index].collected);
        }

        assert_eq!(game.score.score(), 500);
        assert_eq!(game.shows, 5);

        // The first launch of each show lands on the next tick.
        run(&mut game, 2, InputIntent::default());
        assert!(!game.fireworks.active.is_empty());
    }

    #[test]
    fn collected_slots_come_back() {
        let mut game = game();
        run(&mut game, 1, InputIntent::default());
        let at = game.collectibles.items[0].position;
        teleport(&mut game, at);
        run(&mut game, 1, InputIntent::default());
        assert!(game.collectibles.items[0].collected);

        teleport(&mut game, Vector3::new(0.0, 2.0, 0.0));
        run(&mut game, 120, InputIntent::default());
        assert!(game.collectibles.items[0].is_live());
        assert_eq!(game.collectibles.items.len(), 50);
    }

    #[test]
    fn leaving_the_map_resets_inside_the_limit() {
        let mut game = game();
        run(&mut game, 1, InputIntent::default());
        game.world.set_pose(game.vehicle.chassis, Vector3::new(1500.0, 3.0, -20.0), UnitQuaternion::identity());
        game.world.zero_motion(game.vehicle.chassis);

        let frame = run(&mut game, 1, InputIntent { forward: 1, turn: 0, reset_requested: false });
        assert_eq!(game.resets, 1);
        let [x, _, z] = frame.vehicle.position;
        assert!(x.abs() <= 1000.0 && z.abs() <= 1000.0);
        assert_eq!(game.world.linvel(game.vehicle.chassis), Some(Vector3::zeros()));
        assert_eq!(game.world.angvel(game.vehicle.chassis), Some(Vector3::zeros()));
    }

    #[test]
    fn manual_reset_lifts_and_stops_the_car() {
        let mut game = game();
        run(&mut game, 30, InputIntent { forward: 1, turn: 1, reset_requested: false });
        let before = game.vehicle.position(&game.world).unwrap_or_else(Vector3::zeros);

        game.tick(game.ticks() as f64 * FRAME_MS, InputIntent { forward: 0, turn: 0, reset_requested: true });
        let after = game.vehicle.position(&game.world).unwrap_or_else(Vector3::zeros);
        assert!(after.y > before.y + 4.0);
        assert_eq!(game.world.linvel(game.vehicle.chassis), Some(Vector3::zeros()));
        assert!(game.vehicle.wheels.iter().all(|w| w.spin_velocity == 0.0 && w.suspension_velocity == 0.0));
    }

    #[test]
    fn chunks_follow_the_car() {
        let mut game = game();
        run(&mut game, 1, InputIntent::default());
        assert_eq!(game.chunks.loaded_keys().len(), 9);

        teleport(&mut game, Vector3::new(-450.0, 2.0, 350.0));
        run(&mut game, 1, InputIntent::default());
        let center = game.chunks.chunk_key(-450.0, 350.0);
        assert!(game.chunks.is_loaded(center));
        assert_eq!(game.chunks.loaded_keys().len(), 9);
    }

    #[test]
    fn restart_releases_the_old_world() {
        let mut game = game();
        let old = run(&mut game, 1, InputIntent::default());
        let old_car = game.vehicle.visual;
        game.score.award(30);

        game.restart();
        assert_eq!(game.score.score(), 0);
        assert_eq!(game.ticks(), 0);

        let frame = run(&mut game, 1, InputIntent::default());
        assert!(frame.released.contains(&old_car));
        assert!(frame.requests.iter().all(|r| r.visual > old_car));
        assert!(!old.requests.is_empty());
    }

    #[test]
    fn same_seed_builds_the_same_world() {
        let a = game();
        let b = game();
        let houses = |g: &Game| g.statics.placements().to_vec();
        assert_eq!(houses(&a), houses(&b));
        let items = |g: &Game| g.collectibles.items.iter().map(|i| i.position).collect::<Vec<_>>();
        assert_eq!(items(&a), items(&b));
    }
}
