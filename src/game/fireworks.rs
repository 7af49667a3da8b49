use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

pub const PALETTE: [u32; 7] = [0xff0000, 0x00ff00, 0x0000ff, 0xffff00, 0xff00ff, 0x00ffff, 0xffffff];

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct FireworksConfig {
    pub launches: u32,
    pub launch_interval_ticks: u64,
    pub distance_ahead: f32,
    pub height: f32,
    pub spread: f32,
    pub particles: usize,
    pub fuse_secs: f32,
    pub lifetime_secs: f32,
    pub rocket_gravity: f32,
    pub particle_gravity: f32,
    pub fade_per_sec: f32,
}

impl Default for FireworksConfig {
    fn default() -> Self {
        FireworksConfig {
            launches: 80,
            launch_interval_ticks: 12,
            distance_ahead: 100.0,
            height: 5.0,
            spread: 30.0,
            particles: 30,
            fuse_secs: 0.8,
            lifetime_secs: 2.0,
            rocket_gravity: 10.0,
            particle_gravity: 20.0,
            fade_per_sec: 0.8,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Particle {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub opacity: f32,
    pub color: u32,
}

#[derive(Clone, Debug)]
pub struct Firework {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub age: f32,
    pub exploded: bool,
    pub particles: Vec<Particle>,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct FireworksFrame {
    pub rockets: Vec<[f32; 3]>,
    /// `[x, y, z, opacity]` per spark.
    pub sparks: Vec<[f32; 4]>,
    pub colors: Vec<u32>,
}

/// Rockets that climb, burst into sparks and fade out.
pub struct Fireworks {
    config: FireworksConfig,
    pub active: Vec<Firework>,
}

impl Fireworks {
    pub fn new(config: FireworksConfig) -> Self {
        Fireworks { config, active: Vec::new() }
    }

    pub fn config(&self) -> &FireworksConfig {
        &self.config
    }

    /// Where a show is centred: ahead of the car along its heading, a little above it.
    pub fn show_origin(&self, car: Vector3<f32>, forward: Vector3<f32>) -> Vector3<f32> {
        let ahead = self.config.distance_ahead;
        Vector3::new(car.x + forward.x * ahead, car.y + self.config.height, car.z + forward.z * ahead)
    }

    pub fn launch<R: Rng>(&mut self, origin: Vector3<f32>, rng: &mut R) {
        let spread = self.config.spread;
        let position = origin
            + Vector3::new((rng.gen::<f32>() - 0.5) * spread, 0.0, (rng.gen::<f32>() - 0.5) * spread);
        let velocity = Vector3::new(
            rng.gen::<f32>() * 10.0,
            20.0 + rng.gen::<f32>() * 10.0,
            rng.gen::<f32>() * 10.0,
        );
        self.active.push(Firework { position, velocity, age: 0.0, exploded: false, particles: Vec::new() });
    }

    pub fn update<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        let cfg = &self.config;
        for firework in self.active.iter_mut() {
            firework.age += dt;
            if !firework.exploded && firework.age > cfg.fuse_secs {
                firework.exploded = true;
                firework.particles = (0..cfg.particles).map(|_| spark(firework.position, &mut *rng)).collect();
            }
            if firework.exploded {
                for p in firework.particles.iter_mut() {
                    p.position += p.velocity * dt;
                    p.velocity.y -= cfg.particle_gravity * dt;
                    p.opacity -= cfg.fade_per_sec * dt;
                }
                firework.particles.retain(|p| p.opacity > 0.0);
            } else {
                firework.position += firework.velocity * dt;
                firework.velocity.y -= cfg.rocket_gravity * dt;
            }
        }
        let lifetime = cfg.lifetime_secs;
        self.active.retain(|f| f.age < lifetime && (!f.exploded || !f.particles.is_empty()));
    }

    pub fn frame(&self) -> FireworksFrame {
        let mut frame = FireworksFrame::default();
        for firework in &self.active {
            if !firework.exploded {
                let p = firework.position;
                frame.rockets.push([p.x, p.y, p.z]);
            }
            for spark in &firework.particles {
                let p = spark.position;
                frame.sparks.push([p.x, p.y, p.z, spark.opacity]);
                frame.colors.push(spark.color);
            }
        }
        frame
    }
}

fn spark<R: Rng>(at: Vector3<f32>, rng: &mut R) -> Particle {
    let speed = 10.0 + rng.gen::<f32>() * 15.0;
    let phi = rng.gen::<f32>() * TAU;
    let theta = rng.gen::<f32>() * PI;
    Particle {
        position: at,
        velocity: Vector3::new(
            speed * theta.sin() * phi.cos(),
            speed * theta.cos(),
            speed * theta.sin() * phi.sin(),
        ),
        opacity: 1.0,
        color: PALETTE[rng.gen_range(0..PALETTE.len())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn rocket_bursts_after_fuse_and_burns_out() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut fireworks = Fireworks::new(FireworksConfig::default());
        fireworks.launch(Vector3::new(0.0, 5.0, -100.0), &mut rng);

        let dt = 1.0 / 60.0;
        for _ in 0..40 {
            fireworks.update(dt, &mut rng);
        }
        let frame = fireworks.frame();
        assert_eq!(frame.rockets.len(), 1);
        assert!(frame.rockets[0][1] > 5.0);

        for _ in 0..20 {
            fireworks.update(dt, &mut rng);
        }
        let frame = fireworks.frame();
        assert!(frame.rockets.is_empty());
        assert_eq!(frame.sparks.len(), 30);
        assert_eq!(frame.colors.len(), 30);

        for _ in 0..120 {
            fireworks.update(dt, &mut rng);
        }
        assert!(fireworks.active.is_empty());
    }

    #[test]
    fn show_origin_is_ahead_and_above() {
        let fireworks = Fireworks::new(FireworksConfig::default());
        let origin = fireworks.show_origin(Vector3::new(10.0, 1.0, 0.0), -Vector3::z());
        assert_eq!(origin, Vector3::new(10.0, 6.0, -100.0));
    }

    #[test]
    fn launches_stay_within_spread() {
        let mut rng = SmallRng::seed_from_u64(9);
        let mut fireworks = Fireworks::new(FireworksConfig::default());
        for _ in 0..50 {
            fireworks.launch(Vector3::zeros(), &mut rng);
        }
        assert!(fireworks
            .active
            .iter()
            .all(|f| f.position.x.abs() <= 15.0 && f.position.z.abs() <= 15.0 && f.position.y == 0.0));
    }
}
