use crate::engine::physics::{BodyHandle, PhysicsWorld};
use crate::engine::visual::Visuals;
use crate::game::objects::PlacedObject;
use crate::game::road::Road;
use crate::game::vegetation::ForestArea;
use nalgebra::{Vector2, Vector3};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type ChunkKey = (i32, i32);

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ChunkConfig {
    pub size: f32,
    pub active_radius: i32,
    pub density: usize,
    pub road_buffer: f32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig { size: 100.0, active_radius: 1, density: 15, road_buffer: 50.0 }
    }
}

pub struct Chunk {
    pub key: ChunkKey,
    pub objects: Vec<PlacedObject>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkDiff {
    pub loaded: Vec<ChunkKey>,
    pub unloaded: Vec<ChunkKey>,
}

/// Seed for one chunk's content, mixed from the world seed and the cell.
fn chunk_seed(world_seed: u64, key: ChunkKey) -> u64 {
    let n = (world_seed as u32)
        .wrapping_add((key.0 as u32).wrapping_mul(374761393))
        .wrapping_add((key.1 as u32).wrapping_mul(668265263));
    let n = n ^ (n >> 13);
    let n = n.wrapping_mul(1274126177);
    let n = n ^ (n >> 16);
    ((world_seed >> 32) << 32) | n as u64
}

/// Square neighbourhood of `center` with Chebyshev radius `radius`.
pub fn desired_keys(center: ChunkKey, radius: i32) -> HashSet<ChunkKey> {
    let radius = radius.max(0);
    (-radius..=radius)
        .flat_map(|dx| (-radius..=radius).map(move |dz| (center.0 + dx, center.1 + dz)))
        .collect()
}

/// Streams forest chunks in and out around the player.
pub struct ChunkManager {
    config: ChunkConfig,
    world_seed: u64,
    loaded: HashMap<ChunkKey, Chunk>,
}

impl ChunkManager {
    pub fn new(config: ChunkConfig, world_seed: u64) -> Self {
        ChunkManager { config, world_seed, loaded: HashMap::new() }
    }

    pub fn chunk_key(&self, x: f32, z: f32) -> ChunkKey {
        let size = self.config.size;
        ((x / size).floor() as i32, (z / size).floor() as i32)
    }

    /// Loads every missing chunk around `player` and unloads every chunk that fell out of range.
    pub fn update_chunks(
        &mut self,
        player: Vector3<f32>,
        road: &Road,
        world: &mut PhysicsWorld,
        visuals: &mut Visuals,
    ) -> ChunkDiff {
        let center = self.chunk_key(player.x, player.z);
        let desired = desired_keys(center, self.config.active_radius);

        let mut diff = ChunkDiff::default();
        let mut missing: Vec<ChunkKey> = desired.iter().filter(|k| !self.loaded.contains_key(k)).copied().collect();
        missing.sort_unstable();
        for key in missing {
            if self.load_chunk(key, road, world, visuals) {
                diff.loaded.push(key);
            }
        }

        let mut stale: Vec<ChunkKey> = self.loaded.keys().filter(|k| !desired.contains(k)).copied().collect();
        stale.sort_unstable();
        for key in stale {
            if self.unload_chunk(key, world, visuals) {
                diff.unloaded.push(key);
            }
        }
        diff
    }

    /// No-op when the chunk is already loaded.
    pub fn load_chunk(&mut self, key: ChunkKey, road: &Road, world: &mut PhysicsWorld, visuals: &mut Visuals) -> bool {
        if self.loaded.contains_key(&key) {
            return false;
        }
        let size = self.config.size;
        let area = ForestArea {
            center: Vector2::new(key.0 as f32 * size + size / 2.0, key.1 as f32 * size + size / 2.0),
            radius: size / 2.0,
            density: self.config.density,
            road_buffer: self.config.road_buffer,
        };
        let mut rng = SmallRng::seed_from_u64(chunk_seed(self.world_seed, key));
        let objects = area.populate(road, world, visuals, &mut rng);
        log::debug!("chunk {:?} loaded with {} trees", key, objects.len());
        self.loaded.insert(key, Chunk { key, objects });
        true
    }

    /// Releases every body and visual of the chunk. No-op when it is not loaded.
    pub fn unload_chunk(&mut self, key: ChunkKey, world: &mut PhysicsWorld, visuals: &mut Visuals) -> bool {
        let Some(chunk) = self.loaded.remove(&key) else { return false };
        for object in chunk.objects {
            object.dispose(world, visuals);
        }
        log::debug!("chunk {:?} unloaded", key);
        true
    }

    pub fn is_loaded(&self, key: ChunkKey) -> bool {
        self.loaded.contains_key(&key)
    }

    pub fn loaded_keys(&self) -> Vec<ChunkKey> {
        let mut keys: Vec<ChunkKey> = self.loaded.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn chunk(&self, key: ChunkKey) -> Option<&Chunk> {
        self.loaded.get(&key)
    }

    pub fn bodies(&self, key: ChunkKey) -> Vec<BodyHandle> {
        self.loaded
            .get(&key)
            .map(|c| c.objects.iter().map(|o| o.body).collect())
            .unwrap_or_default()
    }
}
