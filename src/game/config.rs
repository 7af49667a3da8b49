use crate::engine::physics::PhysicsConfig;
use crate::engine::vehicle::VehicleConfig;
use crate::game::bots::BotConfig;
use crate::game::chunks::ChunkConfig;
use crate::game::collectibles::CollectibleConfig;
use crate::game::fireworks::FireworksConfig;
use crate::game::placement::PlacementConfig;
use crate::game::road::RoadConfig;
use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::f32::consts::PI;
use std::fmt::{Display, Formatter};

/// How the presentation layer should mount a loaded model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    pub scale: f32,
    pub rotation_offset_x: f32,
    pub rotation_offset_y: f32,
    pub rotation_offset_z: f32,
    pub position_offset_y: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            path: "car1".to_string(),
            scale: 1.0,
            rotation_offset_x: 0.0,
            rotation_offset_y: PI * 1.5,
            rotation_offset_z: 0.0,
            position_offset_y: 0.0,
        }
    }
}

impl ModelConfig {
    pub fn rotation_offset(&self) -> UnitQuaternion<f32> {
        UnitQuaternion::from_euler_angles(self.rotation_offset_x, self.rotation_offset_y, self.rotation_offset_z)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
    /// World seed. When absent the browser entry point picks one.
    pub seed: Option<u64>,
    pub car_model: ModelConfig,
    pub physics: PhysicsConfig,
    pub vehicle: VehicleConfig,
    pub road: RoadConfig,
    pub collectibles: CollectibleConfig,
    pub placement: PlacementConfig,
    pub chunks: ChunkConfig,
    pub bots: BotConfig,
    pub fireworks: FireworksConfig,
    pub map_limit: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            seed: None,
            car_model: ModelConfig::default(),
            physics: PhysicsConfig::default(),
            vehicle: VehicleConfig::default(),
            road: RoadConfig::default(),
            collectibles: CollectibleConfig::default(),
            placement: PlacementConfig::default(),
            chunks: ChunkConfig::default(),
            bots: BotConfig::default(),
            fireworks: FireworksConfig::default(),
            map_limit: 1000.0,
        }
    }
}

impl AppConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("physics.fixed_dt", self.physics.fixed_dt)?;
        if self.physics.max_substeps == 0 {
            return Err(ConfigError::Validation("physics.max_substeps must be > 0".to_string()));
        }
        positive("vehicle.chassis_mass", self.vehicle.chassis_mass)?;
        positive("vehicle.wheel_radius", self.vehicle.wheel_radius)?;
        if self.road.control_points < 4 {
            return Err(ConfigError::Validation(format!(
                "road.control_points must be >= 4, got {}",
                self.road.control_points
            )));
        }
        if self.road.segments == 0 || self.road.arc_divisions == 0 {
            return Err(ConfigError::Validation("road.segments and road.arc_divisions must be > 0".to_string()));
        }
        positive("road.radius", self.road.radius)?;
        positive("chunks.size", self.chunks.size)?;
        if self.chunks.active_radius < 0 {
            return Err(ConfigError::Validation("chunks.active_radius must be >= 0".to_string()));
        }
        positive("collectibles.collect_distance", self.collectibles.collect_distance)?;
        positive("placement.map_size", self.placement.map_size)?;
        positive("map_limit", self.map_limit)?;
        if self.bots.models.is_empty() {
            return Err(ConfigError::Validation("bots.models must name at least one model".to_string()));
        }
        if self.placement.house_models.is_empty() {
            return Err(ConfigError::Validation("placement.house_models must name at least one model".to_string()));
        }
        Ok(())
    }
}

fn positive(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{field} must be > 0, got {value}")))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(source) => write!(f, "failed to parse config: {source}"),
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(source) => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = AppConfig::from_json("{}").expect("defaults should validate");
        assert_eq!(config.seed, None);
        assert_eq!(config.map_limit, 1000.0);
        assert_eq!(config.bots.count, 20);
        assert_eq!(config.chunks.size, 100.0);
        assert_eq!(config.collectibles.max_collectibles, 50);
        assert_eq!(config.car_model, ModelConfig::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let raw = r#"{
            "seed": 42,
            "car_model": { "path": "/assets/models/car3.glb", "scale": 2.0 },
            "bots": { "count": 3 },
            "physics": { "fixed_dt": 0.01 }
        }"#;
        let config = AppConfig::from_json(raw).expect("valid config");
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.car_model.path, "/assets/models/car3.glb");
        assert_eq!(config.car_model.scale, 2.0);
        assert_eq!(config.car_model.rotation_offset_y, PI * 1.5);
        assert_eq!(config.bots.count, 3);
        assert_eq!(config.bots.models.len(), 4);
        assert_eq!(config.physics.fixed_dt, 0.01);
        assert_eq!(config.physics.gravity, -10.0);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = AppConfig::from_json("{ \"seed\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("failed to parse config"));
    }

    #[test]
    fn rejects_non_positive_sizes() {
        let err = AppConfig::from_json(r#"{ "chunks": { "size": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("chunks.size")));

        let err = AppConfig::from_json(r#"{ "physics": { "fixed_dt": -0.1 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("physics.fixed_dt")));

        let err = AppConfig::from_json(r#"{ "road": { "control_points": 2 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rotation_offset_turns_about_y() {
        let model = ModelConfig { rotation_offset_y: PI / 2.0, ..ModelConfig::default() };
        let turned = model.rotation_offset() * nalgebra::Vector3::z();
        assert!((turned.x - 1.0).abs() < 1e-5);
    }
}
