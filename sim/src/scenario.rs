//! Mission definitions: the JSON scenario format and the built-in default.

use crate::entity::{EntityKind, MicroDoppler, SimEntity};
use crate::{SimError, SimResult};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One entity as authored in a mission file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    /// Start position [x, y, z] (meters)
    pub start_pos: [f64; 3],
    /// Radar cross section (m²)
    #[serde(default = "default_rcs")]
    pub rcs: f64,
    /// Cruise speed (m/s)
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub waypoints: Vec<[f64; 3]>,
    /// Override the per-kind micro-Doppler defaults
    #[serde(default)]
    pub micro_doppler: Option<MicroDoppler>,
}

fn default_rcs() -> f64 {
    0.01
}

fn default_speed() -> f64 {
    10.0
}

/// A full scripted scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mission {
    pub mission_name: String,
    pub entities: Vec<EntitySpec>,
}

impl Mission {
    /// Load a mission from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mission: Mission = serde_json::from_str(&text)?;
        if mission.entities.is_empty() {
            return Err(SimError::EmptyMission);
        }
        info!(name = %mission.mission_name, entities = mission.entities.len(), "mission loaded");
        Ok(mission)
    }

    /// The stock mission: two quadcopters running attack patterns past the
    /// warehouse, and a bird to exercise classification.
    pub fn default_mission() -> Self {
        Mission {
            mission_name: "warehouse_incursion".into(),
            entities: vec![
                EntitySpec {
                    name: "intruder-1".into(),
                    kind: EntityKind::Quadcopter,
                    start_pos: [-120.0, 40.0, 600.0],
                    rcs: 0.01,
                    speed: 18.0,
                    waypoints: vec![[0.0, 35.0, 350.0], [80.0, 30.0, 150.0], [0.0, 25.0, 60.0]],
                    micro_doppler: None,
                },
                EntitySpec {
                    name: "intruder-2".into(),
                    kind: EntityKind::Quadcopter,
                    start_pos: [150.0, 55.0, 700.0],
                    rcs: 0.015,
                    speed: 14.0,
                    waypoints: vec![[40.0, 45.0, 400.0], [-60.0, 40.0, 220.0]],
                    micro_doppler: None,
                },
                EntitySpec {
                    name: "heron".into(),
                    kind: EntityKind::Bird,
                    start_pos: [-300.0, 25.0, 400.0],
                    rcs: 0.005,
                    speed: 8.0,
                    waypoints: vec![[300.0, 30.0, 420.0]],
                    micro_doppler: None,
                },
            ],
        }
    }

    /// Instantiate the entities of this mission.
    pub fn build_entities(&self) -> Vec<SimEntity> {
        self.entities
            .iter()
            .map(|spec| {
                let mut e = SimEntity::new(
                    spec.name.clone(),
                    Vector3::new(spec.start_pos[0], spec.start_pos[1], spec.start_pos[2]),
                );
                e.kind = spec.kind;
                e.rcs = spec.rcs;
                e.max_speed = spec.speed;
                e.micro_doppler = spec
                    .micro_doppler
                    .unwrap_or_else(|| MicroDoppler::for_kind(spec.kind));
                for wp in &spec.waypoints {
                    e.add_waypoint(Vector3::new(wp[0], wp[1], wp[2]));
                }
                e
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mission_builds_entities() {
        let mission = Mission::default_mission();
        let entities = mission.build_entities();
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].kind, EntityKind::Quadcopter);
        // Quadcopters pick up rotor micro-Doppler by default.
        assert!(entities[0].micro_doppler.blade_speed_mps > 0.0);
        assert!(entities[2].micro_doppler.flapping);
    }

    #[test]
    fn mission_json_roundtrip() {
        let path = std::env::temp_dir().join(format!("aegis_mission_{}.json", std::process::id()));
        let mission = Mission::default_mission();
        std::fs::write(&path, serde_json::to_string_pretty(&mission).unwrap()).unwrap();
        let loaded = Mission::load(&path).unwrap();
        assert_eq!(loaded.mission_name, mission.mission_name);
        assert_eq!(loaded.entities.len(), mission.entities.len());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn mission_with_no_entities_is_rejected() {
        let path = std::env::temp_dir().join(format!("aegis_empty_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"mission_name": "empty", "entities": []}"#).unwrap();
        assert!(matches!(Mission::load(&path), Err(SimError::EmptyMission)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn spec_fields_have_sane_defaults() {
        let json = r#"{
            "mission_name": "minimal",
            "entities": [{"name": "d1", "type_unused": 0, "start_pos": [0, 30, 500]}]
        }"#;
        let mission: Mission = serde_json::from_str(json).unwrap();
        assert_eq!(mission.entities[0].rcs, 0.01);
        assert_eq!(mission.entities[0].speed, 10.0);
        assert!(mission.entities[0].waypoints.is_empty());
    }
}
