//! Map templates and the registry they are looked up in

use crate::error::{ArenaError, Result};
use crate::types::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const PLATFORM_X_SIZE: i32 = 24;
pub const PLATFORM_Z_SIZE: i32 = 24;

/// 2x2 mini platforms, as offsets from the platform min position
pub const MINI_PLATFORMS: [[[i32; 3]; 4]; 9] = [
    [[3, 1, 3], [4, 1, 3], [3, 1, 4], [4, 1, 4]],
    [[11, 1, 3], [12, 1, 3], [11, 1, 4], [12, 1, 4]],
    [[19, 1, 3], [20, 1, 3], [19, 1, 4], [20, 1, 4]],
    [[3, 1, 11], [4, 1, 11], [3, 1, 12], [4, 1, 12]],
    [[11, 1, 11], [12, 1, 11], [11, 1, 12], [12, 1, 12]],
    [[19, 1, 11], [20, 1, 11], [19, 1, 12], [20, 1, 12]],
    [[3, 1, 19], [4, 1, 19], [3, 1, 20], [4, 1, 20]],
    [[11, 1, 19], [12, 1, 19], [11, 1, 20], [12, 1, 20]],
    [[19, 1, 19], [20, 1, 19], [19, 1, 20], [20, 1, 20]],
];

/// Axis-aligned box with `min <= max` on every axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        (self.min.x..=self.max.x).contains(&p.x)
            && (self.min.y..=self.max.y).contains(&p.y)
            && (self.min.z..=self.max.z).contains(&p.z)
    }
}

/// On-disk map document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapTemplateData {
    pub name: String,
    pub platform: PlatformData,
    pub spawns: Vec<Vec3>,
    pub cages: CagesData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformData {
    pub pos1: Vec3,
    pub pos2: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CagesData {
    pub winners: Vec3,
    pub losers: Vec3,
}

/// Immutable arena layout plus the archive its worlds are extracted from
#[derive(Debug, Clone, PartialEq)]
pub struct MapTemplate {
    name: String,
    platform: Bounds,
    center: Vec3,
    spawns: Vec<Vec3>,
    winners_cage: Vec3,
    losers_cage: Vec3,
    archive: PathBuf,
}

impl MapTemplate {
    /// Build a template, requiring at least one spawn and no fewer than `min_players`.
    pub fn from_data(data: MapTemplateData, backups_dir: &Path, min_players: usize) -> Result<Self> {
        let invalid = |reason: String| ArenaError::InvalidMap {
            name: data.name.clone(),
            reason,
        };

        if data.name.is_empty() || data.name.contains(['/', '\\']) || data.name.starts_with('.') {
            return Err(invalid("name must be a plain file name".into()));
        }
        if data.spawns.is_empty() {
            return Err(invalid("no spawns".into()));
        }
        if data.spawns.len() < min_players {
            return Err(invalid(format!(
                "{} spawns for a minimum of {} players",
                data.spawns.len(),
                min_players
            )));
        }

        let platform = Bounds::from_corners(data.platform.pos1, data.platform.pos2);
        let center = platform.min.add(PLATFORM_X_SIZE / 2, 0, PLATFORM_Z_SIZE / 2);
        let archive = backups_dir.join(format!("{}.zip", data.name));

        Ok(Self {
            name: data.name,
            platform,
            center,
            spawns: data.spawns,
            winners_cage: data.cages.winners,
            losers_cage: data.cages.losers,
            archive,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> Bounds {
        self.platform
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn spawns(&self) -> &[Vec3] {
        &self.spawns
    }

    /// Spawn for the n-th player; wraps when there are more players than spawns
    pub fn spawn_for(&self, index: usize) -> Vec3 {
        self.spawns[index % self.spawns.len()]
    }

    pub fn winners_cage(&self) -> Vec3 {
        self.winners_cage
    }

    pub fn losers_cage(&self) -> Vec3 {
        self.losers_cage
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Absolute block positions of each mini platform
    pub fn mini_platforms(&self) -> Vec<[Vec3; 4]> {
        let min = self.platform.min;
        MINI_PLATFORMS
            .iter()
            .map(|blocks| blocks.map(|[x, y, z]| min.add(x, y, z)))
            .collect()
    }
}

/// Every loaded map, by name. Filled once at startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct MapRegistry {
    maps: BTreeMap<String, Arc<MapTemplate>>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, map: MapTemplate) -> Result<Arc<MapTemplate>> {
        if self.maps.contains_key(map.name()) {
            return Err(ArenaError::DuplicateMap(map.name().to_string()));
        }
        let map = Arc::new(map);
        self.maps.insert(map.name().to_string(), map.clone());
        debug!("Registered map: {}", map.name());
        Ok(map)
    }

    pub fn get(&self, name: &str) -> Result<Arc<MapTemplate>> {
        self.maps
            .get(name)
            .cloned()
            .ok_or_else(|| ArenaError::MapNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.maps.keys().cloned().collect()
    }

    pub fn maps(&self) -> impl Iterator<Item = &Arc<MapTemplate>> {
        self.maps.values()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Load every `*.json` map document in `maps_dir`.
    pub fn load_dir(maps_dir: &Path, backups_dir: &Path, min_players: usize) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(maps_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            let data: MapTemplateData = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            registry.insert(MapTemplate::from_data(data, backups_dir, min_players)?)?;
        }

        info!("Loaded {} maps from {}", registry.len(), maps_dir.display());
        Ok(registry)
    }
}
