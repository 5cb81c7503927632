//! Type definitions for party-arena

use crate::error::{ArenaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Translation keys sent through [`crate::hooks::PlayerHooks::notify`]
pub mod keys {
    pub const NEED_MORE_PLAYERS: &str = "game.arena.needMorePlayers";
    pub const STARTING_BY_REACH_CAPACITY: &str = "game.arena.startingByReachCapacity";
    /// Lobby countdown, `{time}` param
    pub const STARTING: &str = "game.arena.starting";
    pub const COUNT_CANCELLED: &str = "game.arena.countCancelled";
    /// Pre-game countdown hint, `{bar}` and `{time}` params
    pub const START: &str = "game.arena.start";
}

/// Sound cue ids
pub mod cues {
    pub const CLICK: &str = "random.click";
    pub const TOAST: &str = "random.toast";
}

/// Arena phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaPhase {
    /// Lobby wait, counting down once enough players are present
    #[default]
    Waiting,
    /// Pre-game countdown; the world is provisioned part way through
    Starting,
    /// Sub-games are running
    InGame,
    /// Wind-down before the arena is destroyed
    Ending,
}

/// Integer block position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3 {
    #[serde(alias = "X")]
    pub x: i32,
    #[serde(alias = "Y")]
    pub y: i32,
    #[serde(alias = "Z")]
    pub z: i32,
}

impl Vec3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn add(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// A point inside a named world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub point: Vec3,
}

impl Location {
    pub fn new(world: impl Into<String>, point: Vec3) -> Self {
        Self {
            world: world.into(),
            point,
        }
    }
}

/// Arena configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Players needed before the lobby countdown runs (default: 2)
    pub min_players: usize,
    /// Roster capacity; reaching it starts immediately (default: 12)
    pub max_players: usize,
    /// Lobby countdown in ticks (default: 40)
    pub waiting_time: u32,
    /// Pre-game countdown in ticks (default: 15)
    pub starting_time: u32,
    /// Starting timer value at which the world is provisioned (default: 11)
    pub provision_at: u32,
    /// Wind-down in ticks (default: 10)
    pub ending_time: u32,
    /// Scheduler period in ms (default: 1000)
    pub tick_interval_ms: u64,
    /// Where world instances are extracted
    pub worlds_dir: PathBuf,
    /// Where map archives live, one `<name>.zip` per map
    pub backups_dir: PathBuf,
    /// Neutral area players are sent to on cancel
    pub lobby: Location,
    /// Event channel capacity (default: 100)
    pub event_buffer: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 12,
            waiting_time: 40,
            starting_time: 15,
            provision_at: 11,
            ending_time: 10,
            tick_interval_ms: 1000,
            worlds_dir: PathBuf::from("worlds"),
            backups_dir: PathBuf::from("database").join("backups"),
            lobby: Location::new("lobby", Vec3::new(0, 64, 0)),
            event_buffer: 100,
        }
    }
}

impl ArenaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_players(mut self, n: usize) -> Self {
        self.min_players = n;
        self
    }

    pub fn max_players(mut self, n: usize) -> Self {
        self.max_players = n;
        self
    }

    pub fn waiting_time(mut self, ticks: u32) -> Self {
        self.waiting_time = ticks;
        self
    }

    pub fn starting_time(mut self, ticks: u32) -> Self {
        self.starting_time = ticks;
        self
    }

    pub fn provision_at(mut self, ticks: u32) -> Self {
        self.provision_at = ticks;
        self
    }

    pub fn ending_time(mut self, ticks: u32) -> Self {
        self.ending_time = ticks;
        self
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    pub fn worlds_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.worlds_dir = dir.into();
        self
    }

    pub fn backups_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backups_dir = dir.into();
        self
    }

    pub fn lobby(mut self, lobby: Location) -> Self {
        self.lobby = lobby;
        self
    }

    /// Parse a JSON config document; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_players == 0 {
            return Err(ArenaError::InvalidConfig("min_players must be at least 1".into()));
        }
        if self.max_players < self.min_players {
            return Err(ArenaError::InvalidConfig(format!(
                "max_players ({}) is below min_players ({})",
                self.max_players, self.min_players
            )));
        }
        if self.waiting_time == 0 || self.starting_time == 0 {
            return Err(ArenaError::InvalidConfig("countdowns must be at least one tick".into()));
        }
        Ok(())
    }
}

/// How loudly a notice should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Normal,
    Urgent,
}

/// A localized message to render for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub key: String,
    pub params: BTreeMap<String, String>,
    pub urgency: Urgency,
    /// Shown as a short-lived hint instead of a chat message
    pub transient: bool,
}

impl Notice {
    pub fn message(key: &str) -> Self {
        Self {
            key: key.to_string(),
            params: BTreeMap::new(),
            urgency: Urgency::Normal,
            transient: false,
        }
    }

    pub fn tip(key: &str) -> Self {
        Self {
            transient: true,
            ..Self::message(key)
        }
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }
}

/// Sound cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub id: String,
    pub volume: f32,
    pub pitch: f32,
}

impl Cue {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            volume: 1.0,
            pitch: 1.0,
        }
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }
}

/// Read-only view of an arena for UI and telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaSnapshot {
    pub arena_id: String,
    pub phase: ArenaPhase,
    pub players: Vec<String>,
    pub max_players: usize,
    pub waiting_timer: u32,
    pub starting_timer: u32,
    pub ending_timer: u32,
    pub gametime: u64,
    pub map: Option<String>,
    pub world: Option<String>,
    pub subgame: Option<String>,
}

/// World instance name for a map played in a given arena
pub fn create_world_name(map: &str, arena_id: &str) -> String {
    format!("{map}-{arena_id}")
}

/// Generate a unique arena ID (8 chars)
pub fn generate_arena_id() -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// Countdown bar: one filled cell per remaining tick out of `total`
pub fn progress_bar(remaining: u32, total: u32) -> String {
    let filled = remaining.min(total) as usize;
    let empty = total as usize - filled;
    format!("{}{}", "▌".repeat(filled), "·".repeat(empty))
}
