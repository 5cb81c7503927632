//! Side effects an arena performs on players.
//!
//! The server embedding this crate owns players, chat, sounds, and inventories;
//! arenas only call out through [`PlayerHooks`]. Every call is fire-and-forget.

use crate::types::{Cue, Location, Notice};

pub trait PlayerHooks: Send + Sync {
    /// Render a localized notice for the player
    fn notify(&self, player: &str, notice: &Notice);

    fn play_cue(&self, player: &str, cue: &Cue);

    /// Move the player to a location, loading the target area if needed
    fn teleport(&self, player: &str, destination: &Location);

    /// Empty inventory, armor, and cursor slots
    fn clear_carried_state(&self, player: &str);
}

/// Hooks that do nothing, for headless runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl PlayerHooks for NoopHooks {
    fn notify(&self, _player: &str, _notice: &Notice) {}

    fn play_cue(&self, _player: &str, _cue: &Cue) {}

    fn teleport(&self, _player: &str, _destination: &Location) {}

    fn clear_carried_state(&self, _player: &str) {}
}
