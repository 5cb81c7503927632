//! Arena manager - the set of live arenas and matchmaking

use crate::arena::{Arena, ArenaContext, ArenaEvent, TickOutcome};
use crate::error::{ArenaError, Result};
use crate::types::{ArenaSnapshot, generate_arena_id};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Arena manager - owns every live arena and the shared event channel
pub struct ArenaManager {
    ctx: Arc<ArenaContext>,
    arenas: HashMap<String, Arena>,
    event_tx: mpsc::Sender<ArenaEvent>,
    event_rx: mpsc::Receiver<ArenaEvent>,
}

impl ArenaManager {
    /// Create a manager; every registered map must seat the minimum player count
    pub fn new(ctx: Arc<ArenaContext>) -> Result<Self> {
        ctx.config.validate()?;
        for map in ctx.maps.maps() {
            if map.spawns().len() < ctx.config.min_players {
                return Err(ArenaError::InvalidMap {
                    name: map.name().to_string(),
                    reason: format!(
                        "{} spawns for a minimum of {} players",
                        map.spawns().len(),
                        ctx.config.min_players
                    ),
                });
            }
        }
        let (event_tx, event_rx) = mpsc::channel(ctx.config.event_buffer.max(1));

        Ok(Self {
            ctx,
            arenas: HashMap::new(),
            event_tx,
            event_rx,
        })
    }

    /// Get shared arena context
    pub fn context(&self) -> &Arc<ArenaContext> {
        &self.ctx
    }

    /// Receive next event (non-blocking)
    pub fn try_recv(&mut self) -> Option<ArenaEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Get arena by id
    pub fn arena(&self, id: &str) -> Option<&Arena> {
        self.arenas.get(id)
    }

    /// Get arena by id (mutable)
    pub fn arena_mut(&mut self, id: &str) -> Option<&mut Arena> {
        self.arenas.get_mut(id)
    }

    /// Arena the player is currently in
    pub fn arena_of(&self, player: &str) -> Option<&Arena> {
        self.arenas.values().find(|a| a.has_player(player))
    }

    /// Get sorted arena ids
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.arenas.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get arena count
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// Check if no arenas are live
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    /// Get snapshots of every arena, sorted by id
    pub fn snapshots(&self) -> Vec<ArenaSnapshot> {
        let mut snapshots: Vec<_> = self.arenas.values().map(Arena::snapshot).collect();
        snapshots.sort_by(|a, b| a.arena_id.cmp(&b.arena_id));
        snapshots
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a new arena in the Waiting phase
    pub fn create(&mut self) -> Result<String> {
        if self.ctx.maps.is_empty() {
            return Err(ArenaError::NoMapsLoaded);
        }

        let mut id = generate_arena_id();
        while self.arenas.contains_key(&id) {
            id = generate_arena_id();
        }

        let arena = Arena::new(id.clone(), self.ctx.clone(), self.event_tx.clone());
        self.arenas.insert(id.clone(), arena);

        info!("Created arena: {}", id);
        self.emit(ArenaEvent::Created(id.clone()));
        Ok(id)
    }

    /// Open an arena that plays `map` regardless of votes
    pub fn create_with_map(&mut self, map: &str) -> Result<String> {
        let map = self.ctx.maps.get(map)?;
        let id = self.create()?;
        if let Some(arena) = self.arenas.get_mut(&id) {
            arena.force_map(map);
        }
        Ok(id)
    }

    /// Matchmaking entry: put the player in the fullest open arena, opening one if needed.
    pub fn join(&mut self, player: &str) -> Result<String> {
        if self.arena_of(player).is_some() {
            return Err(ArenaError::AlreadyInArena);
        }

        let open = self
            .arenas
            .values()
            .filter(|a| a.is_joinable())
            .max_by(|a, b| {
                a.player_count()
                    .cmp(&b.player_count())
                    .then_with(|| b.id().cmp(a.id()))
            })
            .map(|a| a.id().to_string());

        let id = match open {
            Some(id) => id,
            None => self.create()?,
        };

        let arena = self
            .arenas
            .get_mut(&id)
            .ok_or_else(|| ArenaError::ArenaNotFound(id.clone()))?;
        arena.add_player(player)?;
        Ok(id)
    }

    /// Remove the player from whichever arena holds them
    pub fn leave(&mut self, player: &str) -> Result<()> {
        let arena = self
            .arenas
            .values_mut()
            .find(|a| a.has_player(player))
            .ok_or(ArenaError::NotInArena)?;
        arena.remove_player(player)
    }

    /// Record a map vote in the player's arena
    pub fn vote(&mut self, player: &str, map: &str) -> Result<()> {
        let arena = self
            .arenas
            .values_mut()
            .find(|a| a.has_player(player))
            .ok_or(ArenaError::NotInArena)?;
        arena.vote(player, map)
    }

    /// Tick every arena once, then retire finished ones and requeue their players.
    pub fn tick(&mut self) {
        let mut finished = Vec::new();
        for (id, arena) in self.arenas.iter_mut() {
            if let TickOutcome::Finished(players) = arena.tick() {
                finished.push((id.clone(), players));
            }
        }

        for (id, players) in finished {
            self.arenas.remove(&id);
            info!("Removed arena: {}", id);
            self.emit(ArenaEvent::Destroyed(id));

            for player in players {
                if let Err(e) = self.join(&player) {
                    warn!("Failed to requeue {}: {}", player, e);
                }
            }
        }
    }

    /// Administrative teardown: players go to the lobby, the world is released,
    /// and the arena is removed.
    pub fn destroy(&mut self, id: &str) -> Result<()> {
        let mut arena = self
            .arenas
            .remove(id)
            .ok_or_else(|| ArenaError::ArenaNotFound(id.to_string()))?;
        arena.teardown();

        info!("Destroyed arena: {}", id);
        self.emit(ArenaEvent::Destroyed(id.to_string()));
        Ok(())
    }

    fn emit(&self, event: ArenaEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!("Arena manager dropped event: {}", e);
        }
    }
}
