//! Arena - one game session driven tick by tick

use crate::error::{ArenaError, Result};
use crate::hooks::PlayerHooks;
use crate::map::{MapRegistry, MapTemplate};
use crate::sequencer::{SequencerSignal, SessionView, SubgameHandle, SubgameSequencer};
use crate::types::*;
use crate::vote::VoteCounter;
use crate::world::{WorldHandle, WorldProvisioner};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Lobby countdown values at or below this get the urgent treatment
const WAITING_URGENT_FROM: u32 = 5;
/// Pre-game hint bands and bar width
const STARTING_HINT_FROM: u32 = 10;
const STARTING_URGENT_FROM: u32 = 3;
const STARTING_BAR_WIDTH: u32 = 10;
const TOAST_PITCH: f32 = 1.5;

/// Arena events emitted to the application
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEvent {
    /// Arena registered with the manager
    Created(String),
    PlayerJoin { arena_id: String, player: String },
    PlayerLeave { arena_id: String, player: String },
    PhaseChange {
        arena_id: String,
        from: ArenaPhase,
        to: ArenaPhase,
    },
    /// World instance created and players moved in
    WorldProvisioned {
        arena_id: String,
        map: String,
        world: String,
    },
    /// Provisioning failed; the countdown was cancelled
    ProvisionFailed { arena_id: String, reason: String },
    /// Countdown aborted and players sent back to the lobby
    CountdownCancelled(String),
    SubgameStart {
        arena_id: String,
        name: String,
        round: u32,
    },
    /// Arena removed from the manager
    Destroyed(String),
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The session is over; these players need a new arena
    Finished(Vec<String>),
}

/// Everything arenas share: configuration, maps, and the server-side collaborators
pub struct ArenaContext {
    pub config: ArenaConfig,
    pub maps: Arc<MapRegistry>,
    pub provisioner: WorldProvisioner,
    pub hooks: Arc<dyn PlayerHooks>,
    sequencers: Box<dyn Fn() -> Box<dyn SubgameSequencer> + Send + Sync>,
}

impl ArenaContext {
    /// Bundle shared state; `sequencers` builds a fresh sequencer per arena
    pub fn new<F>(
        config: ArenaConfig,
        maps: Arc<MapRegistry>,
        provisioner: WorldProvisioner,
        hooks: Arc<dyn PlayerHooks>,
        sequencers: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn SubgameSequencer> + Send + Sync + 'static,
    {
        Self {
            config,
            maps,
            provisioner,
            hooks,
            sequencers: Box::new(sequencers),
        }
    }

    /// Create a sub-game sequencer
    pub fn new_sequencer(&self) -> Box<dyn SubgameSequencer> {
        (self.sequencers)()
    }
}

/// Arena - a single session from lobby wait to teardown
///
/// Only [`Arena::tick`] moves the phase forward. Roster changes between ticks are
/// picked up on the next tick.
pub struct Arena {
    id: String,
    ctx: Arc<ArenaContext>,
    phase: ArenaPhase,
    players: Vec<String>,
    waiting_timer: u32,
    starting_timer: u32,
    ending_timer: u32,
    gametime: u64,
    /// Set once the current Starting episode has attempted provisioning
    provisioned: bool,
    map: Option<Arc<MapTemplate>>,
    world: Option<WorldHandle>,
    votes: VoteCounter,
    sequencer: Box<dyn SubgameSequencer>,
    subgame: Option<SubgameHandle>,
    event_tx: mpsc::Sender<ArenaEvent>,
}

impl Arena {
    /// Create an arena in the Waiting phase
    pub fn new(id: impl Into<String>, ctx: Arc<ArenaContext>, event_tx: mpsc::Sender<ArenaEvent>) -> Self {
        let sequencer = ctx.new_sequencer();
        Self {
            id: id.into(),
            waiting_timer: ctx.config.waiting_time,
            starting_timer: ctx.config.starting_time,
            ending_timer: ctx.config.ending_time,
            ctx,
            phase: ArenaPhase::Waiting,
            players: Vec::new(),
            gametime: 0,
            provisioned: false,
            map: None,
            world: None,
            votes: VoteCounter::new(),
            sequencer,
            subgame: None,
            event_tx,
        }
    }

    /// Get arena id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get current phase
    pub fn phase(&self) -> ArenaPhase {
        self.phase
    }

    /// Get players in join order
    pub fn players(&self) -> &[String] {
        &self.players
    }

    /// Get player count
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Check if the player is in this arena
    pub fn has_player(&self, player: &str) -> bool {
        self.players.iter().any(|p| p == player)
    }

    /// Check if the arena is at capacity
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.ctx.config.max_players
    }

    /// Players may join while waiting, or while starting until the world exists
    pub fn is_joinable(&self) -> bool {
        let open = match self.phase {
            ArenaPhase::Waiting => true,
            ArenaPhase::Starting => !self.provisioned,
            ArenaPhase::InGame | ArenaPhase::Ending => false,
        };
        open && !self.is_full()
    }

    /// Get lobby countdown
    pub fn waiting_timer(&self) -> u32 {
        self.waiting_timer
    }

    /// Get pre-game countdown
    pub fn starting_timer(&self) -> u32 {
        self.starting_timer
    }

    /// Get wind-down countdown
    pub fn ending_timer(&self) -> u32 {
        self.ending_timer
    }

    /// Get ticks spent in game
    pub fn gametime(&self) -> u64 {
        self.gametime
    }

    /// Get the map being played, once chosen
    pub fn map(&self) -> Option<&Arc<MapTemplate>> {
        self.map.as_ref()
    }

    /// Get the bound world instance
    pub fn world(&self) -> Option<&WorldHandle> {
        self.world.as_ref()
    }

    /// Get the running sub-game
    pub fn subgame(&self) -> Option<&SubgameHandle> {
        self.subgame.as_ref()
    }

    /// Get map votes
    pub fn votes(&self) -> &VoteCounter {
        &self.votes
    }

    /// Get serializable state
    pub fn snapshot(&self) -> ArenaSnapshot {
        ArenaSnapshot {
            arena_id: self.id.clone(),
            phase: self.phase,
            players: self.players.clone(),
            max_players: self.ctx.config.max_players,
            waiting_timer: self.waiting_timer,
            starting_timer: self.starting_timer,
            ending_timer: self.ending_timer,
            gametime: self.gametime,
            map: self.map.as_ref().map(|m| m.name().to_string()),
            world: self.world.as_ref().map(|w| w.name.clone()),
            subgame: self.subgame.as_ref().map(|s| s.name.clone()),
        }
    }

    // =========================================================================
    // Roster
    // =========================================================================

    /// Add a player to the roster
    pub fn add_player(&mut self, player: &str) -> Result<()> {
        if self.has_player(player) {
            return Err(ArenaError::AlreadyInArena);
        }
        if self.is_full() {
            return Err(ArenaError::ArenaFull);
        }
        if !self.is_joinable() {
            return Err(ArenaError::NotJoinable);
        }

        self.players.push(player.to_string());
        debug!("Player {} joined arena {}", player, self.id);
        self.emit(ArenaEvent::PlayerJoin {
            arena_id: self.id.clone(),
            player: player.to_string(),
        });
        Ok(())
    }

    /// Remove a player, moving them out of the arena world if one is bound
    pub fn remove_player(&mut self, player: &str) -> Result<()> {
        let index = self
            .players
            .iter()
            .position(|p| p == player)
            .ok_or(ArenaError::NotInArena)?;
        self.players.remove(index);
        self.votes.retract(player);

        // Anyone inside the arena world has to be moved out before it goes away
        if self.world.is_some() {
            self.send_to_lobby(player);
        }

        debug!("Player {} left arena {}", player, self.id);
        self.emit(ArenaEvent::PlayerLeave {
            arena_id: self.id.clone(),
            player: player.to_string(),
        });
        Ok(())
    }

    /// Record a map vote while voting is open
    pub fn vote(&mut self, player: &str, map: &str) -> Result<()> {
        if !self.has_player(player) {
            return Err(ArenaError::NotInArena);
        }
        let open = self.phase == ArenaPhase::Waiting
            || (self.phase == ArenaPhase::Starting && !self.provisioned);
        if !open {
            return Err(ArenaError::VotingClosed);
        }
        let map = self.ctx.maps.get(map)?;
        self.votes.vote(player, map.name());
        Ok(())
    }

    /// Play `map` regardless of votes
    pub fn force_map(&mut self, map: Arc<MapTemplate>) {
        self.votes.force(map);
    }

    /// End the running session early
    pub fn end_game(&mut self) {
        if self.phase == ArenaPhase::InGame {
            self.set_phase(ArenaPhase::Ending);
        }
    }

    /// Administrative shutdown: everyone to the lobby, world released
    pub fn teardown(&mut self) {
        for player in std::mem::take(&mut self.players) {
            self.send_to_lobby(&player);
        }
        self.subgame = None;
        self.release_world();
        info!("Arena {} torn down", self.id);
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance the state machine by one tick
    pub fn tick(&mut self) -> TickOutcome {
        match self.phase {
            ArenaPhase::Waiting => self.tick_waiting(),
            ArenaPhase::Starting => self.tick_starting(),
            ArenaPhase::InGame => self.tick_ingame(),
            ArenaPhase::Ending => return self.tick_ending(),
        }
        TickOutcome::Continue
    }

    fn tick_waiting(&mut self) {
        let ctx = self.ctx.clone();
        let config = &ctx.config;

        if self.players.len() < config.min_players {
            self.waiting_timer = config.waiting_time;
            let notice = Notice::tip(keys::NEED_MORE_PLAYERS);
            for player in &self.players {
                ctx.hooks.notify(player, &notice);
            }
            return;
        }

        self.waiting_timer = self.waiting_timer.saturating_sub(1);
        let mut start = false;

        if self.players.len() == config.max_players {
            let notice = Notice::message(keys::STARTING_BY_REACH_CAPACITY);
            for player in &self.players {
                ctx.hooks.notify(player, &notice);
            }
            start = true;
        }

        let time = self.waiting_timer;
        if (1..=WAITING_URGENT_FROM).contains(&time) {
            let notice = Notice::message(keys::STARTING)
                .param("time", time)
                .urgency(Urgency::Urgent);
            let cue = Cue::new(cues::CLICK);
            for player in &self.players {
                ctx.hooks.notify(player, &notice);
                ctx.hooks.play_cue(player, &cue);
            }
        } else if time > WAITING_URGENT_FROM && time <= config.waiting_time {
            let notice = Notice::message(keys::STARTING).param("time", time);
            for player in &self.players {
                ctx.hooks.notify(player, &notice);
            }
        }

        if time == 0 {
            start = true;
        }

        if start {
            self.set_phase(ArenaPhase::Starting);
        }
    }

    fn tick_starting(&mut self) {
        let ctx = self.ctx.clone();
        self.starting_timer = self.starting_timer.saturating_sub(1);

        if self.players.len() < ctx.config.min_players {
            self.cancel_countdown();
            return;
        }

        if !self.provisioned && self.starting_timer <= ctx.config.provision_at {
            self.provisioned = true;
            if let Err(e) = self.provision() {
                error!("Arena {} failed to provision a world: {}", self.id, e);
                self.emit(ArenaEvent::ProvisionFailed {
                    arena_id: self.id.clone(),
                    reason: e.to_string(),
                });
                self.cancel_countdown();
                return;
            }
        }

        let time = self.starting_timer;
        let urgency = if (1..=STARTING_URGENT_FROM).contains(&time) {
            Some(Urgency::Urgent)
        } else if time > STARTING_URGENT_FROM && time <= STARTING_HINT_FROM {
            Some(Urgency::Normal)
        } else {
            None
        };

        if let Some(urgency) = urgency {
            let notice = Notice::tip(keys::START)
                .param("bar", progress_bar(time, STARTING_BAR_WIDTH))
                .param("time", time)
                .urgency(urgency);
            let cue = Cue::new(cues::TOAST).pitch(TOAST_PITCH);
            for player in &self.players {
                ctx.hooks.notify(player, &notice);
                if urgency == Urgency::Urgent {
                    ctx.hooks.play_cue(player, &cue);
                }
            }
        }

        if time == 0 {
            self.set_phase(ArenaPhase::InGame);
        }
    }

    fn tick_ingame(&mut self) {
        self.gametime += 1;

        if self.players.is_empty() {
            info!("Arena {} has no players left", self.id);
            self.set_phase(ArenaPhase::Ending);
            return;
        }

        let view = SessionView {
            arena_id: &self.id,
            players: &self.players,
            map: self.map.as_deref(),
            world: self.world.as_ref(),
        };

        let mut started = Vec::new();
        if self.gametime == 1 {
            let first = self.sequencer.start_next(&view);
            started.push((first.name.clone(), first.round));
            self.subgame = Some(first);
        }

        let signal = match self.subgame.as_mut() {
            Some(current) => {
                let round = current.round;
                let signal = self.sequencer.tick(current, &view);
                if current.round != round {
                    started.push((current.name.clone(), current.round));
                }
                signal
            }
            None => {
                warn!("Arena {} is in game without a sub-game", self.id);
                SequencerSignal::Continue
            }
        };

        for (name, round) in started {
            self.emit(ArenaEvent::SubgameStart {
                arena_id: self.id.clone(),
                name,
                round,
            });
        }

        if signal == SequencerSignal::SessionComplete {
            self.set_phase(ArenaPhase::Ending);
        }
    }

    fn tick_ending(&mut self) -> TickOutcome {
        self.ending_timer = self.ending_timer.saturating_sub(1);
        if self.ending_timer > 0 {
            return TickOutcome::Continue;
        }

        let players = std::mem::take(&mut self.players);
        for player in &players {
            self.send_to_lobby(player);
        }
        self.release_world();

        info!("Arena {} finished", self.id);
        TickOutcome::Finished(players)
    }

    // =========================================================================
    // Private: transitions and resources
    // =========================================================================

    fn set_phase(&mut self, to: ArenaPhase) {
        let from = self.phase;
        if from == to {
            return;
        }

        match to {
            ArenaPhase::Waiting => self.waiting_timer = self.ctx.config.waiting_time,
            ArenaPhase::Starting => {
                self.starting_timer = self.ctx.config.starting_time;
                self.provisioned = false;
            }
            ArenaPhase::InGame => {
                self.gametime = 0;
                self.subgame = None;
            }
            ArenaPhase::Ending => {
                self.ending_timer = self.ctx.config.ending_time;
                self.subgame = None;
            }
        }

        self.phase = to;
        info!("Arena {}: {:?} -> {:?}", self.id, from, to);
        self.emit(ArenaEvent::PhaseChange {
            arena_id: self.id.clone(),
            from,
            to,
        });
    }

    /// Resolve the voted map, create its world, and move every player onto a spawn.
    fn provision(&mut self) -> Result<()> {
        let ctx = self.ctx.clone();
        let map = self.votes.winner(&ctx.maps, &mut rand::thread_rng())?;

        // Never hold two worlds at once
        self.release_world();
        let world = ctx.provisioner.provision(&map, &self.id)?;
        let world_name = world.name.clone();

        // Bind before hooks run so Drop can still release it
        self.map = Some(map.clone());
        self.world = Some(world);

        for (i, player) in self.players.iter().enumerate() {
            ctx.hooks.clear_carried_state(player);
            ctx.hooks
                .teleport(player, &Location::new(world_name.clone(), map.spawn_for(i)));
        }

        self.emit(ArenaEvent::WorldProvisioned {
            arena_id: self.id.clone(),
            map: map.name().to_string(),
            world: world_name,
        });
        Ok(())
    }

    /// Abort the pre-game countdown and undo any provisioning.
    fn cancel_countdown(&mut self) {
        let notice = Notice::message(keys::COUNT_CANCELLED);
        for player in &self.players {
            self.ctx.hooks.notify(player, &notice);
            self.send_to_lobby(player);
        }
        self.release_world();

        info!("Arena {} countdown cancelled", self.id);
        self.emit(ArenaEvent::CountdownCancelled(self.id.clone()));
        self.set_phase(ArenaPhase::Waiting);
    }

    fn send_to_lobby(&self, player: &str) {
        self.ctx.hooks.teleport(player, &self.ctx.config.lobby);
        self.ctx.hooks.clear_carried_state(player);
    }

    fn release_world(&mut self) {
        if let Some(world) = self.world.take() {
            self.ctx.provisioner.release(&world);
        }
        self.map = None;
    }

    fn emit(&self, event: ArenaEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!("Arena {} dropped event: {}", self.id, e);
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if self.world.is_some() {
            warn!("Arena {} dropped while holding a world", self.id);
            self.release_world();
        }
    }
}
