//! Sub-game sequencing during play

use crate::map::MapTemplate;
use crate::world::WorldHandle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a sequencer sees of the arena it runs in
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub arena_id: &'a str,
    pub players: &'a [String],
    pub map: Option<&'a MapTemplate>,
    pub world: Option<&'a WorldHandle>,
}

/// The sub-game currently being played
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgameHandle {
    pub name: String,
    /// 1-based
    pub round: u32,
    pub elapsed: u32,
    pub duration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerSignal {
    Continue,
    /// The last sub-game has ended
    SessionComplete,
}

pub trait SubgameSequencer: Send {
    /// Begin the next sub-game
    fn start_next(&mut self, view: &SessionView<'_>) -> SubgameHandle;

    /// Advance the current sub-game one tick. May replace `current` with the next sub-game.
    fn tick(&mut self, current: &mut SubgameHandle, view: &SessionView<'_>) -> SequencerSignal;
}

/// One entry of a [`RoundSequencer`] playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgameSpec {
    pub name: String,
    /// Length in ticks
    pub duration: u32,
}

impl SubgameSpec {
    pub fn new(name: impl Into<String>, duration: u32) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }
}

/// Plays `rounds` randomly chosen sub-games back to back
pub struct RoundSequencer {
    playlist: Vec<SubgameSpec>,
    rounds: u32,
    started: u32,
    last: Option<usize>,
    rng: StdRng,
}

impl RoundSequencer {
    pub fn new(playlist: Vec<SubgameSpec>, rounds: u32) -> Self {
        Self::with_rng(playlist, rounds, StdRng::from_entropy())
    }

    pub fn with_seed(playlist: Vec<SubgameSpec>, rounds: u32, seed: u64) -> Self {
        Self::with_rng(playlist, rounds, StdRng::seed_from_u64(seed))
    }

    fn with_rng(playlist: Vec<SubgameSpec>, rounds: u32, rng: StdRng) -> Self {
        Self {
            playlist,
            rounds,
            started: 0,
            last: None,
            rng,
        }
    }

    pub fn rounds_started(&self) -> u32 {
        self.started
    }

    fn pick(&mut self) -> Option<usize> {
        match self.playlist.len() {
            0 => None,
            1 => Some(0),
            n => {
                // Never the same sub-game twice in a row
                let mut i = self.rng.gen_range(0..n - 1);
                if self.last.is_some_and(|last| i >= last) {
                    i += 1;
                }
                Some(i)
            }
        }
    }
}

impl SubgameSequencer for RoundSequencer {
    fn start_next(&mut self, view: &SessionView<'_>) -> SubgameHandle {
        self.started += 1;
        let picked = self.pick();
        self.last = picked;

        let handle = match picked {
            Some(i) => SubgameHandle {
                name: self.playlist[i].name.clone(),
                round: self.started,
                elapsed: 0,
                duration: self.playlist[i].duration.max(1),
            },
            // An empty playlist plays a single no-op round
            None => SubgameHandle {
                name: String::new(),
                round: self.started,
                elapsed: 0,
                duration: 1,
            },
        };

        debug!(
            "Arena {} round {}: {} ({} players)",
            view.arena_id,
            handle.round,
            handle.name,
            view.players.len()
        );
        handle
    }

    fn tick(&mut self, current: &mut SubgameHandle, view: &SessionView<'_>) -> SequencerSignal {
        current.elapsed += 1;
        if current.elapsed < current.duration {
            return SequencerSignal::Continue;
        }

        if self.started >= self.rounds || self.playlist.is_empty() {
            return SequencerSignal::SessionComplete;
        }

        *current = self.start_next(view);
        SequencerSignal::Continue
    }
}
