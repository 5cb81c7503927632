//! Map voting

use crate::error::{ArenaError, Result};
use crate::map::{MapRegistry, MapTemplate};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Per-arena map votes, one per player
#[derive(Debug, Clone, Default)]
pub struct VoteCounter {
    votes: HashMap<String, String>,
    forced: Option<Arc<MapTemplate>>,
}

impl VoteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote; a second vote from the same player replaces the first
    pub fn vote(&mut self, player: &str, map: &str) {
        self.votes.insert(player.to_string(), map.to_string());
    }

    pub fn retract(&mut self, player: &str) {
        self.votes.remove(player);
    }

    /// Skip voting and always resolve to `map`
    pub fn force(&mut self, map: Arc<MapTemplate>) {
        self.forced = Some(map);
    }

    pub fn forced(&self) -> Option<&Arc<MapTemplate>> {
        self.forced.as_ref()
    }

    pub fn vote_of(&self, player: &str) -> Option<&str> {
        self.votes.get(player).map(String::as_str)
    }

    /// Votes per map name
    pub fn tally(&self) -> BTreeMap<String, usize> {
        let mut tally = BTreeMap::new();
        for map in self.votes.values() {
            *tally.entry(map.clone()).or_insert(0) += 1;
        }
        tally
    }

    /// Resolve the map to play. Ties, and the no-vote case, are decided at random.
    pub fn winner<R: Rng + ?Sized>(&self, maps: &MapRegistry, rng: &mut R) -> Result<Arc<MapTemplate>> {
        if let Some(map) = &self.forced {
            return Ok(map.clone());
        }

        // Votes for maps that are not registered are ignored
        let tally: Vec<(String, usize)> = self
            .tally()
            .into_iter()
            .filter(|(name, _)| maps.get(name).is_ok())
            .collect();

        let candidates: Vec<String> = match tally.iter().map(|(_, n)| *n).max() {
            Some(top) => tally
                .into_iter()
                .filter(|(_, n)| *n == top)
                .map(|(name, _)| name)
                .collect(),
            None => maps.names(),
        };

        let name = candidates.choose(rng).ok_or(ArenaError::NoMapsLoaded)?;
        maps.get(name)
    }
}
