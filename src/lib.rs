//! # party-arena
//!
//! Lifecycle of party minigame arenas: lobby wait, countdown, a run of short
//! sub-games, and wind-down, with a fresh world extracted for every session.
//!
//! ## Features
//!
//! - **Tick-driven phases**: Waiting, Starting, InGame, Ending
//! - **World provisioning**: Per-session copies of a map archive, deleted afterwards
//! - **Map voting**: Players vote for the map; ties are settled at random
//! - **Sub-game sequencing**: Pluggable sequencer, round-based default
//! - **Matchmaking**: Players are placed in the fullest open arena
//!
//! ## Example
//!
//! ```rust,ignore
//! use party_arena::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ArenaConfig::new().min_players(2).max_players(8);
//!     let maps = MapRegistry::load_dir("maps".as_ref(), &config.backups_dir, config.min_players)?;
//!     let provisioner = WorldProvisioner::new(&config.worlds_dir, Arc::new(LocalWorlds::new()));
//!
//!     let ctx = ArenaContext::new(config, Arc::new(maps), provisioner, Arc::new(NoopHooks), || {
//!         Box::new(RoundSequencer::new(vec![SubgameSpec::new("dodge", 20)], 8))
//!     });
//!
//!     let manager = Arc::new(tokio::sync::Mutex::new(ArenaManager::new(Arc::new(ctx))?));
//!     manager.lock().await.join("steve")?;
//!
//!     let scheduler = ArenaScheduler::from_config(manager.clone()).await;
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.stop();
//!     Ok(())
//! }
//! ```

pub mod arena;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod map;
pub mod scheduler;
pub mod sequencer;
pub mod types;
pub mod vote;
pub mod world;

#[cfg(test)]
mod tests;

pub use arena::{Arena, ArenaContext, ArenaEvent, TickOutcome};
pub use error::{ArenaError, ProvisionError, Result};
pub use hooks::{NoopHooks, PlayerHooks};
pub use manager::ArenaManager;
pub use map::{Bounds, MapRegistry, MapTemplate, MapTemplateData};
pub use scheduler::{ArenaScheduler, SharedManager};
pub use sequencer::{RoundSequencer, SequencerSignal, SessionView, SubgameHandle, SubgameSequencer, SubgameSpec};
pub use types::*;
pub use vote::VoteCounter;
pub use world::{ArchiveExtractor, LocalWorlds, WorldHandle, WorldHost, WorldProvisioner, ZipExtractor};
