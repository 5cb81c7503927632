//! Error types for party-arena

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Map not found: {0}")]
    MapNotFound(String),

    #[error("Invalid map {name}: {reason}")]
    InvalidMap { name: String, reason: String },

    #[error("Map already registered: {0}")]
    DuplicateMap(String),

    #[error("No maps loaded")]
    NoMapsLoaded,

    #[error("Arena not found: {0}")]
    ArenaNotFound(String),

    #[error("Arena is full")]
    ArenaFull,

    #[error("Arena is not accepting players")]
    NotJoinable,

    #[error("Voting is closed")]
    VotingClosed,

    #[error("Already in arena")]
    AlreadyInArena,

    #[error("Not in arena")]
    NotInArena,

    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure to materialize a world instance from a map archive.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Archive missing at {path}: {source}")]
    ArchiveMissing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Archive unreadable: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("World {0} could not be resolved after loading")]
    WorldNotResolved(String),
}

pub type Result<T> = std::result::Result<T, ArenaError>;
